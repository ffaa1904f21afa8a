//! Parameter-like domain objects and their value containers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::array::ArrayDimension;
use crate::error::{ModelError, Result};
use crate::ids::{Iid, RevisionNumber, fresh_iid};

/// Selects which value array of a [`ValueSet`] is authoritative.
/// The published array is a read-only column, never a switch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterSwitchKind {
    Manual,
    Computed,
    Reference,
}

impl fmt::Display for ParameterSwitchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParameterSwitchKind::Manual => "MANUAL",
            ParameterSwitchKind::Computed => "COMPUTED",
            ParameterSwitchKind::Reference => "REFERENCE",
        };
        f.write_str(label)
    }
}

/// One scalar sub-slot of a compound or array parameter type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterTypeComponent {
    pub iid: Iid,
    pub short_name: String,
    /// Coordinate label for array components, e.g. `{2;1}`.
    pub coordinates: Option<String>,
}

impl ParameterTypeComponent {
    pub fn new(short_name: impl Into<String>) -> Self {
        Self {
            iid: fresh_iid(),
            short_name: short_name.into(),
            coordinates: None,
        }
    }

    /// A freshly created array component is named after its coordinates.
    pub fn with_coordinates(coordinates: String) -> Self {
        Self {
            iid: fresh_iid(),
            short_name: coordinates.clone(),
            coordinates: Some(coordinates),
        }
    }
}

/// Closed set of parameter type shapes the value tree distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParameterType {
    Scalar {
        iid: Iid,
        revision: RevisionNumber,
        name: String,
        short_name: String,
    },
    Compound {
        iid: Iid,
        revision: RevisionNumber,
        name: String,
        short_name: String,
        components: Vec<ParameterTypeComponent>,
    },
    Array {
        iid: Iid,
        revision: RevisionNumber,
        name: String,
        short_name: String,
        dimension: ArrayDimension,
        is_tensor: bool,
        components: Vec<ParameterTypeComponent>,
    },
}

impl ParameterType {
    pub fn iid(&self) -> Iid {
        match self {
            ParameterType::Scalar { iid, .. }
            | ParameterType::Compound { iid, .. }
            | ParameterType::Array { iid, .. } => *iid,
        }
    }

    pub fn revision(&self) -> RevisionNumber {
        match self {
            ParameterType::Scalar { revision, .. }
            | ParameterType::Compound { revision, .. }
            | ParameterType::Array { revision, .. } => *revision,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParameterType::Scalar { name, .. }
            | ParameterType::Compound { name, .. }
            | ParameterType::Array { name, .. } => name,
        }
    }

    pub fn short_name(&self) -> &str {
        match self {
            ParameterType::Scalar { short_name, .. }
            | ParameterType::Compound { short_name, .. }
            | ParameterType::Array { short_name, .. } => short_name,
        }
    }

    /// Components of a compound/array type; empty for scalar types, which
    /// carry exactly one implicit component.
    pub fn components(&self) -> &[ParameterTypeComponent] {
        match self {
            ParameterType::Scalar { .. } => &[],
            ParameterType::Compound { components, .. }
            | ParameterType::Array { components, .. } => components,
        }
    }

    pub fn is_compound(&self) -> bool {
        !matches!(self, ParameterType::Scalar { .. })
    }

    /// Number of value slots per value array: one for scalar, one per
    /// component otherwise.
    pub fn slot_count(&self) -> usize {
        match self {
            ParameterType::Scalar { .. } => 1,
            other => other.components().len(),
        }
    }
}

/// The value container bound to one `(Option?, State?)` cell: one entry per
/// component in each of the four value arrays, plus the switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSet {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub option: Option<Iid>,
    pub state: Option<Iid>,
    pub manual: Vec<String>,
    pub computed: Vec<String>,
    pub reference: Vec<String>,
    pub published: Vec<String>,
    pub value_switch: ParameterSwitchKind,
}

impl ValueSet {
    /// A default-valued record for a cell the domain layer has not
    /// materialized yet.
    pub fn placeholder(option: Option<Iid>, state: Option<Iid>, slot_count: usize) -> Self {
        let blank = vec!["-".to_string(); slot_count];
        Self {
            iid: fresh_iid(),
            revision: 0,
            option,
            state,
            manual: blank.clone(),
            computed: blank.clone(),
            reference: blank.clone(),
            published: blank,
            value_switch: ParameterSwitchKind::Manual,
        }
    }

    /// The value array selected by the switch.
    pub fn actual(&self) -> &[String] {
        match self.value_switch {
            ParameterSwitchKind::Manual => &self.manual,
            ParameterSwitchKind::Computed => &self.computed,
            ParameterSwitchKind::Reference => &self.reference,
        }
    }

    /// All four arrays must agree on the slot count.
    pub fn check_slot_count(&self, expected: usize) -> Result<()> {
        for array in [&self.manual, &self.computed, &self.reference, &self.published] {
            if array.len() != expected {
                return Err(ModelError::ValueArrayMismatch {
                    expected,
                    actual: array.len(),
                });
            }
        }
        Ok(())
    }
}

/// A parameter on an element definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub parameter_type: Iid,
    pub owner: Iid,
    /// The element definition holding this parameter.
    pub container: Iid,
    pub is_option_dependent: bool,
    /// Actual finite state list, when the parameter is state-dependent.
    pub state_dependence: Option<Iid>,
    pub value_sets: Vec<Iid>,
}

/// A usage-level replacement of a parameter's values, owned by a different
/// domain than the base parameter may be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterOverride {
    pub iid: Iid,
    pub revision: RevisionNumber,
    /// The base parameter being overridden.
    pub parameter: Iid,
    pub owner: Iid,
    /// The element usage holding this override.
    pub container: Iid,
    pub value_sets: Vec<Iid>,
}

/// An owner-level read/annotate shadow of a parameter or override the
/// subscribing domain does not own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSubscription {
    pub iid: Iid,
    pub revision: RevisionNumber,
    /// The parameter or override being subscribed to.
    pub subscribed: Iid,
    pub owner: Iid,
    pub value_sets: Vec<Iid>,
}

/// The root of a value tree: which parameter-like object the rows present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subject {
    Parameter(Iid),
    Override(Iid),
    Subscription(Iid),
}

impl Subject {
    pub fn iid(&self) -> Iid {
        match self {
            Subject::Parameter(iid) | Subject::Override(iid) | Subject::Subscription(iid) => *iid,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Parameter(iid) => write!(f, "parameter {iid}"),
            Subject::Override(iid) => write!(f, "override {iid}"),
            Subject::Subscription(iid) => write!(f, "subscription {iid}"),
        }
    }
}
