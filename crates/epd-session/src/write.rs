//! The write collaborator contract.
//!
//! The value tree never mutates a domain object directly: an edit becomes a
//! clone-one-field request handed to a [`WriteCollaborator`]. Callers do not
//! retry on failure; the rejected row keeps its last confirmed value until a
//! corrective change notification arrives.

use thiserror::Error;

use epd_model::{Iid, ParameterSwitchKind};

/// The value-array fields a user may edit in place. Computed and published
/// values are produced elsewhere and are read-only here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueField {
    Manual,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAction {
    /// Replace one whole value array of the record's clone.
    SetValues {
        field: ValueField,
        values: Vec<String>,
    },
    /// Change the authoritative switch of the record's clone.
    SetSwitch(ParameterSwitchKind),
}

/// A clone-plus-field description of one intended value-set change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub value_set: Iid,
    pub action: WriteAction,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("write rejected: {reason}")]
    Rejected { reason: String },
    #[error("unknown value set {0}")]
    UnknownValueSet(Iid),
}

pub trait WriteCollaborator {
    fn submit(&self, request: &WriteRequest) -> Result<(), WriteError>;
}
