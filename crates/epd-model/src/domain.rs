//! Structural domain objects the value tree reads but never owns.

use serde::{Deserialize, Serialize};

use crate::ids::{Iid, RevisionNumber};

/// A named design alternative a parameter's value may vary across.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignOption {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub name: String,
    pub short_name: String,
}

/// Applicability of an actual finite state for a given state dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActualStateKind {
    Mandatory,
    Forbidden,
}

/// A concrete combination of possible-state selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualFiniteState {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub name: String,
    pub kind: ActualStateKind,
}

impl ActualFiniteState {
    pub fn is_forbidden(&self) -> bool {
        matches!(self.kind, ActualStateKind::Forbidden)
    }
}

/// Ordered, owner-defined list of actual finite states a parameter may
/// depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualFiniteStateList {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub states: Vec<Iid>,
}

/// The domain of expertise owning parameters, overrides and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainOfExpertise {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub name: String,
    pub short_name: String,
}

/// The iteration defines the ordered option list all option-dependent
/// parameters enumerate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub options: Vec<Iid>,
}

/// An element definition holds base parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDefinition {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub name: String,
    pub container: Iid,
    pub parameters: Vec<Iid>,
}

/// An element usage references a definition and may carry overrides of the
/// definition's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementUsage {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub name: String,
    pub element_definition: Iid,
    pub container: Iid,
    pub overrides: Vec<Iid>,
}
