//! Write-authorization predicate.
//!
//! Consulted once when a row is marked editable, never mid-write.

use epd_model::Iid;

pub trait AccessControl {
    fn can_write(&self, owner: Iid) -> bool;
}

/// Grants write access to things owned by the session's active domain of
/// expertise.
#[derive(Debug, Clone, Copy)]
pub struct DomainWriteAccess {
    active_domain: Iid,
}

impl DomainWriteAccess {
    pub fn new(active_domain: Iid) -> Self {
        Self { active_domain }
    }
}

impl AccessControl for DomainWriteAccess {
    fn can_write(&self, owner: Iid) -> bool {
        owner == self.active_domain
    }
}

/// Denies all writes; used for frozen or published iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyAccess;

impl AccessControl for ReadOnlyAccess {
    fn can_write(&self, _owner: Iid) -> bool {
        false
    }
}
