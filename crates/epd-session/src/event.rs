//! Change notifications delivered by the session layer.

use serde::{Deserialize, Serialize};

use epd_model::{Iid, RevisionNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Added,
    Removed,
    Updated,
}

/// One at-least-once notification: the object with `iid` reached `revision`.
/// Revisions are monotonically non-decreasing per object; consumers must
/// discard anything not newer than what they already processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub iid: Iid,
    pub revision: RevisionNumber,
    pub kind: EventKind,
}

impl ChangeEvent {
    pub fn updated(iid: Iid, revision: RevisionNumber) -> Self {
        Self {
            iid,
            revision,
            kind: EventKind::Updated,
        }
    }

    pub fn added(iid: Iid, revision: RevisionNumber) -> Self {
        Self {
            iid,
            revision,
            kind: EventKind::Added,
        }
    }

    pub fn removed(iid: Iid, revision: RevisionNumber) -> Self {
        Self {
            iid,
            revision,
            kind: EventKind::Removed,
        }
    }
}
