use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Instance identifier of a domain object.
///
/// Identity is what change notifications and row bookkeeping key on; two
/// reads of the same object at different revisions share one `Iid`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Iid(u64);

impl Iid {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonically non-decreasing per-object revision counter.
pub type RevisionNumber = u64;

static NEXT_IID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh process-unique [`Iid`].
pub fn fresh_iid() -> Iid {
    Iid(NEXT_IID.fetch_add(1, Ordering::Relaxed))
}
