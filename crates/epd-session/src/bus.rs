//! Per-object change subscriptions with scoped handles.
//!
//! Subscriptions are explicit [`Watch`] guards rather than entries in an
//! ambient registry: dropping the guard unsubscribes. The counts are
//! observable so tests can assert that tree disposal returns subscription
//! bookkeeping to its baseline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use epd_model::Iid;

#[derive(Debug, Clone, Default)]
pub struct ChangeBus {
    counts: Arc<Mutex<HashMap<Iid, usize>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in one object. Interest ends when the returned
    /// [`Watch`] is dropped.
    pub fn subscribe(&self, iid: Iid) -> Watch {
        let mut counts = self.counts.lock().expect("bus lock");
        *counts.entry(iid).or_insert(0) += 1;
        Watch {
            counts: Arc::clone(&self.counts),
            iid,
        }
    }

    /// Total number of live watches across all objects.
    pub fn active_watches(&self) -> usize {
        self.counts.lock().expect("bus lock").values().sum()
    }

    /// Live watches on one object.
    pub fn watches_on(&self, iid: Iid) -> usize {
        self.counts
            .lock()
            .expect("bus lock")
            .get(&iid)
            .copied()
            .unwrap_or(0)
    }
}

/// Scoped subscription handle; unsubscribes on drop.
#[derive(Debug)]
pub struct Watch {
    counts: Arc<Mutex<HashMap<Iid, usize>>>,
    iid: Iid,
}

impl Watch {
    pub fn iid(&self) -> Iid {
        self.iid
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        let mut counts = self.counts.lock().expect("bus lock");
        if let Some(count) = counts.get_mut(&self.iid) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.iid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_count_follows_guard_lifetime() {
        let bus = ChangeBus::new();
        let iid = Iid::new(1);
        assert_eq!(bus.active_watches(), 0);
        let first = bus.subscribe(iid);
        let second = bus.subscribe(iid);
        assert_eq!(bus.watches_on(iid), 2);
        drop(first);
        assert_eq!(bus.watches_on(iid), 1);
        drop(second);
        assert_eq!(bus.active_watches(), 0);
    }
}
