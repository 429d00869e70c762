use std::collections::HashMap;

use wt_platform::{EventChannel, EventKind, HookKey, WindowHandle};

use crate::sink::Listener;

pub(crate) struct Subscription {
    pub id: u64,
    pub window: WindowHandle,
    pub kind: EventKind,
    pub channel: EventChannel,
    pub listener: Listener,
    pub keys: Vec<HookKey>,
    /// Event sequence number current when the subscription was made. Only later events are
    /// delivered to it.
    pub registered_at: u64,
    /// Last event delivered, used to resume a scan after the registry changed.
    pub last_dispatch: u64,
}

/// Reference counts of shared OS hook registrations.
#[derive(Debug, Default)]
pub(crate) struct HookTable {
    counts: HashMap<HookKey, usize>,
}

impl HookTable {
    /// Returns true when this is the first reference and the hook has to be installed.
    pub fn acquire(&mut self, key: HookKey) -> bool {
        let count = self.counts.entry(key).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Returns true when the last reference went away and the hook has to be removed.
    pub fn release(&mut self, key: HookKey) -> bool {
        match self.counts.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn count(&self, key: &HookKey) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }
}
