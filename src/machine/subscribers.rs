//! Subscriber bookkeeping for a machine.

use super::handle::{MachineView, WeakMachine};
use std::sync::Arc;

/// Callback invoked with the machine's public view after every commit.
pub type Listener = Arc<dyn Fn(&MachineView) + Send + Sync>;

/// Identifies one subscription within its machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Ordered subscriber list. Insertion order is notification order.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    /// Copy of the list taken at the start of a notification round.
    pub(crate) fn snapshot(&self) -> Vec<(SubscriptionId, Listener)> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle returned by [`Machine::subscribe`](crate::Machine::subscribe).
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to stop notifications.
#[derive(Clone, Debug)]
pub struct Subscription {
    id: SubscriptionId,
    machine: WeakMachine,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, machine: WeakMachine) -> Self {
        Self { id, machine }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop notifications to this callback. Returns `false` if it was
    /// already removed or the machine is gone.
    pub fn unsubscribe(&self) -> bool {
        self.machine
            .upgrade()
            .is_some_and(|machine| machine.unsubscribe(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_ordered() {
        let mut subscribers = Subscribers::default();
        let a = subscribers.add(Arc::new(|_: &MachineView| {}));
        let b = subscribers.add(Arc::new(|_: &MachineView| {}));
        assert!(a < b);
        assert_eq!(subscribers.len(), 2);
    }

    #[test]
    fn remove_only_once() {
        let mut subscribers = Subscribers::default();
        let a = subscribers.add(Arc::new(|_: &MachineView| {}));
        assert!(subscribers.remove(a));
        assert!(!subscribers.remove(a));
        assert!(!subscribers.contains(a));
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let mut subscribers = Subscribers::default();
        let a = subscribers.add(Arc::new(|_: &MachineView| {}));
        let snapshot = subscribers.snapshot();
        subscribers.remove(a);
        subscribers.add(Arc::new(|_: &MachineView| {}));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, a);
    }
}
