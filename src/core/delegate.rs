//! Synchronous observer registry. Listeners run in subscription order, inside
//! `fire`, so a notification is fully handled before the caller continues.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<T> = Box<dyn FnMut(&T)>;

pub struct Delegate<T> {
    listeners: Vec<(SubscriptionId, Listener<T>)>,
    next_id: u64,
}

impl<T> Default for Delegate<T> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T> fmt::Debug for Delegate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<T> Delegate<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `true` when a listener was removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        before != self.listeners.len()
    }

    pub fn fire(&mut self, value: &T) {
        for (_, listener) in &mut self.listeners {
            listener(value);
        }
    }

    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Delegate;

    #[test]
    fn fires_in_subscription_order_and_unsubscribes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut delegate = Delegate::<i32>::new();

        let first_log = Rc::clone(&log);
        let first = delegate.subscribe(move |v| first_log.borrow_mut().push(("first", *v)));
        let second_log = Rc::clone(&log);
        delegate.subscribe(move |v| second_log.borrow_mut().push(("second", *v)));

        delegate.fire(&1);
        assert!(delegate.unsubscribe(first));
        assert!(!delegate.unsubscribe(first));
        delegate.fire(&2);

        assert_eq!(
            *log.borrow(),
            vec![("first", 1), ("second", 1), ("second", 2)]
        );
    }
}
