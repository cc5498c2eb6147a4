/// Listener registry keyed by a stable id.
///
/// `subscribe` hands back the `ListenerId` that `unsubscribe` must be given,
/// so removal always targets exactly what was added. Listeners are notified
/// in subscription order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

pub type Callback<E> = Box<dyn FnMut(&E)>;

pub struct ListenerRegistry<L> {
    next_id: u64,
    listeners: Vec<(ListenerId, L)>,
}

impl<L> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }
}

impl<L> std::fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id)
            .field("len", &self.listeners.len())
            .finish()
    }
}

impl<L> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: L) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.listeners.push((id, listener));
        id
    }

    /// Removes the listener registered under `id`.
    pub fn unsubscribe(&mut self, id: ListenerId) -> Option<L> {
        let idx = self.listeners.iter().position(|(lid, _)| *lid == id)?;
        // `remove` rather than `swap_remove` keeps notification order stable.
        Some(self.listeners.remove(idx).1)
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|(lid, _)| *lid == id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ListenerId, &L)> + '_ {
        self.listeners.iter().map(|(id, l)| (*id, l))
    }
}

impl<E> ListenerRegistry<Callback<E>> {
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Callback, ListenerRegistry};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn unsubscribe_removes_exactly_the_subscribed_listener() {
        let mut reg: ListenerRegistry<&'static str> = ListenerRegistry::new();
        let a = reg.subscribe("a");
        let b = reg.subscribe("b");
        assert_eq!(reg.unsubscribe(a), Some("a"));
        assert_eq!(reg.unsubscribe(a), None);
        assert!(reg.contains(b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn emit_notifies_in_subscription_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut reg: ListenerRegistry<Callback<u32>> = ListenerRegistry::new();
        for tag in ["first", "second"] {
            let seen = Rc::clone(&seen);
            reg.subscribe(Box::new(move |v: &u32| seen.borrow_mut().push((tag, *v))));
        }
        reg.emit(&7);
        assert_eq!(*seen.borrow(), vec![("first", 7), ("second", 7)]);
    }
}
