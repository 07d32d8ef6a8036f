use foundation::time::Time;

/// A published event together with the host time it was published at.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<E> {
    pub time: Time,
    pub event: E,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E)>;

/// Typed, in-process publish/subscribe bus.
///
/// Subscribers run synchronously, in subscription order, on the publishing
/// thread. Every published event is also retained until drained so hosts that
/// poll instead of subscribing still see them.
pub struct EventBus<E> {
    next_subscription: u64,
    subscribers: Vec<(SubscriptionId, Handler<E>)>,
    events: Vec<Envelope<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_subscription: 0,
            subscribers: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("pending", &self.events.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(handler)));
        id
    }

    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&mut self, time: Time, event: E) {
        for (_, handler) in self.subscribers.iter_mut() {
            handler(&event);
        }
        self.events.push(Envelope { time, event });
    }

    pub fn events(&self) -> &[Envelope<E>] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<Envelope<E>> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;
    use foundation::time::Time;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn records_events_with_time() {
        let mut bus = EventBus::new();
        bus.publish(Time(2.0), "hello");
        assert_eq!(bus.events().len(), 1);
        assert_eq!(bus.events()[0].time, Time(2.0));
        assert_eq!(bus.events()[0].event, "hello");
    }

    #[test]
    fn drain_clears_events() {
        let mut bus = EventBus::new();
        bus.publish(Time::ZERO, 1u32);
        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert!(bus.events().is_empty());
    }

    #[test]
    fn subscribers_run_in_order_until_unsubscribed() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        let a = {
            let seen = seen.clone();
            bus.subscribe(move |e: &u32| seen.borrow_mut().push(("a", *e)))
        };
        {
            let seen = seen.clone();
            bus.subscribe(move |e: &u32| seen.borrow_mut().push(("b", *e)));
        }

        bus.publish(Time::ZERO, 1);
        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        bus.publish(Time::ZERO, 2);

        assert_eq!(*seen.borrow(), vec![("a", 1), ("b", 1), ("b", 2)]);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
