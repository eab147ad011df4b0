//! Engine notifications and observer registration.

use crate::core::pcm::PcmBuffer;
use crate::core::types::AudioFormat;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Notification emitted by the [`Engine`](super::Engine) after a state
/// mutation has completed.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new source was loaded with this format.
    FormatChanged(AudioFormat),
    /// The processed output buffer was replaced.
    BufferChanged {
        offset: usize,
        length: usize,
        buffer: Arc<PcmBuffer>,
    },
    /// Play position in original-time microseconds.
    PlayPositionChanged(i64),
    Playing,
    Paused,
    Stopped,
    /// Playback reached the end of the window.
    Ended,
}

/// Receiver of [`EngineEvent`]s.
///
/// Implemented for every `FnMut(&EngineEvent)` closure.
pub trait Observer {
    fn notify(&mut self, event: &EngineEvent);
}

impl<F> Observer for F
where
    F: FnMut(&EngineEvent),
{
    fn notify(&mut self, event: &EngineEvent) {
        self(event)
    }
}

/// Forwards events into an mpsc channel. A closed receiver is ignored.
pub struct ChannelObserver(pub Sender<EngineEvent>);

impl Observer for ChannelObserver {
    fn notify(&mut self, event: &EngineEvent) {
        let _ = self.0.send(event.clone());
    }
}

impl From<Sender<EngineEvent>> for ChannelObserver {
    fn from(sender: Sender<EngineEvent>) -> Self {
        ChannelObserver(sender)
    }
}

/// Handle returned by [`ObserverList::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Observers notified synchronously in registration order.
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<(SubscriptionId, Box<dyn Observer>)>,
    next_id: u64,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn Observer>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(i, _)| *i != id);
        self.observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn emit(&mut self, event: &EngineEvent) {
        for (_, observer) in self.observers.iter_mut() {
            observer.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc;

    #[test]
    fn test_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = ObserverList::new();
        for tag in ["a", "b", "c"] {
            let log = log.clone();
            list.subscribe(Box::new(move |_: &EngineEvent| log.borrow_mut().push(tag)));
        }
        list.emit(&EngineEvent::Playing);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut list = ObserverList::new();
        let c = count.clone();
        let id = list.subscribe(Box::new(move |_: &EngineEvent| *c.borrow_mut() += 1));
        list.emit(&EngineEvent::Stopped);
        assert!(list.unsubscribe(id));
        assert!(!list.unsubscribe(id));
        list.emit(&EngineEvent::Stopped);
        assert_eq!(*count.borrow(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn test_channel_observer() {
        let (tx, rx) = mpsc::channel();
        let mut list = ObserverList::new();
        list.subscribe(Box::new(ChannelObserver::from(tx)));
        list.emit(&EngineEvent::PlayPositionChanged(42));
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::PlayPositionChanged(42));
        drop(rx);
        list.emit(&EngineEvent::Ended);
    }
}
