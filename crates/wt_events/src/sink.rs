use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use wt_platform::{WindowEvent, WindowHandle};

/// One event handed to one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Window the event is about: the moved, closed, shown or clicked window.
    pub window: WindowHandle,
    pub event: WindowEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryAck {
    Delivered,
    /// The consumer is gone; the subscription is dropped.
    Disconnected,
}

/// Consumer side of a subscription. Called on a dispatch thread.
pub trait EventSink: Send + Sync {
    fn deliver(&self, delivery: &Delivery) -> DeliveryAck;
}

/// Shared sink. Its pointer identity is the callback identity of a subscription.
pub type Listener = Arc<dyn EventSink>;

pub(crate) fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Sink that runs a closure.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&Delivery) + Send + Sync,
{
    fn deliver(&self, delivery: &Delivery) -> DeliveryAck {
        (self.0)(delivery);
        DeliveryAck::Delivered
    }
}

pub fn listener_fn<F>(f: F) -> Listener
where
    F: Fn(&Delivery) + Send + Sync + 'static,
{
    Arc::new(FnSink(f))
}

/// Sink that forwards into a channel drained by the consumer on its own thread.
///
/// Once the receiver is dropped the next delivery reports [`DeliveryAck::Disconnected`].
pub struct ChannelSink {
    tx: Sender<Delivery>,
}

impl ChannelSink {
    pub fn pair() -> (Listener, Receiver<Delivery>) {
        let (tx, rx) = unbounded();
        (Arc::new(ChannelSink { tx }), rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, delivery: &Delivery) -> DeliveryAck {
        match self.tx.send(delivery.clone()) {
            Ok(()) => DeliveryAck::Delivered,
            Err(_) => DeliveryAck::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_per_allocation() {
        let a = listener_fn(|_| {});
        let b = listener_fn(|_| {});
        assert!(same_listener(&a, &a.clone()));
        assert!(!same_listener(&a, &b));
    }

    #[test]
    fn channel_sink_reports_a_dropped_receiver() {
        let (sink, rx) = ChannelSink::pair();
        let d = Delivery {
            window: WindowHandle::from_raw(3),
            event: WindowEvent::Close,
        };
        assert_eq!(sink.deliver(&d), DeliveryAck::Delivered);
        assert_eq!(rx.try_recv().ok(), Some(d.clone()));
        drop(rx);
        assert_eq!(sink.deliver(&d), DeliveryAck::Disconnected);
    }
}
