//! Subscriptions to move, close, show and click events on arbitrary windows.
//!
//! One [`EventSubsystem`] owns the subscription registry, the reference-counted hook table and
//! up to one dispatch thread per [`wt_platform::EventChannel`]. Threads start with the first
//! subscription on their channel and are joined when its last subscription goes away.
//!
//! Callbacks run on the dispatch thread, one at a time, in registration order. A callback that
//! blocks stalls every later event on that thread.

mod dispatch;
mod registry;
mod sink;
mod subsystem;

pub use sink::{ChannelSink, Delivery, DeliveryAck, EventSink, FnSink, Listener, listener_fn};
pub use subsystem::EventSubsystem;
