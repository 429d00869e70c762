//! Window pinning: a pinned window keeps its distance to the nearest corner of its parent while
//! the parent moves. Built only on [`wt_platform::WindowSystem`] geometry and
//! [`wt_events::EventSubsystem`] move and close subscriptions.

mod anchor;
mod pinning;

pub use anchor::{Edge, PinAnchor};
pub use pinning::Pinning;
