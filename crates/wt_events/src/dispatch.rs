use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use wt_locate::{HitTester, find_deepest_matching};
use wt_platform::{
    EventChannel, EventKind, EventPump, Point, Pumped, RawEvent, WindowEvent,
};

use crate::registry::Subscription;
use crate::sink::{Delivery, DeliveryAck};
use crate::subsystem::{Control, Shared};

pub(crate) struct Loop {
    pub shared: Arc<Shared>,
    pub channel: EventChannel,
    pub generation: u64,
    pub pump: Box<dyn EventPump>,
    pub control: Receiver<Control>,
    pub running: Arc<AtomicBool>,
    /// Held while a callback runs.
    pub gate: Arc<Mutex<()>>,
}

enum Step {
    Continue,
    Exit,
}

pub(crate) fn run(mut lp: Loop) {
    let name = lp.channel.as_str();
    while lp.running.load(Ordering::SeqCst) {
        if let Step::Exit = lp.drain_control() {
            break;
        }
        if !lp.running.load(Ordering::SeqCst) {
            break;
        }
        match lp.pump.next_event() {
            Ok(Pumped::Event(raw)) => lp.shared.dispatch(&raw, &lp.gate),
            Ok(Pumped::Woken) => {}
            Ok(Pumped::Closed) => {
                lp.shared.lose(lp.channel, lp.generation, None);
                break;
            }
            Err(err) if err.is_fatal() => {
                lp.shared
                    .lose(lp.channel, lp.generation, Some(err.to_string()));
                break;
            }
            Err(err) => log::warn!("{name} event pump: {err}"),
        }
    }
    log::info!("{name} event thread stopped");
}

impl Loop {
    fn drain_control(&mut self) -> Step {
        loop {
            match self.control.try_recv() {
                Ok(Control::Install(key, ack)) => {
                    let outcome = self.pump.install(&key);
                    if let Err(err) = &outcome {
                        log::warn!("installing hook {key:?} failed: {err}");
                    }
                    if let Some(ack) = ack {
                        let _ = ack.send(outcome);
                    }
                }
                Ok(Control::Uninstall(key)) => {
                    if let Err(err) = self.pump.uninstall(&key) {
                        log::warn!("removing hook {key:?} failed: {err}");
                    }
                }
                Ok(Control::Stop) | Err(TryRecvError::Disconnected) => return Step::Exit,
                Err(TryRecvError::Empty) => return Step::Continue,
            }
        }
    }
}

impl Shared {
    /// Routes one raw event to its subscriptions.
    pub(crate) fn dispatch(&self, raw: &RawEvent, gate: &Mutex<()>) {
        let id = self.event_seq.fetch_add(1, Ordering::SeqCst) + 1;
        match *raw {
            RawEvent::Geometry {
                window,
                bounds,
                phase,
            } => self.deliver(
                id,
                gate,
                |s| s.kind == EventKind::Move && s.window == window,
                Delivery {
                    window,
                    event: WindowEvent::Move { bounds, phase },
                },
            ),
            RawEvent::Destroyed { window } => self.deliver(
                id,
                gate,
                |s| s.kind == EventKind::Close && s.window == window,
                Delivery {
                    window,
                    event: WindowEvent::Close,
                },
            ),
            RawEvent::Created { window, tag } => {
                if !self.has_subscriber(|s| s.kind == EventKind::Show) {
                    return;
                }
                let matches = find_deepest_matching(self.tree.as_ref(), self.matcher.as_ref());
                if !matches.contains(window) {
                    log::trace!("created window {window} is not a deepest match");
                    return;
                }
                self.deliver(
                    id,
                    gate,
                    |s| s.kind == EventKind::Show && (s.window.is_null() || s.window == window),
                    Delivery {
                        window,
                        event: WindowEvent::Show { window, tag },
                    },
                );
            }
            RawEvent::ButtonPress { window, x, y } => {
                let target = if window.is_null() {
                    HitTester::new(self.tree.as_ref()).hit_test(Point::new(x, y))
                } else {
                    window
                };
                self.deliver(
                    id,
                    gate,
                    |s| s.kind == EventKind::Click && s.window == target,
                    Delivery {
                        window: target,
                        event: WindowEvent::Click { x, y },
                    },
                );
            }
        }
    }

    fn has_subscriber(&self, wants: impl Fn(&Subscription) -> bool) -> bool {
        self.state.lock().subs.iter().any(wants)
    }

    /// Delivers `delivery` to every eligible subscription, in registration order.
    ///
    /// The registry is rescanned after each callback, so callbacks may subscribe and
    /// unsubscribe freely. `last_dispatch` keeps a subscription from seeing the same event twice
    /// and `registered_at` keeps subscriptions made during this event out of it.
    fn deliver(
        &self,
        id: u64,
        gate: &Mutex<()>,
        wants: impl Fn(&Subscription) -> bool,
        delivery: Delivery,
    ) {
        loop {
            let next = {
                let mut state = self.state.lock();
                state
                    .subs
                    .iter_mut()
                    .find(|s| s.registered_at < id && s.last_dispatch != id && wants(s))
                    .map(|s| {
                        s.last_dispatch = id;
                        (s.id, Arc::clone(&s.listener))
                    })
            };
            let Some((sub_id, listener)) = next else {
                break;
            };

            let ack = {
                let _in_flight = gate.lock();
                let still_registered = self.state.lock().subs.iter().any(|s| s.id == sub_id);
                if !still_registered {
                    continue;
                }
                match catch_unwind(AssertUnwindSafe(|| listener.deliver(&delivery))) {
                    Ok(ack) => ack,
                    Err(_) => {
                        log::error!("event callback panicked on {:?}", delivery.event);
                        DeliveryAck::Delivered
                    }
                }
            };
            if ack == DeliveryAck::Disconnected {
                log::debug!("subscription {sub_id} disconnected");
                self.detach_id(sub_id);
            }
        }
    }
}
