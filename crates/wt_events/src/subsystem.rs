use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Sender, bounded, unbounded};
use parking_lot::Mutex;
use wt_locate::WindowMatcher;
use wt_platform::{
    EventBackend, EventChannel, EventKind, HookKey, PlatformError, PumpWaker, Result, ShapeQuery,
    WindowHandle,
};

use crate::dispatch;
use crate::registry::{HookTable, Subscription};
use crate::sink::{Listener, same_listener};

pub(crate) enum Control {
    Install(HookKey, Option<Sender<Result<()>>>),
    Uninstall(HookKey),
    Stop,
}

pub(crate) struct ChannelHandle {
    generation: u64,
    control: Sender<Control>,
    waker: Arc<dyn PumpWaker>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    running: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
}

impl ChannelHandle {
    fn stop(mut self, from_dispatch_thread: bool) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.control.send(Control::Stop);
        self.waker.wake();
        let Some(thread) = self.thread.take() else {
            return;
        };
        // A callback stopping its own thread cannot join it; the loop exits after the callback.
        if !from_dispatch_thread && thread.join().is_err() {
            log::error!("event dispatch thread panicked");
        }
    }
}

pub(crate) struct State {
    next_id: u64,
    next_generation: u64,
    pub(crate) subs: Vec<Subscription>,
    pub(crate) hooks: HookTable,
    channels: HashMap<EventChannel, ChannelHandle>,
    lost: Option<String>,
}

pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn EventBackend>,
    pub(crate) tree: Arc<dyn ShapeQuery>,
    pub(crate) matcher: Arc<dyn WindowMatcher>,
    pub(crate) state: Mutex<State>,
    pub(crate) event_seq: AtomicU64,
}

impl Shared {
    /// Removes the first subscription chosen by `pick`, releasing its hooks and stopping its
    /// dispatch thread when nothing else uses it. Returns false when `pick` found nothing.
    ///
    /// When this returns no callback of the removed subscription is running or will run.
    pub(crate) fn detach<F>(&self, pick: F) -> bool
    where
        F: FnOnce(&[Subscription]) -> Option<usize>,
    {
        let current = thread::current().id();
        let mut state = self.state.lock();
        let Some(index) = pick(&state.subs) else {
            return false;
        };
        let sub = state.subs.remove(index);
        let released: Vec<HookKey> = sub
            .keys
            .iter()
            .copied()
            .filter(|key| state.hooks.release(*key))
            .collect();
        let idle = !state.subs.iter().any(|s| s.channel == sub.channel);

        let Some(handle) = state.channels.get(&sub.channel) else {
            return true;
        };
        let control = handle.control.clone();
        let waker = Arc::clone(&handle.waker);
        let gate = Arc::clone(&handle.gate);
        let on_dispatch = handle.thread_id == current;
        let stopped = if idle {
            state.channels.remove(&sub.channel)
        } else {
            None
        };
        drop(state);

        for key in &released {
            log::debug!("releasing hook {key:?}");
            let _ = control.send(Control::Uninstall(*key));
        }
        match stopped {
            Some(handle) => {
                log::info!("stopping {} event thread", sub.channel.as_str());
                handle.stop(on_dispatch);
            }
            None if !released.is_empty() => waker.wake(),
            None => {}
        }
        if !on_dispatch {
            // Waits out a delivery that picked this subscription before it was removed.
            drop(gate.lock());
        }
        true
    }

    pub(crate) fn detach_id(&self, id: u64) -> bool {
        self.detach(|subs| subs.iter().position(|s| s.id == id))
    }

    /// Drops everything served by a dispatch thread whose source went away. A fatal reason
    /// poisons the subsystem.
    pub(crate) fn lose(&self, channel: EventChannel, generation: u64, fatal: Option<String>) {
        let mut state = self.state.lock();
        let current = state
            .channels
            .get(&channel)
            .is_some_and(|h| h.generation == generation);
        if current {
            // Dropping the handle detaches this very thread.
            state.channels.remove(&channel);
            let subs = std::mem::take(&mut state.subs);
            let (gone, kept): (Vec<_>, Vec<_>) =
                subs.into_iter().partition(|s| s.channel == channel);
            state.subs = kept;
            for sub in &gone {
                for key in &sub.keys {
                    state.hooks.release(*key);
                }
            }
            log::warn!(
                "{} event source lost, dropped {} subscription(s)",
                channel.as_str(),
                gone.len()
            );
        }
        if let Some(reason) = fatal {
            log::error!("display connection lost: {reason}");
            state.lost = Some(reason);
        }
    }
}

/// Registry of window event subscriptions and owner of the dispatch threads serving them.
pub struct EventSubsystem {
    shared: Arc<Shared>,
}

impl EventSubsystem {
    /// `tree` serves hit tests for clicks and the deepest-match search for show events,
    /// `matcher` decides which appearing windows are reported.
    pub fn new(
        backend: Arc<dyn EventBackend>,
        tree: Arc<dyn ShapeQuery>,
        matcher: Arc<dyn WindowMatcher>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                tree,
                matcher,
                state: Mutex::new(State {
                    next_id: 1,
                    next_generation: 1,
                    subs: Vec::new(),
                    hooks: HookTable::default(),
                    channels: HashMap::new(),
                    lost: None,
                }),
                event_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Registers `listener` for `kind` events on `window`.
    ///
    /// The null window with [`EventKind::Show`] receives every newly appearing matching window.
    /// Registering the same triple twice creates two independent subscriptions. The first
    /// subscription needing an OS hook installs it before this returns, except when called from
    /// a callback on the same dispatch thread, where installation happens right after the
    /// callback.
    pub fn subscribe(&self, window: WindowHandle, kind: EventKind, listener: Listener) -> Result<()> {
        let shared = &self.shared;
        let channel = shared.backend.channel_for(kind);
        let keys = shared.backend.hook_keys(window, kind);

        let mut state = shared.state.lock();
        if let Some(reason) = &state.lost {
            return Err(PlatformError::connection(reason.clone()));
        }
        if !state.channels.contains_key(&channel) {
            let generation = state.next_generation;
            state.next_generation += 1;
            match spawn_channel(shared, channel, generation) {
                Ok(handle) => {
                    state.channels.insert(channel, handle);
                }
                Err(err) => {
                    if err.is_fatal() {
                        state.lost = Some(err.to_string());
                    }
                    return Err(err);
                }
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        let fresh: Vec<HookKey> = keys
            .iter()
            .copied()
            .filter(|key| state.hooks.acquire(*key))
            .collect();
        state.subs.push(Subscription {
            id,
            window,
            kind,
            channel,
            listener,
            keys,
            registered_at: shared.event_seq.load(Ordering::SeqCst),
            last_dispatch: 0,
        });
        let Some(handle) = state.channels.get(&channel) else {
            return Ok(());
        };
        let control = handle.control.clone();
        let waker = Arc::clone(&handle.waker);
        let on_dispatch = handle.thread_id == thread::current().id();
        drop(state);

        if fresh.is_empty() {
            return Ok(());
        }
        if on_dispatch {
            for key in fresh {
                let _ = control.send(Control::Install(key, None));
            }
            return Ok(());
        }

        for key in fresh {
            log::debug!("installing hook {key:?}");
            let (ack_tx, ack_rx) = bounded(1);
            let sent = control.send(Control::Install(key, Some(ack_tx))).is_ok();
            waker.wake();
            let outcome = match ack_rx.recv() {
                Ok(outcome) if sent => outcome,
                _ => Err(PlatformError::resource("event hook (dispatch thread exited)")),
            };
            if let Err(err) = outcome {
                shared.detach_id(id);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Removes the earliest subscription matching the exact triple. Returns false, and does
    /// nothing, when there is none.
    ///
    /// Once this returns the removed subscription receives no further callbacks.
    pub fn unsubscribe(&self, window: WindowHandle, kind: EventKind, listener: &Listener) -> bool {
        self.shared.detach(|subs| {
            subs.iter().position(|s| {
                s.window == window && s.kind == kind && same_listener(&s.listener, listener)
            })
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.state.lock().subs.len()
    }

    /// Number of subscriptions holding the hook `key`.
    pub fn hook_refcount(&self, key: &HookKey) -> usize {
        self.shared.state.lock().hooks.count(key)
    }

    pub fn is_running(&self, channel: EventChannel) -> bool {
        self.shared.state.lock().channels.contains_key(&channel)
    }

    /// Reason the display connection was lost, if it was.
    pub fn connection_lost(&self) -> Option<String> {
        self.shared.state.lock().lost.clone()
    }
}

impl Drop for EventSubsystem {
    fn drop(&mut self) {
        let handles: Vec<ChannelHandle> = {
            let mut state = self.shared.state.lock();
            state.subs.clear();
            state.channels.drain().map(|(_, h)| h).collect()
        };
        let current = thread::current().id();
        for handle in handles {
            let own = handle.thread_id == current;
            handle.stop(own);
        }
    }
}

fn spawn_channel(
    shared: &Arc<Shared>,
    channel: EventChannel,
    generation: u64,
) -> Result<ChannelHandle> {
    let (control_tx, control_rx) = unbounded();
    let (ready_tx, ready_rx) = bounded::<Result<Arc<dyn PumpWaker>>>(1);
    let running = Arc::new(AtomicBool::new(true));
    let gate = Arc::new(Mutex::new(()));

    let thread = thread::Builder::new()
        .name(format!("wt-events-{}", channel.as_str()))
        .spawn({
            let shared = Arc::clone(shared);
            let running = Arc::clone(&running);
            let gate = Arc::clone(&gate);
            move || {
                let pump = match shared.backend.open_pump(channel) {
                    Ok(pump) => pump,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(pump.waker())).is_err() {
                    return;
                }
                dispatch::run(dispatch::Loop {
                    shared,
                    channel,
                    generation,
                    pump,
                    control: control_rx,
                    running,
                    gate,
                });
            }
        })
        .map_err(|e| PlatformError::resource(format!("event thread: {e}")))?;

    let thread_id = thread.thread().id();
    match ready_rx.recv() {
        Ok(Ok(waker)) => {
            log::info!("{} event thread started", channel.as_str());
            Ok(ChannelHandle {
                generation,
                control: control_tx,
                waker,
                thread: Some(thread),
                thread_id,
                running,
                gate,
            })
        }
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(_) => {
            let _ = thread.join();
            Err(PlatformError::resource("event thread exited during start"))
        }
    }
}
