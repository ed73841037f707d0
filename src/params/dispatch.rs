// Single-consumer event queue in front of the registry.
//
// Websocket frame handlers, the parameter store's change callbacks and the
// transport's disconnect notifications all run in other contexts; they post
// events here and the dispatch thread applies them in FIFO order. That
// thread is the only writer of the subscription table, so the table needs
// no lock. Posting blocks at most POST_TIMEOUT and then drops the event:
// telemetry is a latest-value-wins stream, so lossy beats wedged producers.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::params::registry::Registry;
use crate::params::{ParamHandle, ParamStore, Value};
use crate::transport::{ConnId, Transport};

const QUEUE_DEPTH: usize = 20;
const POST_TIMEOUT: Duration = Duration::from_millis(500);
const POST_RETRY_DELAY: Duration = Duration::from_millis(10);

/// One unit of work for the dispatch thread.
#[derive(Debug)]
pub enum Event {
    /// Inbound websocket text frame.
    Frame { conn: ConnId, payload: String },
    /// Value change reported by the parameter store.
    StateChange { param: ParamHandle, value: Value },
    /// Transport-level disconnect.
    Disconnected { conn: ConnId },
}

/// Cloneable posting handle. The dispatch thread exits once every handle
/// is dropped and the queue has drained.
#[derive(Clone)]
pub struct Dispatcher {
    tx: SyncSender<Event>,
}

impl Dispatcher {
    /// Post an event, blocking briefly if the queue is full. Returns false
    /// if the event was dropped (queue still full at the deadline, or the
    /// dispatch thread is gone).
    pub fn post(&self, event: Event) -> bool {
        let deadline = Instant::now() + POST_TIMEOUT;
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Full(back)) => {
                    if Instant::now() >= deadline {
                        log::warn!("dispatch queue full, dropping event");
                        return false;
                    }
                    event = back;
                    thread::sleep(POST_RETRY_DELAY);
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::error!("dispatch thread gone, dropping event");
                    return false;
                }
            }
        }
    }
}

/// Start the dispatch thread around a fresh registry.
pub fn spawn_dispatch<S, T>(store: S, transport: T) -> (Dispatcher, JoinHandle<()>)
where
    S: ParamStore + 'static,
    T: Transport + 'static,
{
    let (tx, rx) = mpsc::sync_channel(QUEUE_DEPTH);
    let registry = Registry::new(store, transport);
    let handle = thread::spawn(move || run(rx, registry));
    (Dispatcher { tx }, handle)
}

fn run<S: ParamStore, T: Transport>(rx: Receiver<Event>, mut registry: Registry<S, T>) {
    while let Ok(event) = rx.recv() {
        match event {
            Event::Frame { conn, payload } => registry.handle_frame(conn, &payload),
            Event::StateChange { param, value } => registry.notify(param, value),
            Event::Disconnected { conn } => registry.connection_closed(conn),
        }
    }
    log::info!("dispatch queue closed, exiting");
}
