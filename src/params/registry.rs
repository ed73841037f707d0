// Subscription table and broadcast engine.
//
// All methods run on the dispatch thread, which is the only writer of the
// table; see dispatch.rs. A parameter is activated in the store exactly
// while its subscriber set is non-empty.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::params::wire::{self, Frames};
use crate::params::{ParamHandle, ParamStore, Value};
use crate::transport::{ConnId, Transport};

#[derive(Deserialize)]
struct WsCommand {
    cmd: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub struct Registry<S: ParamStore, T: Transport> {
    store: S,
    transport: T,
    subs: BTreeMap<ParamHandle, BTreeSet<ConnId>>,
    pending_close: BTreeSet<ConnId>,
}

impl<S: ParamStore, T: Transport> Registry<S, T> {
    pub fn new(store: S, transport: T) -> Self {
        Self {
            store,
            transport,
            subs: BTreeMap::new(),
            pending_close: BTreeSet::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Subscriber set of a parameter, if it has one.
    pub fn subscribers(&self, param: ParamHandle) -> Option<&BTreeSet<ConnId>> {
        self.subs.get(&param)
    }

    /// Entry point for one inbound websocket text frame.
    pub fn handle_frame(&mut self, conn: ConnId, payload: &str) {
        if let Err(e) = self.dispatch_command(conn, payload) {
            log::warn!("ws {conn}: dropping frame: {e:#}");
        }
    }

    fn dispatch_command(&mut self, conn: ConnId, payload: &str) -> anyhow::Result<()> {
        let command: WsCommand =
            serde_json::from_str(payload).context("frame is not a command")?;
        match command.cmd.as_str() {
            "publish" => self.publish(&command.data),
            "subscribe" => {
                let name = param_name(&command.data)?;
                self.subscribe(name, conn);
                Ok(())
            }
            "unsubscribe" => {
                let name = param_name(&command.data)?;
                self.unsubscribe(name, conn);
                Ok(())
            }
            other => {
                log::warn!("Unhandled command: {other}");
                Ok(())
            }
        }
    }

    /// Add `conn` to the parameter's subscriber set, activating the
    /// parameter's change notifications if this is its first subscriber.
    /// The requester gets a subscribeResp with the current value, or the
    /// error variant if the parameter is unknown or activation failed.
    pub fn subscribe(&mut self, name: &str, conn: ConnId) {
        let Some(param) = self.store.lookup(name) else {
            log::info!("subscribe: parameter {name} does not exist");
            self.send_to(conn, &wire::subscribe_error(name));
            return;
        };
        if !self.subs.contains_key(&param) && !self.store.activate(param) {
            log::warn!("subscribe: could not activate notifications for {name}");
            self.send_to(conn, &wire::subscribe_error(name));
            return;
        }
        // Re-subscribing is a no-op for the set.
        self.subs.entry(param).or_default().insert(conn);
        let current = self.store.current(param);
        self.send_to(conn, &wire::subscribe_resp(name, current.as_ref()));
    }

    /// Acknowledge first, then drop `conn` from the subscriber set and
    /// reconcile (which deactivates the parameter if nobody is left).
    pub fn unsubscribe(&mut self, name: &str, conn: ConnId) {
        if !self.transport.send_text(conn, &wire::unsubscribe_resp(name)) {
            self.pending_close.insert(conn);
        }
        if let Some(param) = self.store.lookup(name) {
            if let Some(set) = self.subs.get_mut(&param) {
                set.remove(&conn);
            }
        }
        self.cleanup();
    }

    /// Inbound control write. Validation failures are logged and dropped;
    /// the client is never answered, matching the fire-and-forget contract.
    fn publish(&mut self, data: &serde_json::Value) -> anyhow::Result<()> {
        let obj = data.as_object().context("publish data is not an object")?;
        let name = obj
            .get("name")
            .and_then(|n| n.as_str())
            .context("publish without parameter name")?;
        let wire_value = obj.get("value").context("publish without value")?;
        let Some(param) = self.store.lookup(name) else {
            log::warn!("publish: parameter {name} does not exist");
            return Ok(());
        };
        let Some(kind) = self.store.kind(param) else {
            log::warn!("publish: parameter {name} has no type");
            return Ok(());
        };
        match Value::from_wire(wire_value, kind) {
            Some(value) => self.store.write(param, value),
            None => log::warn!("publish: parameter {name} is not {kind:?} ({wire_value})"),
        }
        Ok(())
    }

    /// A value change from the event queue. Late notifications for
    /// parameters that lost their last subscriber are dropped silently.
    pub fn notify(&mut self, param: ParamHandle, value: Value) {
        let Some(set) = self.subs.get(&param) else {
            log::debug!("notify: {param:?} no longer subscribed, still in queue");
            return;
        };
        if !self.store.is_enabled(param) {
            return;
        }
        let Some(name) = self.store.name(param) else {
            return;
        };
        let targets: Vec<ConnId> = set.iter().copied().collect();
        let frames = wire::new_state(&name, &value);
        let mut any_failed = false;
        for conn in targets {
            let sent = match &frames {
                Frames::Text(json) => self.transport.send_text(conn, json),
                Frames::TextBinary { header, payload } => {
                    self.transport.send_binary(conn, header, payload)
                }
            };
            if !sent {
                self.pending_close.insert(conn);
                any_failed = true;
            }
        }
        if any_failed {
            self.cleanup();
        }
    }

    /// Transport-level disconnect notification.
    pub fn connection_closed(&mut self, conn: ConnId) {
        log::info!("socket {conn} closed");
        self.pending_close.insert(conn);
        self.cleanup();
    }

    /// Reconcile: remove every pending-close connection from every
    /// subscriber set, then deactivate and drop parameters whose set became
    /// empty. Safe to call with nothing pending.
    pub fn cleanup(&mut self) {
        if !self.pending_close.is_empty() {
            for set in self.subs.values_mut() {
                for conn in &self.pending_close {
                    set.remove(conn);
                }
            }
            self.pending_close.clear();
        }
        let drained: Vec<ParamHandle> = self
            .subs
            .iter()
            .filter(|(_, set)| set.is_empty())
            .map(|(param, _)| *param)
            .collect();
        for param in drained {
            self.subs.remove(&param);
            self.store.deactivate(param);
        }
    }

    fn send_to(&mut self, conn: ConnId, json: &str) {
        if !self.transport.send_text(conn, json) {
            self.pending_close.insert(conn);
            self.cleanup();
        }
    }
}

fn param_name(data: &serde_json::Value) -> anyhow::Result<&str> {
    match data.as_str() {
        Some(name) => Ok(name),
        None => bail!("command data is not a parameter name"),
    }
}
