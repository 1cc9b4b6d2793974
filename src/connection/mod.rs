//! §4.8 `Connection` (abstract) and the connection registry + plugin
//! bridge half of §4.12 (the service-notification half lives in
//! `crate::service`, which implements [`ConnectionObserver`]).

pub mod message;
pub mod relay;
pub mod remote_method;
pub mod wamp;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::{Error, ErrorKind};
use crate::uri::Uri;

/// Receives the outcome of an RPC initiated through [`Connection::call`].
/// Exactly one of the two methods fires, at most once (§8 invariant 5).
pub trait RpcCallback: Send {
    fn on_success(&mut self, result: Value);
    fn on_error(&mut self, error_uri: String, description: String, details: Option<Value>);
}

/// A boxed closure pair adapting ad-hoc callbacks to [`RpcCallback`].
pub struct ClosureCallback<S, E> {
    pub on_success: Option<S>,
    pub on_error: Option<E>,
}

impl<S, E> RpcCallback for ClosureCallback<S, E>
where
    S: FnOnce(Value) + Send,
    E: FnOnce(String, String, Option<Value>) + Send,
{
    fn on_success(&mut self, result: Value) {
        if let Some(f) = self.on_success.take() {
            f(result);
        }
    }

    fn on_error(&mut self, error_uri: String, description: String, details: Option<Value>) {
        if let Some(f) = self.on_error.take() {
            f(error_uri, description, details);
        }
    }
}

/// Per-peer state and behavior common to every WAMP role (§4.8). The sole
/// implementer is [`wamp::WampConnection`]; the trait exists so
/// [`ConnectionRegistry`] and the service bridge can hold peers
/// generically without knowing which side of the wire they're on.
pub trait Connection: Send + Sync {
    fn uri(&self) -> Uri;
    fn user_account(&self) -> Option<String>;
    fn home_path(&self) -> String;
    fn session_id(&self) -> String;
    fn server_id(&self) -> String;
    fn is_ready(&self) -> bool;

    /// Feeds one inbound wire frame through message decode + dispatch.
    /// Returns `false` for anything dropped silently (§6): undecodable
    /// JSON, or a frame missing the fields its type requires.
    fn process(&self, text: &str) -> bool;

    fn publish(&self, uri: &str, event: Value, exclude_me: bool, exclude: Vec<String>, eligible: Vec<String>) -> bool;
    fn subscribe(&self, uri: &str) -> bool;
    fn unsubscribe(&self, uri: &str) -> bool;
    fn call(&self, uri: &str, args: Vec<Value>, callback: Box<dyn RpcCallback>) -> bool;

    /// Unsubscribes everything client-side, drops every server-side relay
    /// handler, then marks the connection not-ready (which removes it from
    /// any registry it was added to).
    fn close(&self);
}

/// Notified when a connection transitions to ready or is removed. The
/// service/plugin bridge (`crate::service::ServiceRegistry`) is the one
/// production implementer; tests may supply their own.
pub trait ConnectionObserver: Send + Sync {
    fn on_connection_ready(&self, connection: &Arc<dyn Connection>);
    fn on_connection_closed(&self, connection: &Arc<dyn Connection>);
}

/// The set of currently-ready connections (§3 "Connection registry").
/// Connections add themselves on the not-ready -> ready transition and
/// remove themselves going the other way; every registered
/// [`ConnectionObserver`] is fanned out to on each transition.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<dyn Connection>>>,
    observers: Mutex<Vec<Arc<dyn ConnectionObserver>>>,
}

impl ConnectionRegistry {
    pub fn new() -> ConnectionRegistry {
        ConnectionRegistry::default()
    }

    pub fn register_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Fails `NotReady` if `connection.is_ready()` is false. A connection
    /// already present under its session id is a silent no-op (no
    /// duplicate notification).
    pub fn add(&self, connection: Arc<dyn Connection>) -> Result<(), Error> {
        if !connection.is_ready() {
            return Err(Error::new(ErrorKind::NotReady));
        }
        let session_id = connection.session_id();
        {
            let mut connections = self.connections.lock().unwrap();
            if connections.contains_key(&session_id) {
                return Ok(());
            }
            connections.insert(session_id, connection.clone());
        }
        for observer in self.observers.lock().unwrap().iter() {
            observer.on_connection_ready(&connection);
        }
        Ok(())
    }

    /// No-ops if `session_id` isn't present.
    pub fn remove(&self, session_id: &str) {
        let removed = self.connections.lock().unwrap().remove(session_id);
        if let Some(connection) = removed {
            for observer in self.observers.lock().unwrap().iter() {
                observer.on_connection_closed(&connection);
            }
        }
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.connections.lock().unwrap().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
