//! §4.11: client-side RPC sugar built on top of [`Connection::call`].
//! `RemoteMethodCall<T>` is the single-use, blocking-or-async primitive;
//! `RemoteMethod<T>` is the reusable façade most callers want.
//!
//! Blocking wait uses `std::sync::{Mutex, Condvar}` rather than a `Future`,
//! favoring plain `std::sync` primitives over an async runtime.

use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Connection, RpcCallback};

/// Default RPC timeout (§4.11).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

enum State<T> {
    Initialized,
    InProgress,
    Completed(Outcome<T>),
}

enum Outcome<T> {
    Success(T),
    Error { error_uri: String, description: String, details: Option<Value> },
}

/// A point-in-time read of a [`RemoteMethodCall`]'s progress, returned by
/// [`RemoteMethodCall::wait_until_completion`].
pub enum CallSnapshot<T> {
    Initialized,
    InProgress,
    CompletedSuccess(T),
    CompletedError { error_uri: String, description: String, details: Option<Value> },
}

/// A single-use RPC in flight. States: `Initialized -> InProgress ->
/// Completed` (§3 "Pending RPC entry", §4.11).
pub struct RemoteMethodCall<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
}

impl<T> RemoteMethodCall<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new() -> Arc<RemoteMethodCall<T>> {
        Arc::new(RemoteMethodCall {
            state: Mutex::new(State::Initialized),
            condvar: Condvar::new(),
        })
    }

    /// Transitions to `InProgress`, issues the call, and blocks up to
    /// `timeout` for a reply.
    pub fn call(
        self_arc: &Arc<RemoteMethodCall<T>>,
        connection: &dyn Connection,
        uri: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> CallSnapshot<T> {
        Self::call_async(self_arc, connection, uri, args);
        Self::wait_until_completion(self_arc, timeout)
    }

    /// Transitions to `InProgress` and returns immediately; the result
    /// (if any) is observed later via [`wait_until_completion`].
    pub fn call_async(self_arc: &Arc<RemoteMethodCall<T>>, connection: &dyn Connection, uri: &str, args: Vec<Value>) {
        *self_arc.state.lock().unwrap() = State::InProgress;
        connection.call(uri, args, Self::callback(self_arc));
    }

    fn callback(self_arc: &Arc<RemoteMethodCall<T>>) -> Box<dyn RpcCallback> {
        struct Cb<T> {
            target: Arc<RemoteMethodCall<T>>,
        }
        impl<T> RpcCallback for Cb<T>
        where
            T: DeserializeOwned + Send + 'static,
        {
            fn on_success(&mut self, result: Value) {
                let outcome = match serde_json::from_value::<T>(result) {
                    Ok(value) => Outcome::Success(value),
                    Err(e) => Outcome::Error {
                        error_uri: String::new(),
                        description: format!("cannot decode call result: {}", e),
                        details: None,
                    },
                };
                self.target.complete(outcome);
            }
            fn on_error(&mut self, error_uri: String, description: String, details: Option<Value>) {
                self.target.complete(Outcome::Error { error_uri, description, details });
            }
        }
        Box::new(Cb { target: self_arc.clone() })
    }

    fn complete(&self, outcome: Outcome<T>) {
        let mut state = self.state.lock().unwrap();
        *state = State::Completed(outcome);
        self.condvar.notify_all();
    }

    /// Blocks up to `timeout` for `Completed`. A spurious wake before the
    /// deadline, or the deadline itself elapsing with no reply, both
    /// surface as `InProgress` — "not yet completed" (§5 "Suspension
    /// points").
    pub fn wait_until_completion(self_arc: &Arc<RemoteMethodCall<T>>, timeout: Duration) -> CallSnapshot<T> {
        let guard = self_arc.state.lock().unwrap();
        let (mut guard, _timeout_result) = self_arc
            .condvar
            .wait_timeout_while(guard, timeout, |s| matches!(s, State::InProgress))
            .unwrap();
        match std::mem::replace(&mut *guard, State::Initialized) {
            State::Initialized => CallSnapshot::Initialized,
            State::InProgress => CallSnapshot::InProgress,
            State::Completed(Outcome::Success(value)) => CallSnapshot::CompletedSuccess(value),
            State::Completed(Outcome::Error { error_uri, description, details }) => {
                CallSnapshot::CompletedError { error_uri, description, details }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCallReason {
    Timeout,
    RemoteError,
    CallError,
}

#[derive(Debug, Clone)]
pub struct RemoteCallError {
    pub reason: RemoteCallReason,
    pub message: String,
    pub details: Option<Value>,
}

impl std::fmt::Display for RemoteCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.reason, self.message)
    }
}

impl std::error::Error for RemoteCallError {}

/// A reusable RPC façade: `call(args)` spins up a fresh
/// [`RemoteMethodCall`] each time, runs it synchronously, and maps its
/// terminal state to a [`RemoteCallError`] on anything but success
/// (§4.11's state-to-reason table).
pub struct RemoteMethod<T> {
    uri: String,
    timeout: Duration,
    _marker: PhantomData<T>,
}

impl<T> RemoteMethod<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(uri: impl Into<String>) -> RemoteMethod<T> {
        RemoteMethod { uri: uri.into(), timeout: DEFAULT_TIMEOUT, _marker: PhantomData }
    }

    pub fn with_timeout(uri: impl Into<String>, timeout: Duration) -> RemoteMethod<T> {
        RemoteMethod { uri: uri.into(), timeout, _marker: PhantomData }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn call(&self, connection: &dyn Connection, args: Vec<Value>) -> Result<T, RemoteCallError> {
        let call = RemoteMethodCall::<T>::new();
        match RemoteMethodCall::call(&call, connection, &self.uri, args, self.timeout) {
            CallSnapshot::CompletedSuccess(value) => Ok(value),
            CallSnapshot::CompletedError { description, details, .. } => {
                Err(RemoteCallError { reason: RemoteCallReason::RemoteError, message: description, details })
            }
            CallSnapshot::InProgress => Err(RemoteCallError {
                reason: RemoteCallReason::Timeout,
                message: "operation timed out".to_string(),
                details: None,
            }),
            CallSnapshot::Initialized => Err(RemoteCallError {
                reason: RemoteCallReason::CallError,
                message: "call never started".to_string(),
                details: None,
            }),
        }
    }
}
