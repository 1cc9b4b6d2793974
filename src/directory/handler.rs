//! §3/§4.6/§4.7: `Request`, `Outcome` (the wire spec calls this type
//! `Result`; renamed here to stay out of `std::result::Result`'s way), the
//! `Handler` trait, and the reflective `MethodHandler`.

use serde_json::Value;

use crate::error::{Error, ErrorKind};
use crate::uri::Uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Unspecified,
    Call,
    Publish,
}

/// An RPC-visible failure raised by a method body, as opposed to an
/// argument-coercion failure the dispatcher detects itself.
#[derive(Debug, Clone)]
pub struct RpcError {
    pub message: String,
    pub details: Option<Value>,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> RpcError {
        RpcError {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(message: impl Into<String>, details: Value) -> RpcError {
        RpcError {
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Immutable URI plus a mutable, append-only argument list and result
/// collector. `request_type` may still be overridden after construction
/// (the WAMP connection layer does this once, right after building the
/// request, when a handler needs to see `Call` vs `Publish`).
#[derive(Debug, Clone)]
pub struct Request {
    uri: Uri,
    request_type: RequestType,
    arguments: Vec<Value>,
    outcome: Outcome,
}

impl Request {
    /// Extracts the request type from the URI's `type=call|publish` query
    /// parameter, defaulting to `Unspecified` if absent or unrecognized.
    pub fn new(uri: Uri, arguments: Vec<Value>) -> Request {
        let request_type = match uri.get_parameter("type") {
            Some("call") => RequestType::Call,
            Some("publish") => RequestType::Publish,
            _ => RequestType::Unspecified,
        };
        Request {
            uri,
            request_type,
            arguments,
            outcome: Outcome::new(),
        }
    }

    pub fn with_type(uri: Uri, request_type: RequestType, arguments: Vec<Value>) -> Request {
        Request {
            uri,
            request_type,
            arguments,
            outcome: Outcome::new(),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn set_request_type(&mut self, request_type: RequestType) {
        self.request_type = request_type;
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    pub fn push_argument(&mut self, value: Value) {
        self.arguments.push(value);
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.outcome
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }
}

/// Ordered result values plus an ordered error list. WAMP only ever wires
/// back the first error; the rest is informational for local callers.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    values: Vec<Value>,
    errors: Vec<(String, Option<Value>)>,
}

impl Outcome {
    pub fn new() -> Outcome {
        Outcome::default()
    }

    pub fn push_value(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn push_error(&mut self, description: impl Into<String>, details: Option<Value>) {
        self.errors.push((description.into(), details));
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn errors(&self) -> &[(String, Option<Value>)] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&(String, Option<Value>)> {
        self.errors.first()
    }

    /// `null` for zero values, the bare value for one, a JSON array for
    /// two or more — the WAMP CallResult collapse rule (§8 invariant 6).
    pub fn collapse(&self) -> Value {
        match self.values.len() {
            0 => Value::Null,
            1 => self.values[0].clone(),
            _ => Value::Array(self.values.clone()),
        }
    }
}

/// `handle` runs a request against this handler's own logic.
/// `handle_catch_all` runs it against a path remainder that didn't reach
/// a leaf; the default delegates straight to `handle`; `name` must be
/// unique among the handlers installed on a single node (§4.3).
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    fn is_catch_all(&self) -> bool;

    fn handle(&self, request: &mut Request);

    fn handle_catch_all(&self, _path_remainder: &str, request: &mut Request) {
        self.handle(request);
    }
}

/// A single bound parameter: `MethodHandler` converts each positional
/// argument through one of these before invoking the target function.
pub type MethodFn = dyn Fn(&[Value]) -> Result<Option<Value>, RpcError> + Send + Sync;

/// Binds an external function (already boxed as a `MethodFn` by the
/// caller's registration code — see the redesign note in §9 about giving
/// up on reflection for a statically typed registration API) to a node
/// under `name`. `handle` performs arity checking; the function itself is
/// responsible for converting its own arguments out of `Value`.
pub struct MethodHandler {
    name: String,
    is_catch_all: bool,
    arity: Option<usize>,
    func: Box<MethodFn>,
}

impl MethodHandler {
    pub fn new(name: impl Into<String>, arity: Option<usize>, func: Box<MethodFn>) -> MethodHandler {
        MethodHandler {
            name: name.into(),
            is_catch_all: false,
            arity,
            func,
        }
    }

    pub fn new_catch_all(
        name: impl Into<String>,
        arity: Option<usize>,
        func: Box<MethodFn>,
    ) -> MethodHandler {
        MethodHandler {
            name: name.into(),
            is_catch_all: true,
            arity,
            func,
        }
    }
}

impl Handler for MethodHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_catch_all(&self) -> bool {
        self.is_catch_all
    }

    fn handle(&self, request: &mut Request) {
        if let Some(arity) = self.arity {
            if request.arguments().len() != arity {
                request.outcome_mut().push_error(
                    "invalid number of method arguments",
                    Some(Value::String(format!(
                        "expected {} argument(s), got {}",
                        arity,
                        request.arguments().len()
                    ))),
                );
                return;
            }
        }
        match (self.func)(request.arguments()) {
            Ok(Some(value)) => request.outcome_mut().push_value(value),
            Ok(None) => {}
            Err(rpc_error) => request
                .outcome_mut()
                .push_error(rpc_error.message, rpc_error.details),
        }
    }
}

/// Converts an `Error` raised while binding arguments into the
/// `Result.errors` entry it becomes upstream (§4.7 step 4).
pub fn argument_error(err: Error) -> (String, Option<Value>) {
    match err.kind {
        ErrorKind::ArgumentMismatch(ref msg) => {
            ("cannot call method with specified arguments".to_string(), Some(Value::String(msg.clone())))
        }
        other => (other.description(), None),
    }
}
