//! §4.9: `WampConnection`, the per-peer protocol state machine. Parses and
//! emits the nine message types, correlates RPC calls to responses via
//! `pendingCalls`, maintains the subscription/CURIE tables, and routes
//! inbound publishes/events/calls into the shared [`Directory`] under this
//! peer's home path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, trace, warn};
use serde_json::Value;

use crate::directory::{Directory, Handler, Request, RequestType};
use crate::frame::FrameSender;
use crate::uri::Uri;
use crate::utils::{epoch_millis, random_session_id};

use super::message::Message;
use super::relay::{self, RelayHandler};
use super::{Connection, ConnectionRegistry, RpcCallback};

/// `[0, sessionId, 1, "general.ai-Intercom/<build-tag>"]` (§6). Opaque to
/// the client; echoed back verbatim via `Connection::server_id`.
const SERVER_ID: &str = concat!("general.ai-Intercom/", env!("CARGO_PKG_VERSION"));

fn normalize_home_path(path: impl Into<String>) -> String {
    let path = path.into();
    let mut normalized = if path.starts_with('/') { path } else { format!("/{}", path) };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// A `Subscribe`/`Unsubscribe` pair of (absolute directory path, installed
/// relay handler name) recorded so `close()` can tear both down precisely.
#[derive(Clone)]
struct ServerSubscription {
    path: String,
    handler_name: String,
}

pub struct WampConnection {
    uri: Uri,
    user: Mutex<Option<String>>,
    home_path: Mutex<String>,
    session_id: Mutex<String>,
    server_id: Mutex<String>,
    is_ready: AtomicBool,
    is_server: AtomicBool,
    rpc_counter: AtomicU64,
    pending_calls: Mutex<HashMap<String, Box<dyn RpcCallback>>>,
    client_subscribed_uris: Mutex<Vec<String>>,
    server_subscribed_paths: Mutex<Vec<ServerSubscription>>,
    curie_prefixes: Mutex<HashMap<String, String>>,
    frame_sender: Arc<dyn FrameSender>,
    directory: Arc<Directory>,
    registry: Option<Arc<ConnectionRegistry>>,
    weak_self: Weak<WampConnection>,
}

impl WampConnection {
    /// Instances start as client (§4.9 "Modes"); `welcome` flips a peer
    /// into server mode.
    pub fn new(
        uri: Uri,
        home_path: impl Into<String>,
        frame_sender: Arc<dyn FrameSender>,
        directory: Arc<Directory>,
        registry: Option<Arc<ConnectionRegistry>>,
    ) -> Arc<WampConnection> {
        Arc::new_cyclic(|weak_self| WampConnection {
            uri,
            user: Mutex::new(None),
            home_path: Mutex::new(normalize_home_path(home_path)),
            session_id: Mutex::new("0".to_string()),
            server_id: Mutex::new(String::new()),
            is_ready: AtomicBool::new(false),
            is_server: AtomicBool::new(false),
            rpc_counter: AtomicU64::new(0),
            pending_calls: Mutex::new(HashMap::new()),
            client_subscribed_uris: Mutex::new(Vec::new()),
            server_subscribed_paths: Mutex::new(Vec::new()),
            curie_prefixes: Mutex::new(HashMap::new()),
            frame_sender,
            directory,
            registry,
            weak_self: weak_self.clone(),
        })
    }

    pub fn set_user_account(&self, user: Option<String>) {
        *self.user.lock().unwrap() = user;
    }

    pub fn set_home_path(&self, path: impl Into<String>) {
        *self.home_path.lock().unwrap() = normalize_home_path(path);
    }

    /// Flips to server mode, sends a Welcome, and marks ready. `session_id`
    /// defaults to a fresh random one (§6) when not supplied.
    pub fn welcome(&self, session_id: Option<String>) {
        let session_id = session_id.unwrap_or_else(random_session_id);
        *self.session_id.lock().unwrap() = session_id.clone();
        *self.server_id.lock().unwrap() = SERVER_ID.to_string();
        self.is_server.store(true, Ordering::SeqCst);
        self.send(&Message::Welcome { session_id, server_id: SERVER_ID.to_string() });
        self.set_ready(true);
    }

    fn set_ready(&self, ready: bool) {
        let was_ready = self.is_ready.swap(ready, Ordering::SeqCst);
        if was_ready == ready {
            return;
        }
        let Some(registry) = &self.registry else { return };
        if ready {
            if let Some(strong_self) = self.weak_self.upgrade() {
                let as_connection: Arc<dyn Connection> = strong_self;
                if let Err(e) = registry.add(as_connection) {
                    warn!("connection registry rejected ready transition: {}", e);
                }
            }
        } else {
            registry.remove(&self.session_id());
        }
    }

    fn send(&self, message: &Message) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.frame_sender.send_text(text),
            Err(e) => {
                warn!("failed to encode outbound message: {}", e);
                false
            }
        }
    }

    /// Substitutes a registered CURIE short prefix before parsing, per
    /// §4.9 "URI resolution inbound". Already-absolute URIs (`scheme://`)
    /// are left untouched — §8 invariant 8.
    fn resolve_uri(&self, raw: &str) -> Result<Uri, crate::error::Error> {
        let expanded = match raw.find(':') {
            Some(idx) if !raw[idx + 1..].starts_with("//") => {
                let (short, rest) = (&raw[..idx], &raw[idx + 1..]);
                match self.curie_prefixes.lock().unwrap().get(short) {
                    Some(expansion) => format!("{}{}", expansion, rest),
                    None => raw.to_string(),
                }
            }
            _ => raw.to_string(),
        };
        Uri::parse(&expanded)
    }

    fn on_welcome(&self, session_id: String, server_id: String) -> bool {
        *self.session_id.lock().unwrap() = session_id;
        *self.server_id.lock().unwrap() = server_id;
        self.set_ready(true);
        true
    }

    fn on_prefix(&self, short: String, uri: String) -> bool {
        self.curie_prefixes.lock().unwrap().insert(short, uri);
        true
    }

    /// §4.9 "Call inbound (id 2, server side)".
    fn on_call(&self, call_id: String, raw_uri: String, args: Vec<Value>) -> bool {
        let uri = match self.resolve_uri(&raw_uri) {
            Ok(uri) => uri,
            Err(_) => {
                let mut error_uri = Uri::new();
                error_uri.set_path(raw_uri);
                error_uri.set_fragment(Some("rpc_error".to_string()));
                return self.send(&Message::CallError {
                    call_id,
                    error_uri: error_uri.to_string(),
                    description: "invalid uri".to_string(),
                    details: None,
                });
            }
        };
        let mut request = Request::with_type(uri.clone(), RequestType::Call, args);
        let count = self.directory.handle(&self.home_path(), &mut request);
        let outcome = request.into_outcome();

        if count == 0 {
            let mut error_uri = uri;
            error_uri.set_fragment(Some("rpc_error".to_string()));
            return self.send(&Message::CallError {
                call_id,
                error_uri: error_uri.to_string(),
                description: "undefined method".to_string(),
                details: None,
            });
        }
        if outcome.has_errors() {
            let (description, details) = outcome.first_error().unwrap().clone();
            let mut error_uri = uri;
            error_uri.set_fragment(Some("logic_error".to_string()));
            return self.send(&Message::CallError { call_id, error_uri: error_uri.to_string(), description, details });
        }
        self.send(&Message::CallResult { call_id, result: outcome.collapse() })
    }

    fn on_call_result(&self, call_id: String, result: Value) -> bool {
        if let Some(mut callback) = self.pending_calls.lock().unwrap().remove(&call_id) {
            callback.on_success(result);
        }
        true
    }

    fn on_call_error(&self, call_id: String, error_uri: String, description: String, details: Option<Value>) -> bool {
        if let Some(mut callback) = self.pending_calls.lock().unwrap().remove(&call_id) {
            callback.on_error(error_uri, description, details);
        }
        true
    }

    /// §4.9 "Subscribe/unsubscribe... Server-side on receiving id 5".
    fn on_subscribe(&self, raw_uri: String) -> bool {
        let Ok(resolved) = self.resolve_uri(&raw_uri) else { return false };
        let path = resolved.path();
        let is_wildcard = path.ends_with("/*");
        let stripped = if is_wildcard { path.trim_end_matches("/*") } else { path };
        let abs_path = format!("{}{}", self.home_path(), stripped);

        let mut relay_uri = resolved.clone();
        relay_uri.set_path(stripped.to_string());

        let handler_name = relay::handler_name(&abs_path, self.user_account().as_deref(), &self.session_id());
        let Some(connection) = self.weak_self.upgrade() else { return false };
        let handler = Arc::new(RelayHandler::new(handler_name.clone(), connection as Arc<dyn Connection>, relay_uri, is_wildcard));

        // Idempotent: a duplicate subscribe to an already-subscribed path
        // is a no-op, not an error.
        match self.directory.add_handler(&abs_path, handler) {
            Ok(()) => {
                self.server_subscribed_paths
                    .lock()
                    .unwrap()
                    .push(ServerSubscription { path: abs_path, handler_name });
            }
            Err(_) => trace!("subscribe to already-subscribed path {} ignored", abs_path),
        }
        true
    }

    fn on_unsubscribe(&self, raw_uri: String) -> bool {
        let Ok(resolved) = self.resolve_uri(&raw_uri) else { return false };
        let path = resolved.path();
        let stripped = path.trim_end_matches("/*");
        let abs_path = format!("{}{}", self.home_path(), stripped);
        let handler_name = relay::handler_name(&abs_path, self.user_account().as_deref(), &self.session_id());

        self.directory.remove_handler(&abs_path, &handler_name);
        self.server_subscribed_paths.lock().unwrap().retain(|s| s.path != abs_path);
        true
    }

    /// §4.9 "Publish inbound"/"Event inbound": both mean "deliver payload
    /// to subscribers of topic" and share this dispatch path. `exclude`
    /// and `eligible` (only ever populated from a `Publish` frame) are
    /// translated into URI query parameters the way §4.9 specifies —
    /// filtering happens entirely in `RelayHandler`, never by mutating the
    /// `Request`'s type (§9 open question: `excludeMe` is never actually
    /// stripped before local re-dispatch).
    fn handle_incoming_event(&self, raw_uri: String, event: Value, exclude_me: bool, exclude: Vec<String>, eligible: Vec<String>) -> bool {
        let Ok(mut uri) = self.resolve_uri(&raw_uri) else { return false };
        if exclude_me {
            uri.set_parameter("exclude", self.session_id());
        } else if !exclude.is_empty() {
            uri.set_parameter("exclude", exclude.join(","));
        }
        if !eligible.is_empty() {
            uri.set_parameter("eligible", eligible.join(","));
        }
        let mut request = Request::with_type(uri, RequestType::Publish, vec![event]);
        self.directory.handle(&self.home_path(), &mut request);
        true
    }
}

impl Connection for WampConnection {
    fn uri(&self) -> Uri {
        self.uri.clone()
    }

    fn user_account(&self) -> Option<String> {
        self.user.lock().unwrap().clone()
    }

    fn home_path(&self) -> String {
        self.home_path.lock().unwrap().clone()
    }

    fn session_id(&self) -> String {
        self.session_id.lock().unwrap().clone()
    }

    fn server_id(&self) -> String {
        self.server_id.lock().unwrap().clone()
    }

    fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    fn process(&self, text: &str) -> bool {
        let message: Message = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("dropping malformed frame: {}", e);
                return false;
            }
        };
        match message {
            Message::Welcome { session_id, server_id } => self.on_welcome(session_id, server_id),
            Message::Prefix { short, uri } => self.on_prefix(short, uri),
            Message::Call { call_id, uri, args } => self.on_call(call_id, uri, args),
            Message::CallResult { call_id, result } => self.on_call_result(call_id, result),
            Message::CallError { call_id, error_uri, description, details } => {
                self.on_call_error(call_id, error_uri, description, details)
            }
            Message::Subscribe { uri } => self.on_subscribe(uri),
            Message::Unsubscribe { uri } => self.on_unsubscribe(uri),
            Message::Publish { uri, event, exclude_me, exclude, eligible } => {
                self.handle_incoming_event(uri, event, exclude_me, exclude, eligible)
            }
            Message::Event { uri, event } => self.handle_incoming_event(uri, event, false, Vec::new(), Vec::new()),
        }
    }

    /// Emits id 7 (Publish) in client mode, id 8 (Event) in server mode
    /// (§4.9 "Publish vs Event asymmetry").
    fn publish(&self, uri: &str, event: Value, exclude_me: bool, exclude: Vec<String>, eligible: Vec<String>) -> bool {
        if !self.is_ready() {
            return false;
        }
        let message = if self.is_server.load(Ordering::SeqCst) {
            Message::Event { uri: uri.to_string(), event }
        } else {
            Message::Publish { uri: uri.to_string(), event, exclude_me, exclude, eligible }
        };
        self.send(&message)
    }

    fn subscribe(&self, uri: &str) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.client_subscribed_uris.lock().unwrap().push(uri.to_string());
        self.send(&Message::Subscribe { uri: uri.to_string() })
    }

    fn unsubscribe(&self, uri: &str) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.client_subscribed_uris.lock().unwrap().retain(|u| u != uri);
        self.send(&Message::Unsubscribe { uri: uri.to_string() })
    }

    fn call(&self, uri: &str, args: Vec<Value>, callback: Box<dyn RpcCallback>) -> bool {
        if !self.is_ready() {
            return false;
        }
        let counter = self.rpc_counter.fetch_add(1, Ordering::SeqCst);
        let call_id = format!("{}:{}:{}", self.session_id(), counter, epoch_millis());
        self.pending_calls.lock().unwrap().insert(call_id.clone(), callback);
        self.send(&Message::Call { call_id, uri: uri.to_string(), args })
    }

    /// Cancels every client-side subscription (sends Unsubscribe, clears
    /// the list) and drops every server-side relay handler, then marks
    /// not-ready (§4.9 "Close").
    fn close(&self) {
        let subscriptions: Vec<String> = self.client_subscribed_uris.lock().unwrap().drain(..).collect();
        for uri in subscriptions {
            self.send(&Message::Unsubscribe { uri });
        }
        let server_subscriptions: Vec<ServerSubscription> = self.server_subscribed_paths.lock().unwrap().drain(..).collect();
        for subscription in server_subscriptions {
            self.directory.remove_handler(&subscription.path, &subscription.handler_name);
        }
        self.set_ready(false);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::connection::ClosureCallback;
    use crate::directory::MethodHandler;
    use crate::frame::ChannelFrameSender;

    struct Peer {
        connection: Arc<WampConnection>,
        sender: ChannelFrameSender,
    }

    fn peer(home_path: &str, directory: &Arc<Directory>) -> Peer {
        let sender = ChannelFrameSender::new();
        let connection = WampConnection::new(Uri::new(), home_path, Arc::new(sender.clone()), directory.clone(), None);
        Peer { connection, sender }
    }

    /// Delivers every frame `from` has queued since the last drain to `to`.
    fn deliver(from: &Peer, to: &Peer) {
        for frame in from.sender.take() {
            to.connection.process(&frame);
        }
    }

    #[test]
    fn s1_welcome_handshake() {
        let directory = Arc::new(Directory::new());
        let server = peer("/home/u", &directory);
        let client = peer("/home/u", &directory);

        server.connection.welcome(Some("test-session".to_string()));
        assert_eq!(server.sender.sent(), vec![r#"[0,"test-session",1,"general.ai-Intercom/0.1.0"]"#.to_string()]);
        assert!(server.connection.is_ready());

        deliver(&server, &client);
        assert_eq!(client.connection.session_id(), "test-session");
        assert!(client.connection.is_ready());
    }

    #[test]
    fn s2_subscribe_then_event() {
        let directory = Arc::new(Directory::new());
        let server = peer("/home/u", &directory);
        let client = peer("/home/u", &directory);
        server.connection.welcome(Some("test-session".to_string()));
        deliver(&server, &client);
        client.connection.set_user_account(Some("u".to_string()));

        client.connection.subscribe("/event/topic1");
        deliver(&client, &server);
        assert!(directory.path_exists("/home/u/event/topic1"));

        server.connection.publish("/event/topic1", Value::from("hello"), false, vec![], vec![]);
        deliver(&server, &client);

        let hits = Arc::new(Mutex::new(Vec::new()));
        let hits2 = hits.clone();
        directory
            .add_handler(
                "/home/u/event/topic1",
                Arc::new(MethodHandler::new(
                    "sink",
                    Some(1),
                    Box::new(move |args| {
                        hits2.lock().unwrap().push(args[0].clone());
                        Ok(None)
                    }),
                )),
            )
            .unwrap();

        server.connection.publish("/event/topic1", Value::from("hello again"), false, vec![], vec![]);
        deliver(&server, &client);
        assert_eq!(hits.lock().unwrap().as_slice(), &[Value::from("hello again")]);
    }

    #[test]
    fn s3_wildcard_subscribe_and_catch_all() {
        let directory = Arc::new(Directory::new());
        let server = peer("/home/u", &directory);
        let client = peer("/home/u", &directory);
        server.connection.welcome(Some("test-session".to_string()));
        deliver(&server, &client);

        client.connection.subscribe("/topics/cat1/*");
        deliver(&client, &server);

        let received = Arc::new(Mutex::new(None));
        let received2 = received.clone();
        directory
            .add_handler(
                "/home/u/topics/cat1",
                Arc::new(MethodHandler::new_catch_all(
                    "sink",
                    Some(1),
                    Box::new(move |args| {
                        *received2.lock().unwrap() = Some(args[0].clone());
                        Ok(None)
                    }),
                )),
            )
            .unwrap();

        server.connection.publish("/topics/cat1/topic3", Value::from("x"), false, vec![], vec![]);
        deliver(&server, &client);
        assert_eq!(*received.lock().unwrap(), Some(Value::from("x")));
    }

    #[test]
    fn s4_rpc_with_three_args_single_result() {
        let directory = Arc::new(Directory::new());
        directory
            .add_handler(
                "/rpc/method2",
                Arc::new(MethodHandler::new(
                    "method2",
                    Some(3),
                    Box::new(|args| {
                        let sum: i64 = args.iter().map(|v| v.as_i64().unwrap_or(0)).sum();
                        Ok(Some(Value::from(sum)))
                    }),
                )),
            )
            .unwrap();

        let server = peer("/", &directory);
        let client = peer("/", &directory);
        server.connection.welcome(Some("test-session".to_string()));
        deliver(&server, &client);

        let result = Arc::new(Mutex::new(None));
        let result2 = result.clone();
        client.connection.call(
            "/rpc/method2",
            vec![Value::from(2), Value::from(3), Value::from(5)],
            Box::new(ClosureCallback {
                on_success: Some(move |v| *result2.lock().unwrap() = Some(v)),
                on_error: Some(|_: String, _: String, _: Option<Value>| {}),
            }),
        );
        deliver(&client, &server);
        deliver(&server, &client);
        assert_eq!(*result.lock().unwrap(), Some(Value::from(10)));
    }

    #[test]
    fn s5_catch_all_and_leaf_handlers_both_fire_and_collapse_to_array() {
        let directory = Arc::new(Directory::new());
        directory
            .add_handler(
                "/rpc/catchall",
                Arc::new(MethodHandler::new_catch_all(
                    "product",
                    Some(3),
                    Box::new(|args| {
                        let product: i64 = args.iter().map(|v| v.as_i64().unwrap_or(1)).product();
                        Ok(Some(Value::from(product)))
                    }),
                )),
            )
            .unwrap();
        directory
            .add_handler(
                "/rpc/catchall/method2",
                Arc::new(MethodHandler::new(
                    "method2",
                    Some(3),
                    Box::new(|args| {
                        let sum: i64 = args.iter().map(|v| v.as_i64().unwrap_or(0)).sum();
                        Ok(Some(Value::from(sum)))
                    }),
                )),
            )
            .unwrap();

        let server = peer("/", &directory);
        let client = peer("/", &directory);
        server.connection.welcome(Some("test-session".to_string()));
        deliver(&server, &client);

        let result = Arc::new(Mutex::new(None));
        let result2 = result.clone();
        client.connection.call(
            "/rpc/catchall/method2",
            vec![Value::from(2), Value::from(3), Value::from(5)],
            Box::new(ClosureCallback {
                on_success: Some(move |v| *result2.lock().unwrap() = Some(v)),
                on_error: Some(|_: String, _: String, _: Option<Value>| {}),
            }),
        );
        deliver(&client, &server);
        deliver(&server, &client);
        assert_eq!(*result.lock().unwrap(), Some(Value::Array(vec![Value::from(30), Value::from(10)])));
    }

    #[test]
    fn s6_exclude_me_publish_skips_the_publisher_but_reaches_others() {
        // Each subscriber gets its own server-side connection (as it would
        // over three distinct WebSocket sockets in production) since a
        // RelayHandler binds to whichever connection object processed its
        // Subscribe frame.
        let directory = Arc::new(Directory::new());
        let (server_a, a) = (peer("/home/u", &directory), peer("/home/u", &directory));
        let (server_b, b) = (peer("/home/u", &directory), peer("/home/u", &directory));
        let (server_c, c) = (peer("/home/u", &directory), peer("/home/u", &directory));
        server_a.connection.welcome(Some("A".to_string()));
        server_b.connection.welcome(Some("B".to_string()));
        server_c.connection.welcome(Some("C".to_string()));
        deliver(&server_a, &a);
        deliver(&server_b, &b);
        deliver(&server_c, &c);

        a.connection.subscribe("/t");
        b.connection.subscribe("/t");
        c.connection.subscribe("/t");
        deliver(&a, &server_a);
        deliver(&b, &server_b);
        deliver(&c, &server_c);

        // `A` is both a subscriber and the publisher: it sends a Publish
        // frame (client mode) with excludeMe=true to its own server
        // connection, which fans the event out through every relay handler
        // on `/home/u/t` — including the other two sessions' — but skips
        // its own.
        a.connection.publish("/t", Value::from("hi"), true, vec![], vec![]);
        deliver(&a, &server_a);

        assert!(server_a.sender.sent().is_empty());
        assert_eq!(server_b.sender.sent(), vec![r#"[8,"/t","hi"]"#.to_string()]);
        assert_eq!(server_c.sender.sent(), vec![r#"[8,"/t","hi"]"#.to_string()]);
    }

    #[test]
    fn s8_curie_prefixed_call_resolves_and_succeeds() {
        let directory = Arc::new(Directory::new());
        directory
            .add_handler(
                "/rpc/prefix",
                Arc::new(MethodHandler::new(
                    "prefix",
                    Some(3),
                    Box::new(|args| {
                        let sum: i64 = args.iter().map(|v| v.as_i64().unwrap_or(0)).sum();
                        Ok(Some(Value::from(sum)))
                    }),
                )),
            )
            .unwrap();

        let server = peer("/", &directory);
        let client = peer("/", &directory);
        server.connection.welcome(Some("test-session".to_string()));
        deliver(&server, &client);

        // The client's Prefix frame is delivered to the server connection,
        // whose own `curie_prefixes` table resolves its subsequent Call.
        server.connection.process(r#"[1,"curie","wamp://u@host/rpc/"]"#);
        assert_eq!(server.connection.curie_prefixes.lock().unwrap().get("curie"), Some(&"wamp://u@host/rpc/".to_string()));

        server.connection.process(r#"[2,"id1","curie:prefix",100,10,1]"#);
        assert_eq!(server.sender.sent(), vec![r#"[3,"id1",111]"#.to_string()]);
    }

    #[test]
    fn s7_unlink_revokes_rpc_access() {
        let directory = Arc::new(Directory::new());
        directory
            .add_handler(
                "/root/rpc/m1",
                Arc::new(MethodHandler::new("m1", Some(0), Box::new(|_| Ok(Some(Value::from(1)))))),
            )
            .unwrap();
        directory.create_path("/home/u").unwrap();
        directory.link("/home/u", "/root/rpc").unwrap();

        let server = peer("/home/u", &directory);
        let client = peer("/home/u", &directory);
        server.connection.welcome(Some("test-session".to_string()));
        deliver(&server, &client);

        let error = Arc::new(Mutex::new(None));
        let error2 = error.clone();
        directory.unlink("/home/u", "/root/rpc").unwrap();
        client.connection.call(
            "/rpc/m1",
            vec![],
            Box::new(ClosureCallback {
                on_success: Some(|_: Value| {}),
                on_error: Some(move |uri: String, desc: String, _details: Option<Value>| {
                    *error2.lock().unwrap() = Some((uri, desc));
                }),
            }),
        );
        deliver(&client, &server);
        deliver(&server, &client);
        let (uri, description) = error.lock().unwrap().clone().unwrap();
        assert!(uri.ends_with("#rpc_error"));
        assert_eq!(description, "undefined method");
    }

    #[test]
    fn curie_expansion_is_idempotent_on_absolute_uris() {
        let directory = Arc::new(Directory::new());
        let conn = peer("/", &directory).connection;
        conn.on_prefix("curie".to_string(), "wamp://u@host/rpc/".to_string());
        let resolved = conn.resolve_uri("curie:prefix").unwrap();
        assert_eq!(resolved.to_string(), "wamp://u@host/rpc/prefix");
        let resolved_again = conn.resolve_uri(&resolved.to_string()).unwrap();
        assert_eq!(resolved_again.to_string(), resolved.to_string());
    }

    #[test]
    fn close_unsubscribes_client_side_and_drops_server_relays() {
        let directory = Arc::new(Directory::new());
        let server = peer("/home/u", &directory);
        let client = peer("/home/u", &directory);
        server.connection.welcome(Some("test-session".to_string()));
        deliver(&server, &client);

        client.connection.subscribe("/event/topic1");
        deliver(&client, &server);
        assert!(directory.path_exists("/home/u/event/topic1"));

        client.connection.close();
        assert!(client.connection.client_subscribed_uris.lock().unwrap().is_empty());
        deliver(&client, &server);

        server.connection.close();
        assert!(server.connection.server_subscribed_paths.lock().unwrap().is_empty());
    }
}
