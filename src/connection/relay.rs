//! §4.10: the `RelayHandler`, installed server-side on the directory node
//! a peer subscribed to. When that node (or a descendant) is traversed as
//! part of a publish, the handler re-emits the event to the one peer it
//! belongs to, honoring `exclude`/`eligible` and rewriting the path into
//! that peer's own URI space.

use std::sync::Arc;

use serde_json::Value;

use crate::directory::{Handler, Request, RequestType};
use crate::uri::Uri;

use super::Connection;

/// `<absPath> "->" [userAccount] "@" sessionId` (§6). Part of the external
/// contract: administrative tooling may query handler names by this exact
/// shape, so it must not change.
pub fn handler_name(abs_path: &str, user_account: Option<&str>, session_id: &str) -> String {
    match user_account {
        Some(user) if !user.is_empty() => format!("{}->{}@{}", abs_path, user, session_id),
        _ => format!("{}->@{}", abs_path, session_id),
    }
}

pub struct RelayHandler {
    name: String,
    connection: Arc<dyn Connection>,
    /// The URI this peer will receive, already stripped of a trailing
    /// wildcard if the subscription was `/*`.
    relay_uri: Uri,
    is_wildcard: bool,
}

impl RelayHandler {
    pub fn new(name: String, connection: Arc<dyn Connection>, relay_uri: Uri, is_wildcard: bool) -> RelayHandler {
        RelayHandler { name, connection, relay_uri, is_wildcard }
    }

    fn emit(&self, effective_uri: Uri, request: &mut Request) {
        if request.request_type() != RequestType::Publish || request.arguments().len() != 1 {
            return;
        }
        let session_id = self.connection.session_id();
        if let Some(eligible) = request.uri().get_parameter("eligible") {
            if !split_ids(eligible).any(|id| id == session_id) {
                return;
            }
        }
        if let Some(exclude) = request.uri().get_parameter("exclude") {
            if split_ids(exclude).any(|id| id == session_id) {
                return;
            }
        }
        let event = request.arguments()[0].clone();
        self.connection.publish(&effective_uri.to_string(), event, false, Vec::new(), Vec::new());
    }
}

fn split_ids(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').filter(|s| !s.is_empty())
}

impl Handler for RelayHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_catch_all(&self) -> bool {
        self.is_wildcard
    }

    fn handle(&self, request: &mut Request) {
        self.emit(self.relay_uri.clone(), request);
    }

    fn handle_catch_all(&self, path_remainder: &str, request: &mut Request) {
        let mut effective = self.relay_uri.clone();
        let joined = if effective.path().ends_with('/') {
            format!("{}{}", effective.path(), path_remainder)
        } else {
            format!("{}/{}", effective.path(), path_remainder)
        };
        effective.set_path(joined);
        self.emit(effective, request);
    }
}
