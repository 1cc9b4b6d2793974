//! A symmetric WAMP v1 peer (broker/dealer/publisher/subscriber/caller/callee)
//! layered on a hierarchical, URI-addressed directory of handlers that
//! doubles as an access-control overlay: mounting a link (virtual node)
//! under a peer's home path is what makes a subtree of another peer's
//! handlers callable at all.

pub mod connection;
pub mod directory;
pub mod error;
pub mod frame;
pub mod path_walker;
pub mod service;
pub mod uri;
pub mod utils;

pub use connection::wamp::WampConnection;
pub use connection::{Connection, ConnectionObserver, ConnectionRegistry, RpcCallback};
pub use directory::{Directory, Handler, MethodHandler, Outcome, Request, RequestType};
pub use error::{Error, ErrorKind, IntercomResult};
pub use frame::FrameSender;
pub use service::{ServiceDefinition, ServiceRegistry};
pub use uri::Uri;
