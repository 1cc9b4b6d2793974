//! §4.12: the service/plugin bridge half of the connection registry wiring
//! (the registry itself lives in `crate::connection::ConnectionRegistry`).
//! A flat list of named, independently enable-able [`ServiceDefinition`]s
//! notified whenever any connection becomes ready or is closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::{Connection, ConnectionObserver};

/// A callback pair a plugin registers to be told about every connection's
/// lifecycle. `on_ready`/`on_closed` may install handlers at arbitrary
/// Directory paths (the Directory absorbs them); the callback is
/// responsible for capturing whatever `Arc<Directory>` it needs — this
/// type has no Directory dependency of its own.
pub struct ServiceDefinition {
    name: String,
    enabled: AtomicBool,
    auto_connect: AtomicBool,
    on_ready: Box<dyn Fn(&Arc<dyn Connection>) + Send + Sync>,
    on_closed: Box<dyn Fn(&Arc<dyn Connection>) + Send + Sync>,
}

impl ServiceDefinition {
    pub fn new(
        name: impl Into<String>,
        on_ready: Box<dyn Fn(&Arc<dyn Connection>) + Send + Sync>,
        on_closed: Box<dyn Fn(&Arc<dyn Connection>) + Send + Sync>,
    ) -> ServiceDefinition {
        ServiceDefinition {
            name: name.into(),
            enabled: AtomicBool::new(true),
            auto_connect: AtomicBool::new(false),
            on_ready,
            on_closed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect.load(Ordering::SeqCst)
    }

    pub fn set_auto_connect(&self, auto_connect: bool) {
        self.auto_connect.store(auto_connect, Ordering::SeqCst);
    }
}

/// The set of registered services (§3 "ServiceRegistry singleton"). A
/// `Directory`-holding application builds one of these, registers its
/// plugins, and hands it to every `ConnectionRegistry` it wants to notify.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<Vec<Arc<ServiceDefinition>>>,
}

impl ServiceRegistry {
    pub fn new() -> ServiceRegistry {
        ServiceRegistry::default()
    }

    pub fn register(&self, service: Arc<ServiceDefinition>) {
        self.services.lock().unwrap().push(service);
    }

    pub fn services(&self) -> Vec<Arc<ServiceDefinition>> {
        self.services.lock().unwrap().clone()
    }
}

impl ConnectionObserver for ServiceRegistry {
    fn on_connection_ready(&self, connection: &Arc<dyn Connection>) {
        for service in self.services.lock().unwrap().iter() {
            if service.is_enabled() {
                (service.on_ready)(connection);
            }
        }
    }

    fn on_connection_closed(&self, connection: &Arc<dyn Connection>) {
        for service in self.services.lock().unwrap().iter() {
            if service.is_enabled() {
                (service.on_closed)(connection);
            }
        }
    }
}
