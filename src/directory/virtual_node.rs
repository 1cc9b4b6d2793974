//! §4.4/§9 "Virtual-node double-dispatch": the access-control overlay. A
//! `VirtualNode` mirrors a real node's identity (`name`, `num_children`,
//! `has_child`, `handle` all delegate straight through) but carries its own
//! handler set. While that set is non-empty it keeps exactly one catch-all
//! handler — the overlay — installed on the real node it wraps; that
//! overlay is the only thing a request traversal ever actually sees.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use super::handler::{Handler, Request};
use super::{DirEntry, HandlerRef};
use crate::error::Error;

pub type VirtualNodeRef = Arc<VirtualNode>;

struct VirtualInner {
    handlers: HashMap<String, HandlerRef>,
    handler_order: Vec<String>,
    catch_all: Vec<HandlerRef>,
    virtual_children: HashMap<String, VirtualNodeRef>,
    /// Once cleared by `deactivate`, never set again (§9 "stale link").
    active: bool,
}

pub struct VirtualNode {
    real: DirEntry,
    overlay_name: String,
    weak_self: Weak<VirtualNode>,
    inner: RwLock<VirtualInner>,
}

impl VirtualNode {
    pub fn new(real: DirEntry, overlay_name: String) -> VirtualNodeRef {
        Arc::new_cyclic(|weak_self| VirtualNode {
            real,
            overlay_name,
            weak_self: weak_self.clone(),
            inner: RwLock::new(VirtualInner {
                handlers: HashMap::new(),
                handler_order: Vec::new(),
                catch_all: Vec::new(),
                virtual_children: HashMap::new(),
                active: true,
            }),
        })
    }

    pub fn name(&self) -> String {
        self.real.name()
    }

    /// The entry this node wraps — itself possibly another virtual node,
    /// for a link pointed at another link.
    pub fn real_entry(&self) -> DirEntry {
        self.real.clone()
    }

    pub fn num_children(&self) -> usize {
        self.real.num_children()
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.real.has_child(name)
    }

    pub fn is_reachable(&self, target: &DirEntry) -> bool {
        self.real.is_reachable(target)
    }

    /// Returns an existing cached virtual child, or wraps the real child
    /// in a fresh one and caches it. Lazy, recursive: the whole virtual
    /// subtree mirrors the real one one child at a time, on demand.
    pub fn get_child(&self, name: &str) -> Option<DirEntry> {
        if let Some(existing) = self.inner.read().unwrap().virtual_children.get(name) {
            return Some(DirEntry::Virtual(existing.clone()));
        }
        let real_child = self.real.get_child(name)?;
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner.virtual_children.get(name) {
            return Some(DirEntry::Virtual(existing.clone()));
        }
        let child_overlay_name = format!("{}:{}", self.overlay_name, name);
        let virtual_child = VirtualNode::new(real_child, child_overlay_name);
        inner.virtual_children.insert(name.to_string(), virtual_child.clone());
        Some(DirEntry::Virtual(virtual_child))
    }

    /// Adds to this virtual node's own handler set. Installs the overlay
    /// on the wrapped real node on the 0 -> >=1 transition — unless this
    /// node has already been deactivated, in which case the handler is
    /// recorded but never becomes externally visible.
    pub fn add_handler(&self, handler: HandlerRef) -> Result<(), Error> {
        let install = {
            let mut inner = self.inner.write().unwrap();
            if inner.handlers.contains_key(handler.name()) {
                return Err(Error::new(crate::error::ErrorKind::DuplicateName(
                    handler.name().to_string(),
                )));
            }
            let was_empty = inner.handlers.is_empty();
            if handler.is_catch_all() {
                inner.catch_all.push(handler.clone());
            }
            inner.handler_order.push(handler.name().to_string());
            inner.handlers.insert(handler.name().to_string(), handler);
            was_empty && inner.active
        };
        if install {
            self.install_overlay()?;
        }
        Ok(())
    }

    pub fn remove_handler(&self, name: &str) {
        let uninstall = {
            let mut inner = self.inner.write().unwrap();
            if inner.handlers.remove(name).is_none() {
                return;
            }
            inner.handler_order.retain(|n| n != name);
            inner.catch_all.retain(|h| h.name() != name);
            inner.handlers.is_empty() && inner.active
        };
        if uninstall {
            self.uninstall_overlay();
        }
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.inner.read().unwrap().handlers.contains_key(name)
    }

    pub fn catch_all_handlers(&self) -> Vec<HandlerRef> {
        self.inner.read().unwrap().catch_all.clone()
    }

    pub fn handlers_in_order(&self) -> Vec<HandlerRef> {
        let inner = self.inner.read().unwrap();
        inner
            .handler_order
            .iter()
            .filter_map(|n| inner.handlers.get(n).cloned())
            .collect()
    }

    /// Irreversible. Recursively deactivates every cached virtual child
    /// first, then removes the overlay if one was installed. After this,
    /// `add_handler` can still record handlers locally but will never
    /// reinstall the overlay.
    pub fn deactivate(&self) {
        let (children, had_handlers) = {
            let mut inner = self.inner.write().unwrap();
            if !inner.active {
                return;
            }
            inner.active = false;
            (
                inner.virtual_children.values().cloned().collect::<Vec<_>>(),
                !inner.handlers.is_empty(),
            )
        };
        for child in children {
            child.deactivate();
        }
        if had_handlers {
            self.uninstall_overlay();
        }
    }

    fn install_overlay(&self) -> Result<(), Error> {
        let overlay: HandlerRef = Arc::new(OverlayHandler {
            name: self.overlay_name.clone(),
            target: self.weak_self.clone(),
        });
        self.real.add_handler(overlay)
    }

    fn uninstall_overlay(&self) {
        self.real.remove_handler(&self.overlay_name);
    }
}

/// The single catch-all handler a `VirtualNode` installs on its real node.
/// `handle` fires every virtual handler (the node was reached as the exact
/// target); `handle_catch_all` fires only the virtual catch-alls (the node
/// was reached partway down, as an ancestor of the real target).
struct OverlayHandler {
    name: String,
    target: Weak<VirtualNode>,
}

impl Handler for OverlayHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_catch_all(&self) -> bool {
        true
    }

    fn handle(&self, request: &mut Request) {
        if let Some(target) = self.target.upgrade() {
            for handler in target.handlers_in_order() {
                handler.handle(request);
            }
        }
    }

    fn handle_catch_all(&self, path_remainder: &str, request: &mut Request) {
        if let Some(target) = self.target.upgrade() {
            for handler in target.catch_all_handlers() {
                handler.handle_catch_all(path_remainder, request);
            }
        }
    }
}
