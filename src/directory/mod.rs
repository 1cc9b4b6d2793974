//! §3/§4.3/§4.4: the directory — a DAG of [`Node`]s (possibly wrapped by a
//! [`VirtualNode`] link overlay) addressed by slash-separated path, plus
//! the handler types a node dispatches requests to.
//!
//! §9 "Global singletons": rather than a process-wide static, this crate
//! exposes `Directory` as an ordinary value. A process that wants one
//! shared directory just builds one `Directory` and hands `Arc<Directory>`
//! (or a plain `&Directory`) to every `Connection`; tests build their own.

pub mod handler;
pub mod node;
pub mod virtual_node;

use std::sync::Arc;

pub use handler::{Handler, MethodHandler, Outcome, Request, RequestType, RpcError};
pub use node::{Node, NodeRef};
pub use virtual_node::{VirtualNode, VirtualNodeRef};

use crate::error::{Error, ErrorKind};
use crate::path_walker::PathWalker;

pub type HandlerRef = Arc<dyn Handler>;

/// A directory entry: either a real node, or a virtual overlay wrapping
/// one. Structural operations (`name`, `num_children`, `has_child`,
/// `is_reachable`, handler installation) are defined generically over both
/// so the facade's path resolver doesn't need to care which it's holding.
#[derive(Clone)]
pub enum DirEntry {
    Concrete(NodeRef),
    Virtual(VirtualNodeRef),
}

impl DirEntry {
    pub fn name(&self) -> String {
        match self {
            DirEntry::Concrete(n) => n.read().unwrap().name().to_string(),
            DirEntry::Virtual(v) => v.name(),
        }
    }

    pub fn num_children(&self) -> usize {
        match self {
            DirEntry::Concrete(n) => n.read().unwrap().num_children(),
            DirEntry::Virtual(v) => v.num_children(),
        }
    }

    pub fn has_child(&self, name: &str) -> bool {
        match self {
            DirEntry::Concrete(n) => n.read().unwrap().has_child(name),
            DirEntry::Virtual(v) => v.has_child(name),
        }
    }

    pub fn get_child(&self, name: &str) -> Option<DirEntry> {
        match self {
            DirEntry::Concrete(n) => n.read().unwrap().get_child(name),
            DirEntry::Virtual(v) => v.get_child(name),
        }
    }

    pub fn is_reachable(&self, target: &DirEntry) -> bool {
        if self.same_as(target) {
            return true;
        }
        match self {
            DirEntry::Concrete(n) => n
                .read()
                .unwrap()
                .children_snapshot()
                .iter()
                .any(|child| child.is_reachable(target)),
            DirEntry::Virtual(v) => v.is_reachable(target),
        }
    }

    pub fn add_handler(&self, handler: HandlerRef) -> Result<(), Error> {
        match self {
            DirEntry::Concrete(n) => n.write().unwrap().add_handler(handler),
            DirEntry::Virtual(v) => v.add_handler(handler),
        }
    }

    pub fn remove_handler(&self, name: &str) {
        match self {
            DirEntry::Concrete(n) => n.write().unwrap().remove_handler(name),
            DirEntry::Virtual(v) => v.remove_handler(name),
        }
    }

    pub fn has_handler(&self, name: &str) -> bool {
        match self {
            DirEntry::Concrete(n) => n.read().unwrap().has_handler(name),
            DirEntry::Virtual(v) => v.has_handler(name),
        }
    }

    /// Mounts a fresh concrete child, recursing through any virtual
    /// wrapper to the real node underneath (links are structurally
    /// transparent: a node reached only through a link still gets new
    /// children mounted on its real, shared identity).
    pub fn mount_child(&self, child: NodeRef) -> Result<(), Error> {
        match self {
            DirEntry::Concrete(n) => node::mount(n, child),
            DirEntry::Virtual(v) => v.real_entry().mount_child(child),
        }
    }

    pub fn deactivate(&self) {
        if let DirEntry::Virtual(v) = self {
            v.deactivate();
        }
    }

    pub fn as_virtual(&self) -> Option<&VirtualNodeRef> {
        match self {
            DirEntry::Virtual(v) => Some(v),
            DirEntry::Concrete(_) => None,
        }
    }

    fn dispatch_target(&self) -> NodeRef {
        match self {
            DirEntry::Concrete(n) => n.clone(),
            DirEntry::Virtual(v) => v.real_entry().dispatch_target(),
        }
    }

    fn same_as(&self, other: &DirEntry) -> bool {
        match (self, other) {
            (DirEntry::Concrete(a), DirEntry::Concrete(b)) => Arc::ptr_eq(a, b),
            (DirEntry::Virtual(a), DirEntry::Virtual(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// An addressable directory: a root node plus the path-keyed operations
/// described in §4.3/§4.4. Build one per process (or one per tenant, per
/// §9's redesign note) and share it behind an `Arc`.
pub struct Directory {
    root: NodeRef,
}

impl Directory {
    pub fn new() -> Directory {
        Directory { root: Node::new("") }
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    /// Resolves an absolute path without creating anything. A trailing
    /// `/*` is ignored, matching `PathWalker`'s own segment handling.
    pub fn resolve(&self, path: &str) -> Option<DirEntry> {
        let mut walker = PathWalker::new(path);
        let mut current = DirEntry::Concrete(self.root.clone());
        while walker.move_down() {
            current = current.get_child(walker.current_node_name())?;
        }
        Some(current)
    }

    pub fn path_exists(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Creates every missing concrete segment along `path`. Existing
    /// segments (concrete or virtual) are left alone.
    pub fn create_path(&self, path: &str) -> Result<DirEntry, Error> {
        let mut walker = PathWalker::new(path);
        let mut current = DirEntry::Concrete(self.root.clone());
        while walker.move_down() {
            let name = walker.current_node_name().to_string();
            current = match current.get_child(&name) {
                Some(child) => child,
                None => {
                    let fresh = Node::new(name.clone());
                    current.mount_child(fresh.clone())?;
                    DirEntry::Concrete(fresh)
                }
            };
        }
        Ok(current)
    }

    /// Unmounts the node at `path` from its parent. No-ops if the path
    /// (or its parent) doesn't exist; the root itself can't be removed.
    pub fn remove_path(&self, path: &str) -> Result<(), Error> {
        let mut walker = PathWalker::new(path);
        if walker.leaf_level() == 0 {
            return Ok(());
        }
        let mut parent = DirEntry::Concrete(self.root.clone());
        while walker.current_level() + 1 < walker.leaf_level() {
            walker.move_down();
            match parent.get_child(walker.current_node_name()) {
                Some(child) => parent = child,
                None => return Ok(()),
            }
        }
        walker.move_down();
        let leaf_name = walker.current_node_name().to_string();
        if let Some(leaf) = parent.get_child(&leaf_name) {
            node::unmount(&parent.dispatch_target(), &leaf);
        }
        Ok(())
    }

    pub fn add_handler(&self, path: &str, handler: HandlerRef) -> Result<(), Error> {
        let entry = self.create_path(path)?;
        entry.add_handler(handler)
    }

    pub fn remove_handler(&self, path: &str, name: &str) {
        if let Some(entry) = self.resolve(path) {
            entry.remove_handler(name);
        }
    }

    /// Resolves `base_path`, then walks `request.uri().path()` as a path
    /// *relative to that node* (a fresh `PathWalker`, not a global one) —
    /// so a home path installed via `add_handler("/home/u/event/topic1",
    /// ..)` is reachable as `handle("/home/u", request-with-path
    /// "/event/topic1")`. Returns the handler invocation count, or 0 if
    /// `base_path` doesn't resolve.
    pub fn handle(&self, base_path: &str, request: &mut Request) -> usize {
        let Some(base) = self.resolve(base_path) else {
            return 0;
        };
        let mut walker = PathWalker::new(request.uri().path());
        node::dispatch(&base.dispatch_target(), &mut walker, request)
    }

    /// Resolves both `from` and `to`, wraps `to` in a virtual node with
    /// overlay name `"virtual:" + from`, and mounts it under `from` keyed
    /// by `to`'s own name. Fails `DuplicateName` if `from` already has a
    /// child of that name (including a previous, still-active link).
    pub fn link(&self, from: &str, to: &str) -> Result<(), Error> {
        let from_entry = self
            .resolve(from)
            .ok_or_else(|| Error::new(ErrorKind::InvalidUri(from.to_string())))?;
        let to_entry = self
            .resolve(to)
            .ok_or_else(|| Error::new(ErrorKind::InvalidUri(to.to_string())))?;
        let name = to_entry.name();
        let overlay_name = format!("virtual:{}", from);
        let virtual_node = VirtualNode::new(to_entry, overlay_name);
        node::mount_virtual(&from_entry.dispatch_target(), name, virtual_node)
    }

    /// Finds the direct child of `from` named like `to`; if it's a
    /// virtual node, deactivates it (irreversibly, recursively) before
    /// unmounting it. No-ops if there is no such link.
    pub fn unlink(&self, from: &str, to: &str) -> Result<(), Error> {
        let from_entry = self
            .resolve(from)
            .ok_or_else(|| Error::new(ErrorKind::InvalidUri(from.to_string())))?;
        let to_entry = self
            .resolve(to)
            .ok_or_else(|| Error::new(ErrorKind::InvalidUri(to.to_string())))?;
        let name = to_entry.name();
        if let Some(child) = from_entry.get_child(&name) {
            if child.as_virtual().is_some() {
                child.deactivate();
                node::unmount(&from_entry.dispatch_target(), &child);
            }
        }
        Ok(())
    }
}

impl Default for Directory {
    fn default() -> Directory {
        Directory::new()
    }
}
