//! §4.3: the concrete `Node` — a directory entry with real children, a
//! handler set, and the per-request traversal algorithm that walks a
//! [`PathWalker`] down a chain of nodes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::handler::Request;
use super::{DirEntry, HandlerRef};
use crate::error::{Error, ErrorKind};
use crate::path_walker::PathWalker;

pub type NodeRef = Arc<RwLock<Node>>;

pub struct Node {
    name: String,
    children: HashMap<String, DirEntry>,
    handlers: HashMap<String, HandlerRef>,
    handler_order: Vec<String>,
    catch_all: Vec<HandlerRef>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> NodeRef {
        Arc::new(RwLock::new(Node {
            name: name.into(),
            children: HashMap::new(),
            handlers: HashMap::new(),
            handler_order: Vec::new(),
            catch_all: Vec::new(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    pub fn get_child(&self, name: &str) -> Option<DirEntry> {
        self.children.get(name).cloned()
    }

    pub fn children_snapshot(&self) -> Vec<DirEntry> {
        self.children.values().cloned().collect()
    }

    pub fn remove_child(&mut self, name: &str) -> Option<DirEntry> {
        self.children.remove(name)
    }

    /// Fails `DuplicateName` if a handler of this name is already installed
    /// at this node; otherwise appends to the catch-all list iff
    /// `handler.is_catch_all()`.
    pub fn add_handler(&mut self, handler: HandlerRef) -> Result<(), Error> {
        if self.handlers.contains_key(handler.name()) {
            return Err(Error::new(ErrorKind::DuplicateName(handler.name().to_string())));
        }
        if handler.is_catch_all() {
            self.catch_all.push(handler.clone());
        }
        self.handler_order.push(handler.name().to_string());
        self.handlers.insert(handler.name().to_string(), handler);
        Ok(())
    }

    /// No-ops silently if `name` isn't installed.
    pub fn remove_handler(&mut self, name: &str) {
        if self.handlers.remove(name).is_some() {
            self.handler_order.retain(|n| n != name);
            self.catch_all.retain(|h| h.name() != name);
        }
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn catch_all_handlers(&self) -> Vec<HandlerRef> {
        self.catch_all.clone()
    }

    /// Stable, insertion-order snapshot of every handler at this node
    /// (catch-all or not).
    pub fn handlers_in_order(&self) -> Vec<HandlerRef> {
        self.handler_order
            .iter()
            .filter_map(|n| self.handlers.get(n).cloned())
            .collect()
    }
}

/// Mounts `child` as a concrete child of `parent`, keyed by `child`'s own
/// name. Fails `Cyclic` if `parent` is already reachable from `child`
/// through concrete edges; fails `DuplicateName` if `parent` already has a
/// child of that name (concrete or virtual).
pub fn mount(parent: &NodeRef, child: NodeRef) -> Result<(), Error> {
    if concrete_is_reachable(&child, parent) {
        return Err(Error::new(ErrorKind::Cyclic));
    }
    let name = child.read().unwrap().name.clone();
    let mut node = parent.write().unwrap();
    if node.children.contains_key(&name) {
        return Err(Error::new(ErrorKind::DuplicateName(name)));
    }
    node.children.insert(name, DirEntry::Concrete(child));
    Ok(())
}

/// Mounts a virtual node (a link's overlay) under `name`. Not subject to
/// the cycle check: virtual edges aren't part of the real-node graph the
/// invariant is stated over.
pub fn mount_virtual(
    parent: &NodeRef,
    name: String,
    child: super::virtual_node::VirtualNodeRef,
) -> Result<(), Error> {
    let mut node = parent.write().unwrap();
    if node.children.contains_key(&name) {
        return Err(Error::new(ErrorKind::DuplicateName(name)));
    }
    node.children.insert(name, DirEntry::Virtual(child));
    Ok(())
}

/// No-ops silently if `child` isn't mounted on `parent`.
pub fn unmount(parent: &NodeRef, child: &DirEntry) {
    let mut node = parent.write().unwrap();
    let name = node
        .children
        .iter()
        .find(|(_, v)| v.same_as(child))
        .map(|(k, _)| k.clone());
    if let Some(name) = name {
        node.children.remove(&name);
    }
}

fn concrete_is_reachable(start: &NodeRef, target: &NodeRef) -> bool {
    if Arc::ptr_eq(start, target) {
        return true;
    }
    let node = start.read().unwrap();
    node.children.values().any(|entry| match entry {
        DirEntry::Concrete(child) => concrete_is_reachable(child, target),
        DirEntry::Virtual(_) => false,
    })
}

/// The §4.3 traversal: walk `walker` down from `start`, firing catch-alls
/// along the way and every handler at the leaf. Children that wrap a link
/// (virtual entries) are transparently unwrapped to their real node before
/// each level's handlers are read, since the overlay handler — not the
/// virtual node's own handler set — is what traversal actually sees.
/// Returns the number of handler invocations.
pub fn dispatch(start: &NodeRef, walker: &mut PathWalker, request: &mut Request) -> usize {
    let mut count = 0;

    if walker.at_leaf() {
        for handler in start.read().unwrap().handlers_in_order() {
            handler.handle(request);
            count += 1;
        }
        return count;
    }

    let catch_alls = start.read().unwrap().catch_all_handlers();
    if !catch_alls.is_empty() {
        let remainder = walker.remainder();
        for handler in &catch_alls {
            handler.handle_catch_all(&remainder, request);
            count += 1;
        }
    }

    walker.move_down();
    let next_name = walker.current_node_name().to_string();
    let next = start.read().unwrap().get_child(&next_name);
    if let Some(next_entry) = next {
        count += dispatch(&next_entry.dispatch_target(), walker, request);
    }
    count
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::directory::handler::{Handler, RequestType};
    use crate::uri::Uri;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    struct CountingHandler {
        name: String,
        catch_all: bool,
        hits: StdArc<AtomicUsize>,
        catch_all_hits: StdArc<AtomicUsize>,
    }

    impl Handler for CountingHandler {
        fn name(&self) -> &str {
            &self.name
        }
        fn is_catch_all(&self) -> bool {
            self.catch_all
        }
        fn handle(&self, _request: &mut Request) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        fn handle_catch_all(&self, _path_remainder: &str, _request: &mut Request) {
            self.catch_all_hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request(path: &str) -> Request {
        Request::with_type(Uri::parse(path).unwrap(), RequestType::Publish, vec![Value::Null])
    }

    #[test]
    fn mount_rejects_duplicate_names() {
        let root = Node::new("");
        let a1 = Node::new("a");
        let a2 = Node::new("a");
        mount(&root, a1).unwrap();
        assert!(matches!(mount(&root, a2), Err(Error { kind: ErrorKind::DuplicateName(_) })));
    }

    #[test]
    fn mount_rejects_cycles() {
        let root = Node::new("root");
        let child = Node::new("child");
        mount(&root, child.clone()).unwrap();
        assert!(matches!(mount(&child, root), Err(Error { kind: ErrorKind::Cyclic })));
    }

    #[test]
    fn unmount_is_a_noop_when_absent() {
        let root = Node::new("root");
        let stray = Node::new("stray");
        unmount(&root, &DirEntry::Concrete(stray));
        assert_eq!(root.read().unwrap().num_children(), 0);
    }

    #[test]
    fn leaf_fires_every_handler_including_catch_all() {
        let root = Node::new("");
        let hits = StdArc::new(AtomicUsize::new(0));
        let catch_all_hits = StdArc::new(AtomicUsize::new(0));
        root.write()
            .unwrap()
            .add_handler(StdArc::new(CountingHandler {
                name: "h1".to_string(),
                catch_all: false,
                hits: hits.clone(),
                catch_all_hits: catch_all_hits.clone(),
            }))
            .unwrap();
        root.write()
            .unwrap()
            .add_handler(StdArc::new(CountingHandler {
                name: "h2".to_string(),
                catch_all: true,
                hits: hits.clone(),
                catch_all_hits: catch_all_hits.clone(),
            }))
            .unwrap();

        let mut walker = PathWalker::new("/");
        let mut req = request("/");
        let count = dispatch(&root, &mut walker, &mut req);
        assert_eq!(count, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(catch_all_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn catch_all_fires_along_covered_prefix_then_traversal_stops() {
        let root = Node::new("");
        let topics = Node::new("topics");
        let cat1 = Node::new("cat1");
        mount(&root, topics.clone()).unwrap();
        mount(&topics, cat1.clone()).unwrap();

        let hits = StdArc::new(AtomicUsize::new(0));
        let catch_all_hits = StdArc::new(AtomicUsize::new(0));
        cat1.write()
            .unwrap()
            .add_handler(StdArc::new(CountingHandler {
                name: "wild".to_string(),
                catch_all: true,
                hits: hits.clone(),
                catch_all_hits: catch_all_hits.clone(),
            }))
            .unwrap();

        let mut walker = PathWalker::new("/topics/cat1/topic3");
        let mut req = request("/topics/cat1/topic3");
        let count = dispatch(&root, &mut walker, &mut req);
        assert_eq!(count, 1);
        assert_eq!(catch_all_hits.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_leaf_with_no_catch_all_fires_nothing() {
        let root = Node::new("");
        let a = Node::new("a");
        mount(&root, a).unwrap();
        let mut walker = PathWalker::new("/a/b");
        let mut req = request("/a/b");
        assert_eq!(dispatch(&root, &mut walker, &mut req), 0);
    }
}
