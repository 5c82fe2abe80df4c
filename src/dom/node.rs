//! Document: arena-backed element/text tree
//!
//! Node ids index into the arena and are never reused, so a `NodeId` keeps
//! its identity for the lifetime of the document even after the node is
//! detached. Every structural or character-data edit is reported to the
//! registered observers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::observer::{MutationRecord, ObserverId, ObserverRegistry, PausedObserver};
use crate::error::DomError;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Mutable document tree with change notification
#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    root: NodeId,
    observers: ObserverRegistry,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Construction & queries
// =============================================================================

impl Document {
    /// New document with an empty `body` root
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            root: NodeId(0),
            observers: ObserverRegistry::default(),
        };
        doc.root = doc.create_element("body");
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
        })
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push(NodeData::Text(content.to_string()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot { data, parent: None, children: Vec::new() });
        id
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, DomError> {
        self.slots.get(id.index()).ok_or(DomError::UnknownNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Slot, DomError> {
        self.slots.get_mut(id.index()).ok_or(DomError::UnknownNode(id))
    }

    pub fn exists(&self, id: NodeId) -> bool {
        id.index() < self.slots.len()
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.slots.get(id.index()).map(|s| &s.data)
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Text(_)))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Element { .. }))
    }

    /// Character data of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Text(content)) => Some(content),
            _ => None,
        }
    }

    /// Lower-case tag name of an element
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { tag, .. }) => Some(tag),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { attrs, .. }) => attrs.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.index()).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots.get(id.index()).map_or(&[], |s| s.children.as_slice())
    }

    /// Proper ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors { doc: self, next: self.parent(id) }
    }

    /// True if `node` is `ancestor` or lies below it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Attached to the document root
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.exists(id) && self.contains(self.root, id)
    }

    /// Concatenated character data of the subtree, in tree order
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Text(content)) => out.push_str(content),
            Some(NodeData::Element { .. }) => {
                for &child in self.children(id) {
                    self.collect_text(child, out);
                }
            }
            None => {}
        }
    }

    /// Elements below `id` (inclusive) matching `pred`, in tree order
    pub fn find_all<F>(&self, id: NodeId, pred: F) -> Vec<NodeId>
    where
        F: Fn(&Document, NodeId) -> bool,
    {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if pred(self, node) {
                found.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        found
    }

    /// Markup-like rendering used in tests and debugging
    pub fn to_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Text(content)) => out.push_str(&escape(content)),
            Some(NodeData::Element { tag, attrs }) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push_str(&format!(" {}=\"{}\"", name, escape(value)));
                }
                out.push('>');
                for &child in self.children(id) {
                    self.write_markup(child, out);
                }
                out.push_str(&format!("</{}>", tag));
            }
            None => {}
        }
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

// =============================================================================
// Mutation
// =============================================================================

impl Document {
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        match &mut self.slot_mut(id)?.data {
            NodeData::Element { attrs, .. } => {
                attrs.insert(name.to_string(), value.to_string());
                Ok(())
            }
            NodeData::Text(_) => Err(DomError::NotElement(id)),
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<Option<String>, DomError> {
        match &mut self.slot_mut(id)?.data {
            NodeData::Element { attrs, .. } => Ok(attrs.remove(name)),
            NodeData::Text(_) => Err(DomError::NotElement(id)),
        }
    }

    /// Replace the character data of a text node
    pub fn set_text(&mut self, id: NodeId, content: &str) -> Result<(), DomError> {
        match &mut self.slot_mut(id)?.data {
            NodeData::Text(existing) => {
                if existing != content {
                    *existing = content.to_string();
                    self.notify(MutationRecord::text_changed(id));
                }
                Ok(())
            }
            NodeData::Element { .. } => Err(DomError::NotText(id)),
        }
    }

    /// Replace all children of an element with a single text node.
    ///
    /// The content is stored verbatim as character data; nothing is parsed.
    pub fn set_text_content(&mut self, id: NodeId, content: &str) -> Result<NodeId, DomError> {
        if !self.is_element(id) {
            return Err(match self.exists(id) {
                true => DomError::NotElement(id),
                false => DomError::UnknownNode(id),
            });
        }
        let old = std::mem::take(&mut self.slot_mut(id)?.children);
        for &child in &old {
            self.slot_mut(child)?.parent = None;
        }
        if !old.is_empty() {
            self.notify(MutationRecord::removed(id, old));
        }
        let text = self.create_text(content);
        self.append_child(id, text)?;
        Ok(text)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` under `parent` before `reference` (or at the end).
    ///
    /// A child that already has a parent is moved.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if !self.is_element(parent) {
            self.slot(parent)?;
            return Err(DomError::NotElement(parent));
        }
        self.slot(child)?;
        if self.contains(child, parent) {
            return Err(DomError::Cycle { parent, child });
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild { parent, child: reference });
            }
        }
        if let Some(old_parent) = self.parent(child) {
            self.remove_child(old_parent, child)?;
        }

        let position = match reference {
            Some(reference) => self
                .children(parent)
                .iter()
                .position(|&c| c == reference)
                .ok_or(DomError::NotAChild { parent, child: reference })?,
            None => self.children(parent).len(),
        };
        self.slot_mut(parent)?.children.insert(position, child);
        self.slot_mut(child)?.parent = Some(parent);
        self.notify(MutationRecord::added(parent, vec![child]));
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let position = self
            .slot(parent)?
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(DomError::NotAChild { parent, child })?;
        self.slot_mut(parent)?.children.remove(position);
        self.slot_mut(child)?.parent = None;
        self.notify(MutationRecord::removed(parent, vec![child]));
        Ok(())
    }

    /// Put `replacement` where `old` is; `old` ends up detached
    pub fn replace_child(&mut self, replacement: NodeId, old: NodeId) -> Result<(), DomError> {
        let parent = self.parent(old).ok_or(DomError::NoParent(old))?;
        self.insert_before(parent, replacement, Some(old))?;
        self.remove_child(parent, old)
    }

    /// Split a text node at byte `offset`.
    ///
    /// The node keeps `[0, offset)`; a new text node holding the rest is
    /// inserted right after it (when attached) and returned.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, DomError> {
        let content = self.text(id).ok_or(match self.exists(id) {
            true => DomError::NotText(id),
            false => DomError::UnknownNode(id),
        })?;
        if offset > content.len() {
            return Err(DomError::OffsetOutOfRange { offset, len: content.len() });
        }
        if !content.is_char_boundary(offset) {
            return Err(DomError::NotCharBoundary(offset));
        }
        let (head, tail) = content.split_at(offset);
        let (head, tail) = (head.to_string(), tail.to_string());

        let tail_node = self.create_text(&tail);
        self.set_text(id, &head)?;
        if let Some(parent) = self.parent(id) {
            let next = self.next_sibling(id);
            self.insert_before(parent, tail_node, next)?;
        }
        Ok(tail_node)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|&c| c == id)?;
        siblings.get(position + 1).copied()
    }

    // -------------------------------------------------------------------------
    // Builder helpers
    // -------------------------------------------------------------------------

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> Result<NodeId, DomError> {
        let node = self.create_element(tag);
        self.append_child(parent, node)?;
        Ok(node)
    }

    pub fn append_text(&mut self, parent: NodeId, content: &str) -> Result<NodeId, DomError> {
        let node = self.create_text(content);
        self.append_child(parent, node)?;
        Ok(node)
    }
}

// =============================================================================
// Observers
// =============================================================================

impl Document {
    /// Start observing child-list and character-data changes below `root`
    pub fn observe(&mut self, root: NodeId) -> ObserverId {
        self.observers.register(root)
    }

    pub fn disconnect(&mut self, observer: ObserverId) {
        self.observers.disconnect(observer);
    }

    /// Hand over every queued record for `observer`
    pub fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord> {
        self.observers.take(observer)
    }

    pub fn pending_records(&self, observer: ObserverId) -> usize {
        self.observers.pending_len(observer)
    }

    /// Enter a critical section in which `observer` records nothing
    pub fn pause(&mut self, observer: ObserverId) -> PausedObserver<'_> {
        PausedObserver::new(self, observer)
    }

    pub fn is_observer_paused(&self, observer: ObserverId) -> bool {
        self.observers.is_paused(observer)
    }

    pub(crate) fn observers_mut(&mut self) -> &mut ObserverRegistry {
        &mut self.observers
    }

    fn notify(&mut self, record: MutationRecord) {
        if !self.observers.is_listening() {
            return;
        }
        let interested: Vec<usize> = self
            .observers
            .listening_roots()
            .into_iter()
            .filter(|&(_, root)| self.contains(root, record.target))
            .map(|(idx, _)| idx)
            .collect();
        if !interested.is_empty() {
            self.observers.deliver(&interested, &record);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
