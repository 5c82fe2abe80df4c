//! Change notification for the document tree.
//!
//! Mirrors the browser's MutationObserver: observers watch a subtree, records
//! are queued synchronously when the tree changes and handed over in batches
//! by `take_records`. A paused observer queues nothing.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use super::node::{Document, NodeId};

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Children were inserted under `target`
    Added,
    /// Children were removed from `target`
    Removed,
    /// Character data of the text node `target` changed
    TextChanged,
}

/// One change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
}

impl MutationRecord {
    pub fn added(target: NodeId, nodes: Vec<NodeId>) -> Self {
        Self { kind: MutationKind::Added, target, added_nodes: nodes, removed_nodes: Vec::new() }
    }

    pub fn removed(target: NodeId, nodes: Vec<NodeId>) -> Self {
        Self { kind: MutationKind::Removed, target, added_nodes: Vec::new(), removed_nodes: nodes }
    }

    pub fn text_changed(target: NodeId) -> Self {
        Self {
            kind: MutationKind::TextChanged,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
        }
    }
}

// =============================================================================
// Observer registry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(u32);

#[derive(Debug)]
struct Observation {
    root: NodeId,
    connected: bool,
    paused: bool,
    pending: Vec<MutationRecord>,
}

/// Observers registered on one document
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    observations: Vec<Observation>,
}

impl ObserverRegistry {
    pub(crate) fn register(&mut self, root: NodeId) -> ObserverId {
        let id = ObserverId(self.observations.len() as u32);
        self.observations.push(Observation {
            root,
            connected: true,
            paused: false,
            pending: Vec::new(),
        });
        id
    }

    pub(crate) fn disconnect(&mut self, id: ObserverId) {
        if let Some(obs) = self.observations.get_mut(id.0 as usize) {
            obs.connected = false;
            obs.pending.clear();
        }
    }

    pub(crate) fn take(&mut self, id: ObserverId) -> Vec<MutationRecord> {
        self.observations
            .get_mut(id.0 as usize)
            .map(|obs| std::mem::take(&mut obs.pending))
            .unwrap_or_default()
    }

    pub(crate) fn pending_len(&self, id: ObserverId) -> usize {
        self.observations.get(id.0 as usize).map_or(0, |obs| obs.pending.len())
    }

    /// Returns the previous paused flag
    pub(crate) fn set_paused(&mut self, id: ObserverId, paused: bool) -> bool {
        match self.observations.get_mut(id.0 as usize) {
            Some(obs) => std::mem::replace(&mut obs.paused, paused),
            None => false,
        }
    }

    pub(crate) fn is_paused(&self, id: ObserverId) -> bool {
        self.observations.get(id.0 as usize).is_some_and(|obs| obs.paused)
    }

    pub(crate) fn is_listening(&self) -> bool {
        self.observations.iter().any(|obs| obs.connected && !obs.paused)
    }

    /// Roots of every observer that would currently accept a record
    pub(crate) fn listening_roots(&self) -> Vec<(usize, NodeId)> {
        self.observations
            .iter()
            .enumerate()
            .filter(|(_, obs)| obs.connected && !obs.paused)
            .map(|(idx, obs)| (idx, obs.root))
            .collect()
    }

    pub(crate) fn deliver(&mut self, indices: &[usize], record: &MutationRecord) {
        for &idx in indices {
            if let Some(obs) = self.observations.get_mut(idx) {
                obs.pending.push(record.clone());
            }
        }
    }
}

// =============================================================================
// Paused-observer critical section
// =============================================================================

/// Exclusive access to the document with one observer paused.
///
/// Every edit made through the guard is invisible to that observer. The
/// observer's previous state is restored when the guard drops.
pub struct PausedObserver<'a> {
    doc: &'a mut Document,
    id: ObserverId,
    was_paused: bool,
}

impl<'a> PausedObserver<'a> {
    pub(crate) fn new(doc: &'a mut Document, id: ObserverId) -> Self {
        let was_paused = doc.observers_mut().set_paused(id, true);
        Self { doc, id, was_paused }
    }

    pub fn observer(&self) -> ObserverId {
        self.id
    }
}

impl Deref for PausedObserver<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        self.doc
    }
}

impl DerefMut for PausedObserver<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        self.doc
    }
}

impl Drop for PausedObserver<'_> {
    fn drop(&mut self) {
        self.doc.observers_mut().set_paused(self.id, self.was_paused);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_queue_for_observed_subtree() {
        let mut doc = Document::new();
        let root = doc.root();
        let observer = doc.observe(root);

        let p = doc.append_element(root, "p").unwrap();
        let text = doc.append_text(p, "hello").unwrap();
        doc.set_text(text, "hello world").unwrap();

        let records = doc.take_records(observer);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], MutationRecord::added(root, vec![p]));
        assert_eq!(records[1], MutationRecord::added(p, vec![text]));
        assert_eq!(records[2], MutationRecord::text_changed(text));
        assert!(doc.take_records(observer).is_empty());
    }

    #[test]
    fn test_records_outside_subtree_are_ignored() {
        let mut doc = Document::new();
        let root = doc.root();
        let left = doc.append_element(root, "div").unwrap();
        let right = doc.append_element(root, "div").unwrap();
        let observer = doc.observe(left);

        doc.append_text(right, "elsewhere").unwrap();
        assert_eq!(doc.pending_records(observer), 0);

        doc.append_text(left, "inside").unwrap();
        assert_eq!(doc.pending_records(observer), 1);
    }

    #[test]
    fn test_paused_observer_sees_nothing_and_resumes() {
        let mut doc = Document::new();
        let root = doc.root();
        let observer = doc.observe(root);

        {
            let mut section = doc.pause(observer);
            assert!(section.is_observer_paused(observer));
            section.append_text(root, "silent").unwrap();
        }

        assert!(!doc.is_observer_paused(observer));
        assert!(doc.take_records(observer).is_empty());

        doc.append_text(root, "loud").unwrap();
        assert_eq!(doc.take_records(observer).len(), 1);
    }

    #[test]
    fn test_nested_pause_restores_outer_state() {
        let mut doc = Document::new();
        let root = doc.root();
        let observer = doc.observe(root);

        let mut outer = doc.pause(observer);
        {
            let inner = outer.pause(observer);
            drop(inner);
        }
        assert!(outer.is_observer_paused(observer));
        drop(outer);
        assert!(!doc.is_observer_paused(observer));
    }

    #[test]
    fn test_disconnect_drops_pending() {
        let mut doc = Document::new();
        let root = doc.root();
        let observer = doc.observe(root);

        doc.append_text(root, "x").unwrap();
        doc.disconnect(observer);
        doc.append_text(root, "y").unwrap();

        assert!(doc.take_records(observer).is_empty());
    }
}
