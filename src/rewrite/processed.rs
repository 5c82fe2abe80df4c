//! ProcessedRegistry: content-addressed "already handled" records
//!
//! Text nodes cannot carry attributes, so the coordinator keeps their records
//! here, keyed by node identity. Each record stores a hash of the content the
//! node had when it was handled; a node whose content hash still matches is
//! skipped, an edited node is handled again. Element records live on the
//! element itself as an attribute.
//!
//! In replace mode the registry also remembers which byte ranges of a node's
//! text the engine wrote. Those records outlive `clear()`: like markers, they
//! describe engine output that is still in the tree, and the next pass must
//! not match inside it.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::rewrite::segment::Rewrite;

/// Attribute flagging an element (including markers) as handled
pub const PROCESSED_ATTR: &str = "data-phrase-processed";

/// Registry counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedStats {
    pub tracked: usize,
    pub checks: u64,
    pub skips: u64,
}

#[derive(Debug, Default)]
pub struct ProcessedRegistry {
    text_hashes: HashMap<NodeId, u64>,
    replacements: HashMap<NodeId, Rewrite>,
    checks: u64,
    skips: u64,
}

impl ProcessedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `node` was handled with exactly this content
    pub fn is_text_processed(&mut self, node: NodeId, content: &str) -> bool {
        self.checks += 1;
        let unchanged = self.text_hashes.get(&node) == Some(&compute_hash(content));
        if unchanged {
            self.skips += 1;
        }
        unchanged
    }

    pub fn mark_text(&mut self, node: NodeId, content: &str) {
        self.text_hashes.insert(node, compute_hash(content));
    }

    pub fn forget(&mut self, node: NodeId) {
        self.text_hashes.remove(&node);
        self.replacements.remove(&node);
    }

    /// Remember what the engine wrote into `node`; an empty span list drops the record
    pub fn record_replacement(&mut self, node: NodeId, rewrite: Rewrite) {
        if rewrite.spans.is_empty() {
            self.replacements.remove(&node);
        } else {
            self.replacements.insert(node, rewrite);
        }
    }

    /// Engine-written ranges of `node` that `content` still holds verbatim.
    ///
    /// Ranges before the first changed byte keep their offsets, ranges after
    /// the last one shift by the change in length, ranges the edit touched
    /// are dropped.
    pub fn surviving_spans(&self, node: NodeId, content: &str) -> Vec<Range<usize>> {
        let Some(previous) = self.replacements.get(&node) else {
            return Vec::new();
        };
        let old = previous.text.as_str();
        let prefix = common_prefix(old, content);
        let suffix = common_suffix(&old[prefix..], &content[prefix..]);
        let old_edit_end = old.len() - suffix;
        let new_edit_end = content.len() - suffix;

        previous
            .spans
            .iter()
            .filter_map(|span| {
                if span.end <= prefix {
                    Some(span.clone())
                } else if span.start >= old_edit_end {
                    let start = span.start - old_edit_end + new_edit_end;
                    Some(start..start + span.len())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Drop records of nodes that are no longer attached to the document
    pub fn prune(&mut self, doc: &Document) -> usize {
        let before = self.text_hashes.len();
        self.text_hashes.retain(|&node, _| doc.is_connected(node));
        self.replacements.retain(|&node, _| doc.is_connected(node));
        before - self.text_hashes.len()
    }

    /// Forget content records and counters; replacement records stay
    pub fn clear(&mut self) {
        self.text_hashes.clear();
        self.checks = 0;
        self.skips = 0;
    }

    pub fn len(&self) -> usize {
        self.text_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text_hashes.is_empty()
    }

    pub fn stats(&self) -> ProcessedStats {
        ProcessedStats {
            tracked: self.text_hashes.len(),
            checks: self.checks,
            skips: self.skips,
        }
    }
}

/// Element records are stored on the element
pub fn is_element_processed(doc: &Document, node: NodeId) -> bool {
    doc.attr(node, PROCESSED_ATTR).is_some()
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

fn compute_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Tests
// =============================================================================
