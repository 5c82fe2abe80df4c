//! RewriteCoordinator: walks the tree and keeps it rewritten as it changes
//!
//! # Design Principles
//! 1. State machine: Idle → Sweeping → Idle, Idle ⇄ HandlingMutation,
//!    Disabled from anywhere, left only through `enable()` / `reprocess()`
//! 2. Cooperative: work is queued and drained in slices bounded by time and
//!    node count, the host calls `run_slice` again on its next turn
//! 3. Every tree edit happens while the coordinator's own observer is paused,
//!    so the engine never sees its own markers as new content
//!
//! # Usage
//! ```rust,ignore
//! let mut coordinator = RewriteCoordinator::new(table, EngineConfig::default(), logger)?;
//! let root = doc.root();
//! coordinator.start(&mut doc, root);
//! while coordinator.run_slice(&mut doc) {}
//! // later, after the host edited the tree
//! coordinator.deliver(&mut doc);
//! coordinator.run_slice(&mut doc);
//! ```

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, RewriteMode};
use crate::dom::{Document, MutationKind, MutationRecord, NodeData, NodeId, ObserverId};
use crate::error::PatternError;
use crate::logging::Logger;
use crate::rewrite::annotator::{is_marker, TreeAnnotator};
use crate::rewrite::cache::{CacheStats, RewriteCache};
use crate::rewrite::pattern::PatternTable;
use crate::rewrite::processed::{is_element_processed, ProcessedRegistry, ProcessedStats};
use crate::rewrite::segment::{splice_protected, Rewrite, SegmentIdentifier};

/// Elements whose content is never prose
pub const NON_CONTENT_TAGS: [&str; 9] = [
    "script", "style", "noscript", "template", "svg", "canvas", "math", "iframe", "object",
];

const EDITABLE_TAGS: [&str; 3] = ["input", "textarea", "select"];

// =============================================================================
// State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// Nothing queued
    Idle,
    /// Draining the queue of an initial sweep or reprocess
    Sweeping,
    /// Draining work produced by change notifications
    HandlingMutation,
    /// Breaker tripped or `disable()` called
    Disabled,
}

impl CoordinatorState {
    pub fn name(self) -> &'static str {
        match self {
            CoordinatorState::Idle => "idle",
            CoordinatorState::Sweeping => "sweeping",
            CoordinatorState::HandlingMutation => "handling_mutation",
            CoordinatorState::Disabled => "disabled",
        }
    }
}

/// Per-instance run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub enabled: bool,
    /// Text nodes submitted since the last enable / reprocess
    pub operation_count: u64,
    /// True while a slice is running
    pub in_flight: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self { enabled: true, operation_count: 0, in_flight: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub nodes_visited: u64,
    pub text_nodes_submitted: u64,
    pub markers_created: u64,
    /// Text nodes overwritten in `Replace` mode
    pub replacements: u64,
    pub records_delivered: u64,
    pub records_filtered: u64,
    pub slices_run: u64,
}

/// Result of `drive`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveOutcome {
    pub turns: usize,
    pub quiescent: bool,
}

// =============================================================================
// Region rules
// =============================================================================

/// Form controls and `contenteditable` other than "false"
pub fn is_editable(doc: &Document, node: NodeId) -> bool {
    let Some(tag) = doc.tag(node) else {
        return false;
    };
    if EDITABLE_TAGS.contains(&tag) {
        return true;
    }
    doc.attr(node, "contenteditable")
        .is_some_and(|value| !value.trim().eq_ignore_ascii_case("false"))
}

// =============================================================================
// RewriteCoordinator
// =============================================================================

pub struct RewriteCoordinator {
    identifier: SegmentIdentifier,
    annotator: TreeAnnotator,
    cache: RewriteCache<Rewrite>,
    registry: ProcessedRegistry,
    config: EngineConfig,
    skip_tags: HashSet<String>,
    logger: Rc<dyn Logger>,
    state: CoordinatorState,
    run: RunState,
    queue: VecDeque<NodeId>,
    root: Option<NodeId>,
    observer: Option<ObserverId>,
    stats: CoordinatorStats,
}

impl RewriteCoordinator {
    pub fn new(
        table: Rc<PatternTable>,
        config: EngineConfig,
        logger: Rc<dyn Logger>,
    ) -> Result<Self, PatternError> {
        let config = config.validated();
        let identifier = SegmentIdentifier::new(table, &config, logger.clone())?;
        let skip_tags = NON_CONTENT_TAGS
            .iter()
            .map(|t| t.to_string())
            .chain(config.extra_skip_tags.iter().cloned())
            .collect();

        Ok(Self {
            identifier,
            annotator: TreeAnnotator::new(logger.clone()),
            cache: RewriteCache::new(config.cache_capacity, config.cache_evict_fraction),
            registry: ProcessedRegistry::new(),
            config,
            skip_tags,
            logger,
            state: CoordinatorState::Idle,
            run: RunState::default(),
            queue: VecDeque::new(),
            root: None,
            observer: None,
            stats: CoordinatorStats::default(),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats.clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn processed_stats(&self) -> ProcessedStats {
        self.registry.stats()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn observer(&self) -> Option<ObserverId> {
        self.observer
    }

    pub fn identifier(&self) -> &SegmentIdentifier {
        &self.identifier
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Subscribe to `root` and queue an initial sweep of it
    pub fn start(&mut self, doc: &mut Document, root: NodeId) {
        if self.state == CoordinatorState::Disabled {
            self.logger.debug("[Coordinator] disabled, ignoring start");
            return;
        }
        if !doc.exists(root) {
            self.logger.warn(&format!("[Coordinator] cannot start on unknown node {:?}", root));
            return;
        }
        if self.in_excluded_region(doc, root) {
            self.logger.debug(&format!("[Coordinator] {:?} is inside an excluded region", root));
            return;
        }

        if self.root != Some(root) {
            if let Some(old) = self.observer.take() {
                doc.disconnect(old);
            }
            self.observer = Some(doc.observe(root));
            self.root = Some(root);
        }

        self.queue.clear();
        self.queue.push_back(root);
        self.state = CoordinatorState::Sweeping;
        self.logger.debug(&format!("[Coordinator] sweep queued from {:?}", root));
    }

    /// Forget every processed record, reset the run state and sweep again.
    ///
    /// Existing markers are still skipped, and so is text written in replace mode.
    pub fn reprocess(&mut self, doc: &mut Document, root: NodeId) {
        self.registry.clear();
        self.cache.clear();
        self.run = RunState::default();
        self.state = CoordinatorState::Idle;
        self.logger.info("[Coordinator] reprocessing");
        self.start(doc, root);
    }

    /// Leave `Disabled` and reset the operation count
    pub fn enable(&mut self) {
        self.run.enabled = true;
        self.run.operation_count = 0;
        if self.state == CoordinatorState::Disabled {
            self.state = CoordinatorState::Idle;
            self.logger.info("[Coordinator] enabled");
        }
    }

    pub fn disable(&mut self) {
        if self.state != CoordinatorState::Disabled {
            self.logger.info("[Coordinator] disabled");
        }
        self.enter_disabled();
    }

    /// Unsubscribe and drop queued work
    pub fn stop(&mut self, doc: &mut Document) {
        if let Some(observer) = self.observer.take() {
            doc.disconnect(observer);
        }
        self.root = None;
        self.queue.clear();
        if self.state != CoordinatorState::Disabled {
            self.state = CoordinatorState::Idle;
        }
    }

    fn enter_disabled(&mut self) {
        self.state = CoordinatorState::Disabled;
        self.run.enabled = false;
        self.queue.clear();
    }

    // -------------------------------------------------------------------------
    // Slices
    // -------------------------------------------------------------------------

    /// Drain queued nodes until a budget runs out. Returns true if work remains.
    pub fn run_slice(&mut self, doc: &mut Document) -> bool {
        if self.state == CoordinatorState::Disabled {
            return false;
        }
        if self.queue.is_empty() {
            self.settle(doc);
            return false;
        }

        self.stats.slices_run += 1;
        self.run.in_flight = true;
        match self.observer {
            Some(observer) => {
                let mut paused = doc.pause(observer);
                self.drain(&mut paused);
            }
            None => self.drain(doc),
        }
        self.run.in_flight = false;

        if self.state == CoordinatorState::Disabled {
            return false;
        }
        if self.queue.is_empty() {
            self.settle(doc);
            return false;
        }
        true
    }

    fn drain(&mut self, doc: &mut Document) {
        let started = instant::Instant::now();
        let time_budget = Duration::from_millis(self.config.slice_time_budget_ms);
        let mut visited = 0usize;

        while let Some(node) = self.queue.pop_front() {
            self.visit(doc, node);
            if self.state == CoordinatorState::Disabled {
                break;
            }
            visited += 1;
            if visited >= self.config.slice_node_budget || started.elapsed() >= time_budget {
                break;
            }
        }
    }

    /// Queue ran dry: back to Idle
    fn settle(&mut self, doc: &Document) {
        if matches!(self.state, CoordinatorState::Sweeping | CoordinatorState::HandlingMutation) {
            let pruned = self.registry.prune(doc);
            self.logger.debug(&format!(
                "[Coordinator] {} done: {} nodes visited, {} markers, {} stale records pruned",
                self.state.name(),
                self.stats.nodes_visited,
                self.stats.markers_created,
                pruned
            ));
            self.state = CoordinatorState::Idle;
        }
    }

    fn visit(&mut self, doc: &mut Document, node: NodeId) {
        // Removed since it was queued
        if !self.root.map_or(true, |root| doc.contains(root, node)) {
            return;
        }
        self.stats.nodes_visited += 1;

        let children = match doc.data(node) {
            Some(NodeData::Text(_)) => {
                self.submit_text(doc, node);
                return;
            }
            Some(NodeData::Element { .. }) if self.is_excluded_element(doc, node) => return,
            Some(NodeData::Element { .. }) => doc.children(node).to_vec(),
            None => return,
        };
        self.queue.extend(children);
    }

    /// Run one text node through identify + annotate (or replace)
    fn submit_text(&mut self, doc: &mut Document, node: NodeId) {
        let Some(content) = doc.text(node).map(str::to_string) else {
            return;
        };
        if content.trim().is_empty() || self.registry.is_text_processed(node, &content) {
            return;
        }
        if !self.charge_operation() {
            return;
        }
        self.stats.text_nodes_submitted += 1;

        match self.config.mode {
            RewriteMode::Annotate => self.annotate_text(doc, node, &content),
            RewriteMode::Replace => self.replace_text(doc, node, &content),
        }
    }

    fn annotate_text(&mut self, doc: &mut Document, node: NodeId, content: &str) {
        let segments = self.identifier.identify(content);
        if segments.is_empty() {
            self.registry.mark_text(node, content);
            return;
        }

        let report = self.annotator.annotate_with_report(doc, node, &segments);
        self.stats.markers_created += report.markers.len() as u64;
        if !report.modified {
            self.registry.mark_text(node, content);
        }
        for &fragment in &report.fragments {
            if let Some(text) = doc.text(fragment) {
                self.registry.mark_text(fragment, text);
            }
        }
    }

    fn replace_text(&mut self, doc: &mut Document, node: NodeId, content: &str) {
        // Text the engine wrote earlier is never matched again
        let protected = self.registry.surviving_spans(node, content);
        let rewrite = if protected.is_empty() {
            let identifier = &self.identifier;
            self.cache.get_or_insert_with(content, |text| identifier.rewrite_with_spans(text))
        } else {
            splice_protected(content, &self.identifier.identify(content), &protected)
        };

        if rewrite.text != content {
            if let Err(err) = doc.set_text(node, &rewrite.text) {
                self.logger.error(&format!("[Coordinator] replace failed on {:?}: {}", node, err));
                return;
            }
            self.stats.replacements += 1;
        }
        self.registry.mark_text(node, &rewrite.text);
        self.registry.record_replacement(node, rewrite);
    }

    /// Count one operation; trips the breaker past `max_operations`
    fn charge_operation(&mut self) -> bool {
        self.run.operation_count += 1;
        if self.run.operation_count <= self.config.max_operations {
            return true;
        }
        self.logger.warn(&format!(
            "[Coordinator] circuit breaker tripped after {} operations, disabling",
            self.config.max_operations
        ));
        self.enter_disabled();
        false
    }

    // -------------------------------------------------------------------------
    // Change notifications
    // -------------------------------------------------------------------------

    /// Pull queued change records and enqueue whatever they touched.
    ///
    /// Returns the number of records that produced work.
    pub fn deliver(&mut self, doc: &mut Document) -> usize {
        let Some(observer) = self.observer else {
            return 0;
        };
        let records = doc.take_records(observer);
        if records.is_empty() {
            return 0;
        }
        self.stats.records_delivered += records.len() as u64;
        if self.state == CoordinatorState::Disabled {
            return 0;
        }

        let previous = self.state;
        self.state = CoordinatorState::HandlingMutation;
        let mut accepted = 0;
        for record in &records {
            if self.handle_record(doc, record) {
                accepted += 1;
            }
        }

        self.state = match previous {
            CoordinatorState::Sweeping => CoordinatorState::Sweeping,
            _ if self.queue.is_empty() => CoordinatorState::Idle,
            _ => CoordinatorState::HandlingMutation,
        };
        accepted
    }

    fn handle_record(&mut self, doc: &Document, record: &MutationRecord) -> bool {
        match record.kind {
            MutationKind::Added => {
                let before = self.queue.len();
                for &node in &record.added_nodes {
                    if self.accepts(doc, node) {
                        self.queue.push_back(node);
                    }
                }
                self.queue.len() > before
            }
            MutationKind::TextChanged => {
                let accepted = self.accepts(doc, record.target);
                if accepted {
                    self.queue.push_back(record.target);
                }
                accepted
            }
            MutationKind::Removed => {
                for &node in &record.removed_nodes {
                    self.registry.forget(node);
                }
                false
            }
        }
    }

    /// Filter for nodes named by a change record
    fn accepts(&mut self, doc: &Document, node: NodeId) -> bool {
        let in_scope = self.root.is_some_and(|root| doc.contains(root, node));
        let already_done = match doc.data(node) {
            Some(NodeData::Text(content)) => self.registry.is_text_processed(node, content),
            Some(NodeData::Element { .. }) => is_element_processed(doc, node),
            None => true,
        };
        let accepted = in_scope && !already_done && !self.in_excluded_region(doc, node);
        if !accepted {
            self.stats.records_filtered += 1;
        }
        accepted
    }

    // -------------------------------------------------------------------------
    // Region rules
    // -------------------------------------------------------------------------

    fn is_excluded_element(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node).is_some_and(|tag| self.skip_tags.contains(tag))
            || is_editable(doc, node)
            || is_marker(doc, node)
            || is_element_processed(doc, node)
    }

    /// True if `node` or any ancestor is skipped, editable or a marker
    pub fn in_excluded_region(&self, doc: &Document, node: NodeId) -> bool {
        std::iter::once(node)
            .chain(doc.ancestors(node))
            .any(|n| doc.is_element(n) && self.is_excluded_element(doc, n))
    }

    // -------------------------------------------------------------------------
    // Host loop
    // -------------------------------------------------------------------------

    /// Alternate deliveries and slices until nothing is left or the turn cap hits
    pub fn drive(&mut self, doc: &mut Document) -> DriveOutcome {
        let max_turns = self.config.max_drive_turns;
        for turn in 1..=max_turns {
            self.deliver(doc);
            let more = self.run_slice(doc);
            let pending = self.observer.map_or(0, |o| doc.pending_records(o));
            if !more && pending == 0 {
                return DriveOutcome { turns: turn, quiescent: true };
            }
        }
        self.logger.warn(&format!(
            "[Coordinator] drive stopped after {} turns with work pending",
            max_turns
        ));
        DriveOutcome { turns: max_turns, quiescent: false }
    }
}

// =============================================================================
// Tests
// =============================================================================
