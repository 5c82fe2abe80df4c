//! Engine configuration.
//!
//! Every field has a serde default so partial JSON / JS objects are accepted.

use serde::{Deserialize, Serialize};

/// How matches are materialized in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// Wrap each match in a marker element carrying the original text
    #[default]
    Annotate,
    /// Overwrite the text node with the rewritten string, no markers
    Replace,
}

/// Configuration shared by the identifier, annotator and coordinator
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Texts shorter than this (in chars) are never scanned
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,
    /// Wall-clock budget for one slice of the walker
    #[serde(default = "default_slice_time_budget_ms")]
    pub slice_time_budget_ms: u64,
    /// Node budget for one slice of the walker
    #[serde(default = "default_slice_node_budget")]
    pub slice_node_budget: usize,
    /// Circuit breaker: text nodes submitted per session
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Share of the cache dropped when it fills up
    #[serde(default = "default_cache_evict_fraction")]
    pub cache_evict_fraction: f64,
    #[serde(default = "default_max_matches_per_entry")]
    pub max_matches_per_entry: usize,
    /// Overrides the derived pre-check trigger list
    #[serde(default)]
    pub trigger_words: Option<Vec<String>>,
    /// Tags skipped in addition to the built-in non-content list
    #[serde(default)]
    pub extra_skip_tags: Vec<String>,
    #[serde(default)]
    pub mode: RewriteMode,
    /// Upper bound on host turns for `RewriteCoordinator::drive`
    #[serde(default = "default_max_drive_turns")]
    pub max_drive_turns: usize,
}

fn default_min_text_len() -> usize { 2 }
fn default_slice_time_budget_ms() -> u64 { 8 }
fn default_slice_node_budget() -> usize { 200 }
fn default_max_operations() -> u64 { 50_000 }
fn default_cache_capacity() -> usize { 1_000 }
fn default_cache_evict_fraction() -> f64 { 0.25 }
fn default_max_matches_per_entry() -> usize { 1_000 }
fn default_max_drive_turns() -> usize { 10_000 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_text_len: default_min_text_len(),
            slice_time_budget_ms: default_slice_time_budget_ms(),
            slice_node_budget: default_slice_node_budget(),
            max_operations: default_max_operations(),
            cache_capacity: default_cache_capacity(),
            cache_evict_fraction: default_cache_evict_fraction(),
            max_matches_per_entry: default_max_matches_per_entry(),
            trigger_words: None,
            extra_skip_tags: Vec::new(),
            mode: RewriteMode::default(),
            max_drive_turns: default_max_drive_turns(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Clamp values that would stall the walker or disable the cache logic
    pub fn validated(mut self) -> Self {
        self.slice_node_budget = self.slice_node_budget.max(1);
        self.slice_time_budget_ms = self.slice_time_budget_ms.max(1);
        self.max_matches_per_entry = self.max_matches_per_entry.max(1);
        self.max_drive_turns = self.max_drive_turns.max(1);
        if !self.cache_evict_fraction.is_finite() {
            self.cache_evict_fraction = default_cache_evict_fraction();
        }
        self.cache_evict_fraction = self.cache_evict_fraction.clamp(0.01, 1.0);
        self.extra_skip_tags = self
            .extra_skip_tags
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }
}
