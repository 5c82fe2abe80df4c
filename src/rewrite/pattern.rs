//! PatternTable: compiled phrase registry
//!
//! Each registry definition is compiled once into an immutable `PatternEntry`:
//! a case-insensitive matcher, its replacement, and the key terms used to
//! reject text cheaply before the matcher runs.
//!
//! # Key terms
//! Key terms are literal ASCII runs that every match of the pattern must
//! contain. An entry is skipped when none of them occur in the text, so a
//! term is only extracted when it is provably required:
//! - only top-level literals count (group and class contents are ignored)
//! - a top-level `|` disables extraction entirely
//! - an atom made optional by `?`, `*` or `{0,..}` is dropped from its run

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::PatternError;

// =============================================================================
// Constants
// =============================================================================

/// Shorter literal runs are too common to reject anything
const MIN_KEY_TERM_LEN: usize = 3;

/// Longest runs are kept; any one required term is enough to reject
const MAX_KEY_TERMS: usize = 3;

// =============================================================================
// Types
// =============================================================================

/// Registry entry as supplied by the mapping collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternDefinition {
    pub id: String,
    pub pattern: String,
    pub replacement: String,
    /// Explicit key terms; extracted from `pattern` when absent
    #[serde(default)]
    pub key_terms: Option<Vec<String>>,
    /// Treat `pattern` as a plain phrase (escaped, word-bounded)
    #[serde(default)]
    pub literal: bool,
}

/// One compiled, immutable pattern
#[derive(Debug, Clone)]
pub struct PatternEntry {
    id: String,
    source: String,
    matcher: Regex,
    replacement: String,
    key_terms: Vec<String>,
    key_filter: Option<Regex>,
}

impl PatternEntry {
    pub fn compile(def: &PatternDefinition) -> Result<Self, PatternError> {
        if def.pattern.trim().is_empty() {
            return Err(PatternError::EmptyPattern { id: def.id.clone() });
        }

        let source = if def.literal {
            literal_source(&def.pattern)
        } else {
            def.pattern.clone()
        };

        let matcher = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|source| PatternError::InvalidRegex { id: def.id.clone(), source })?;

        let key_terms = match &def.key_terms {
            Some(terms) => terms
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            None => extract_key_terms(&source),
        };
        let key_filter = build_key_filter(&def.id, &key_terms)?;

        Ok(Self {
            id: def.id.clone(),
            source,
            matcher,
            replacement: def.replacement.clone(),
            key_terms,
            key_filter,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Regex source the matcher was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matcher(&self) -> &Regex {
        &self.matcher
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn key_terms(&self) -> &[String] {
        &self.key_terms
    }

    /// False only when the text provably cannot match
    pub fn may_match(&self, text: &str) -> bool {
        match &self.key_filter {
            Some(filter) => filter.is_match(text),
            None => true,
        }
    }
}

fn literal_source(phrase: &str) -> String {
    let phrase = phrase.trim();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut source = String::new();
    if phrase.chars().next().is_some_and(is_word) {
        source.push_str(r"\b");
    }
    source.push_str(&regex::escape(phrase));
    if phrase.chars().last().is_some_and(is_word) {
        source.push_str(r"\b");
    }
    source
}

/// Case-insensitive alternation of literal terms, folded like the matchers
pub(crate) fn build_key_filter(id: &str, terms: &[String]) -> Result<Option<Regex>, PatternError> {
    if terms.is_empty() {
        return Ok(None);
    }
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|source| PatternError::InvalidRegex { id: id.to_string(), source })
}

// =============================================================================
// Key term extraction
// =============================================================================

/// Literal runs every match of `pattern` must contain
pub fn extract_key_terms(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_class = false;
    let mut i = 0;

    let flush = |current: &mut String, runs: &mut Vec<String>| {
        if !current.is_empty() {
            runs.push(std::mem::take(current));
        }
    };

    while i < chars.len() {
        let c = chars[i];

        if in_class {
            match c {
                '\\' => i += 1,
                ']' => in_class = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                flush(&mut current, &mut runs);
                i += 2;
                continue;
            }
            '[' => {
                flush(&mut current, &mut runs);
                in_class = true;
            }
            '(' => {
                flush(&mut current, &mut runs);
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
            }
            '|' if depth == 0 => return Vec::new(),
            _ if depth > 0 => {}
            '?' | '*' => {
                current.pop();
                flush(&mut current, &mut runs);
            }
            '+' => flush(&mut current, &mut runs),
            '{' => {
                let quantifier: String = chars[i + 1..]
                    .iter()
                    .take_while(|&&q| q != '}')
                    .collect();
                if quantifier.trim_start().starts_with('0') || quantifier.starts_with(',') {
                    current.pop();
                }
                flush(&mut current, &mut runs);
                i += quantifier.chars().count() + 1;
            }
            c if c.is_ascii_alphanumeric() => {
                // A quantifier applies to this char only, so it may still be popped
                current.push(c);
            }
            _ => flush(&mut current, &mut runs),
        }
        i += 1;
    }
    flush(&mut current, &mut runs);

    let mut terms: Vec<String> = runs
        .into_iter()
        .filter(|r| r.len() >= MIN_KEY_TERM_LEN)
        .collect();
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    terms.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    terms.truncate(MAX_KEY_TERMS);
    terms
}

// =============================================================================
// PatternTable
// =============================================================================

/// Ordered, read-only mapping from stable id to compiled entry
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    entries: Vec<PatternEntry>,
    by_id: HashMap<String, usize>,
}

impl PatternTable {
    pub fn from_definitions(defs: &[PatternDefinition]) -> Result<Self, PatternError> {
        let mut table = Self::default();
        for def in defs {
            if table.by_id.contains_key(&def.id) {
                return Err(PatternError::DuplicateId(def.id.clone()));
            }
            let entry = PatternEntry::compile(def)?;
            table.by_id.insert(def.id.clone(), table.entries.len());
            table.entries.push(entry);
        }
        Ok(table)
    }

    /// Parse a JSON array of definitions
    pub fn from_json(json: &str) -> Result<Self, PatternError> {
        let defs: Vec<PatternDefinition> = serde_json::from_str(json)?;
        Self::from_definitions(&defs)
    }

    /// `(id, phrase, replacement)` triples matched as plain phrases
    pub fn from_literals(pairs: &[(&str, &str, &str)]) -> Result<Self, PatternError> {
        let defs: Vec<PatternDefinition> = pairs
            .iter()
            .map(|(id, phrase, replacement)| PatternDefinition {
                id: id.to_string(),
                pattern: phrase.to_string(),
                replacement: replacement.to_string(),
                key_terms: None,
                literal: true,
            })
            .collect();
        Self::from_definitions(&defs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PatternEntry> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternEntry> {
        self.entries.iter()
    }

    /// Every entry carries at least one key term
    pub fn fully_keyed(&self) -> bool {
        self.entries.iter().all(|e| !e.key_terms.is_empty())
    }

    /// Union of all key terms, first occurrence order, case-insensitively unique
    pub fn all_key_terms(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for term in self.entries.iter().flat_map(|e| e.key_terms.iter()) {
            if !seen.iter().any(|s| s.eq_ignore_ascii_case(term)) {
                seen.push(term.clone());
            }
        }
        seen
    }
}

// =============================================================================
// Tests
// =============================================================================
