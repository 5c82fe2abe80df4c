//! SegmentIdentifier: finds the substrings of one text that get rewritten
//!
//! Pure with respect to the text and the tree. The pipeline per call:
//! 1. length / whitespace bailout
//! 2. trigger pre-check (aho-corasick over ASCII text, a case-folding regex
//!    otherwise)
//! 3. per-entry key-term rejection, then a fresh matcher scan
//! 4. merge, sort, earliest-start-wins overlap resolution
//!
//! Offsets are byte offsets into the UTF-8 text and always fall on char
//! boundaries.

use std::ops::Range;
use std::rc::Rc;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::PatternError;
use crate::logging::{protect, ConsoleLogger, Logger};
use crate::rewrite::pattern::{build_key_filter, PatternEntry, PatternTable};

// =============================================================================
// Types
// =============================================================================

/// One match, located in the text it was found in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub original_text: String,
    pub replacement_text: String,
    pub start: usize,
    pub end: usize,
    /// Id of the pattern entry that produced the match
    pub pattern_id: String,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Rewritten text plus the byte ranges of it the engine wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub text: String,
    pub spans: Vec<Range<usize>>,
}

/// Raw match before overlap resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub start: usize,
    pub end: usize,
    /// Position of the entry in the table
    pub entry: usize,
}

// =============================================================================
// Trigger pre-check
// =============================================================================

/// Word list that must occur before any matcher runs.
///
/// The matchers fold case over Unicode, so the automaton only answers for
/// ASCII text against an all-ASCII list; everything else goes through a regex
/// built with the same folding.
struct Trigger {
    ascii: Option<AhoCorasick>,
    folded: Regex,
}

impl Trigger {
    fn build(words: &[String]) -> Result<Option<Self>, PatternError> {
        let Some(folded) = build_key_filter("<trigger>", words)? else {
            return Ok(None);
        };
        let ascii = if words.iter().all(|w| w.is_ascii()) {
            Some(AhoCorasickBuilder::new().ascii_case_insensitive(true).build(words)?)
        } else {
            None
        };
        Ok(Some(Self { ascii, folded }))
    }

    fn is_match(&self, text: &str) -> bool {
        match &self.ascii {
            Some(automaton) if text.is_ascii() => automaton.is_match(text),
            _ => self.folded.is_match(text),
        }
    }
}

// =============================================================================
// SegmentIdentifier
// =============================================================================

pub struct SegmentIdentifier {
    table: Rc<PatternTable>,
    trigger: Option<Trigger>,
    min_text_len: usize,
    max_matches_per_entry: usize,
    logger: Rc<dyn Logger>,
}

impl SegmentIdentifier {
    pub fn new(
        table: Rc<PatternTable>,
        config: &EngineConfig,
        logger: Rc<dyn Logger>,
    ) -> Result<Self, PatternError> {
        let words = match &config.trigger_words {
            Some(words) => Some(words.clone()),
            // A derived list is only sound if every entry can be keyed
            None if table.fully_keyed() => Some(table.all_key_terms()),
            None => None,
        };
        let trigger = match words {
            Some(words) => Trigger::build(&words)?,
            None => None,
        };

        Ok(Self {
            table,
            trigger,
            min_text_len: config.min_text_len,
            max_matches_per_entry: config.max_matches_per_entry.max(1),
            logger,
        })
    }

    /// Default config, console logging
    pub fn with_defaults(table: Rc<PatternTable>) -> Result<Self, PatternError> {
        Self::new(table, &EngineConfig::default(), Rc::new(ConsoleLogger))
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    pub fn has_trigger(&self) -> bool {
        self.trigger.is_some()
    }

    /// True if the text is worth running any matcher on
    pub fn passes_precheck(&self, text: &str) -> bool {
        if self.min_text_len > 0 && text.chars().nth(self.min_text_len - 1).is_none() {
            return false;
        }
        if text.trim().is_empty() {
            return false;
        }
        match &self.trigger {
            Some(trigger) => trigger.is_match(text),
            None => true,
        }
    }

    /// Non-overlapping segments sorted by start
    pub fn identify(&self, text: &str) -> Vec<Segment> {
        if self.table.is_empty() || !self.passes_precheck(text) {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (index, entry) in self.table.iter().enumerate() {
            if !entry.may_match(text) {
                continue;
            }
            let found = protect(self.logger.as_ref(), entry.id(), Vec::new(), || {
                scan_entry(entry, index, text, self.max_matches_per_entry)
            });
            if found.len() >= self.max_matches_per_entry {
                self.logger.warn(&format!(
                    "[SegmentIdentifier] pattern '{}' hit the match cap ({})",
                    entry.id(),
                    self.max_matches_per_entry
                ));
            }
            candidates.extend(found);
        }

        build_segments(text, &self.table, resolve_overlaps(candidates))
    }

    /// Text with every identified segment replaced, in one pass
    pub fn rewrite(&self, text: &str) -> String {
        splice(text, &self.identify(text))
    }

    pub fn rewrite_with_spans(&self, text: &str) -> Rewrite {
        splice_with_spans(text, &self.identify(text))
    }
}

/// Identify with default settings and no trigger pre-check
pub fn identify_segments(text: &str, table: &PatternTable) -> Vec<Segment> {
    let config = EngineConfig::default();
    if text.chars().nth(config.min_text_len.saturating_sub(1)).is_none() || text.trim().is_empty() {
        return Vec::new();
    }
    let logger = ConsoleLogger;
    let candidates: Vec<Candidate> = table
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.may_match(text))
        .flat_map(|(index, entry)| {
            protect(&logger, entry.id(), Vec::new(), || {
                scan_entry(entry, index, text, config.max_matches_per_entry)
            })
        })
        .collect();
    build_segments(text, table, resolve_overlaps(candidates))
}

// =============================================================================
// Core Functions
// =============================================================================

/// Every non-empty match of one entry, with a fresh cursor
fn scan_entry(entry: &PatternEntry, index: usize, text: &str, cap: usize) -> Vec<Candidate> {
    let mut found = Vec::new();
    let mut pos = 0;

    while pos <= text.len() && found.len() < cap {
        let Some(m) = entry.matcher().find_at(text, pos) else {
            break;
        };
        if m.start() == m.end() {
            // Zero-width match: step one char forward so the scan terminates
            pos = next_boundary(text, m.end());
            continue;
        }
        found.push(Candidate { start: m.start(), end: m.end(), entry: index });
        pos = m.end();
    }
    found
}

fn next_boundary(text: &str, pos: usize) -> usize {
    match text[pos..].chars().next() {
        Some(c) => pos + c.len_utf8(),
        None => text.len() + 1,
    }
}

/// Sort by (start, longest, table order) and keep the earliest start
pub fn resolve_overlaps(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
            .then_with(|| a.entry.cmp(&b.entry))
    });

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.last().map_or(true, |last| candidate.start >= last.end) {
            kept.push(candidate);
        }
    }
    kept
}

fn build_segments(text: &str, table: &PatternTable, kept: Vec<Candidate>) -> Vec<Segment> {
    kept.into_iter()
        .map(|c| {
            let entry = &table.entries()[c.entry];
            Segment {
                original_text: text[c.start..c.end].to_string(),
                replacement_text: entry.replacement().to_string(),
                start: c.start,
                end: c.end,
                pattern_id: entry.id().to_string(),
            }
        })
        .collect()
}

/// Replace each segment's range with its replacement
pub fn splice(text: &str, segments: &[Segment]) -> String {
    splice_with_spans(text, segments).text
}

pub fn splice_with_spans(text: &str, segments: &[Segment]) -> Rewrite {
    let mut out = String::with_capacity(text.len());
    let mut spans = Vec::with_capacity(segments.len());
    let mut cursor = 0;
    for seg in segments {
        if seg.start < cursor || seg.end > text.len() {
            continue;
        }
        out.push_str(&text[cursor..seg.start]);
        let start = out.len();
        out.push_str(&seg.replacement_text);
        spans.push(start..out.len());
        cursor = seg.end;
    }
    out.push_str(&text[cursor..]);
    Rewrite { text: out, spans }
}

/// Splice `segments`, dropping any that touch a `protected` range.
///
/// The returned spans cover the fresh replacements and the protected ranges,
/// both in output offsets.
pub fn splice_protected(text: &str, segments: &[Segment], protected: &[Range<usize>]) -> Rewrite {
    let kept: Vec<Segment> = segments
        .iter()
        .filter(|seg| !protected.iter().any(|p| seg.start < p.end && p.start < seg.end))
        .cloned()
        .collect();
    let mut rewrite = splice_with_spans(text, &kept);

    for range in protected {
        let before = kept.iter().filter(|seg| seg.end <= range.start);
        let (added, removed) = before.fold((0, 0), |(added, removed), seg| {
            (added + seg.replacement_text.len(), removed + seg.len())
        });
        let start = range.start + added - removed;
        rewrite.spans.push(start..start + range.len());
    }
    rewrite.spans.sort_by_key(|span| span.start);
    rewrite
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, MemoryLogger};
    use crate::rewrite::pattern::PatternDefinition;

    fn literal_table() -> Rc<PatternTable> {
        Rc::new(
            PatternTable::from_literals(&[
                ("hc", "Hillary Clinton", "Crooked Hillary"),
                ("cnn", "CNN", "Fake News CNN"),
            ])
            .unwrap(),
        )
    }

    fn regex_table(defs: &[(&str, &str, &str)]) -> Rc<PatternTable> {
        let defs: Vec<PatternDefinition> = defs
            .iter()
            .map(|(id, pattern, replacement)| PatternDefinition {
                id: id.to_string(),
                pattern: pattern.to_string(),
                replacement: replacement.to_string(),
                key_terms: None,
                literal: false,
            })
            .collect();
        Rc::new(PatternTable::from_definitions(&defs).unwrap())
    }

    fn identifier(table: Rc<PatternTable>) -> SegmentIdentifier {
        SegmentIdentifier::new(table, &EngineConfig::default(), Rc::new(MemoryLogger::new())).unwrap()
    }

    // -------------------------------------------------------------------------
    // Requirement 1: Scenario from the headline example
    // -------------------------------------------------------------------------
    #[test]
    fn test_two_phrases_found_in_order() {
        let id = identifier(literal_table());
        let segments = id.identify("Hillary Clinton spoke to CNN");

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].original_text, "Hillary Clinton");
        assert_eq!(segments[0].replacement_text, "Crooked Hillary");
        assert_eq!((segments[0].start, segments[0].end), (0, 15));
        assert_eq!(segments[1].original_text, "CNN");
        assert_eq!((segments[1].start, segments[1].end), (25, 28));
        assert_eq!(segments[1].pattern_id, "cnn");
    }

    // -------------------------------------------------------------------------
    // Requirement 2: Bailouts
    // -------------------------------------------------------------------------
    #[test]
    fn test_short_and_blank_text_yield_nothing() {
        let id = identifier(literal_table());
        assert!(id.identify("").is_empty());
        assert!(id.identify("C").is_empty());
        assert!(id.identify("   \n\t  ").is_empty());
    }

    #[test]
    fn test_precheck_rejects_text_without_triggers() {
        let id = identifier(literal_table());
        assert!(id.has_trigger());
        assert!(!id.passes_precheck("nothing relevant here"));
        assert!(id.passes_precheck("breaking news on cnn"));
    }

    #[test]
    fn test_precheck_disabled_when_an_entry_has_no_key_terms() {
        let id = identifier(regex_table(&[("a", "x|y", "z"), ("b", "CNN", "Fake")]));
        assert!(!id.has_trigger());
        assert_eq!(id.identify("x marks").len(), 1);
    }

    #[test]
    fn test_explicit_trigger_list_replaces_derived_one() {
        let config = EngineConfig {
            trigger_words: Some(vec!["breaking".to_string()]),
            ..Default::default()
        };
        let id = SegmentIdentifier::new(literal_table(), &config, Rc::new(MemoryLogger::new())).unwrap();

        assert!(id.identify("CNN reports").is_empty());
        assert_eq!(id.identify("Breaking: CNN reports").len(), 1);
    }

    #[test]
    fn test_precheck_folds_case_like_the_matchers() {
        let defs = vec![PatternDefinition {
            id: "muller".to_string(),
            pattern: r"\bM(ü|ue)ller\b".to_string(),
            replacement: "the minister".to_string(),
            key_terms: Some(vec!["Müller".to_string()]),
            literal: false,
        }];
        let id = identifier(Rc::new(PatternTable::from_definitions(&defs).unwrap()));

        assert!(id.has_trigger());
        let segments = id.identify("MÜLLER spoke");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].original_text, "MÜLLER");
    }

    #[test]
    fn test_precheck_sees_non_ascii_forms_of_ascii_terms() {
        let table = Rc::new(PatternTable::from_literals(&[("kiss", "kiss", "hug")]).unwrap());
        let id = identifier(table.clone());
        // U+212A KELVIN SIGN folds to 'k'
        let text = "\u{212A}iss me";

        assert_eq!(id.identify(text), identify_segments(text, &table));
        assert_eq!(id.identify(text).len(), 1);
        assert_eq!(id.identify("KISS me").len(), 1);
    }

    // -------------------------------------------------------------------------
    // Requirement 3: Case-insensitive, word-bounded, original case kept
    // -------------------------------------------------------------------------
    #[test]
    fn test_case_insensitive_preserves_original_case() {
        let id = identifier(literal_table());
        let segments = id.identify("hillary clinton and cnn");

        assert_eq!(segments[0].original_text, "hillary clinton");
        assert_eq!(segments[1].original_text, "cnn");
    }

    #[test]
    fn test_word_boundaries_respected() {
        let id = identifier(literal_table());
        assert!(id.identify("CNNX and XCNN").is_empty());
    }

    // -------------------------------------------------------------------------
    // Requirement 4: Overlap resolution
    // -------------------------------------------------------------------------
    #[test]
    fn test_equal_start_longest_wins() {
        let id = identifier(regex_table(&[
            ("short", r"\bHillary\b", "H"),
            ("long", r"\bHillary Clinton\b", "HC"),
        ]));
        let segments = id.identify("Hillary Clinton won");

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].pattern_id, "long");
    }

    #[test]
    fn test_equal_span_table_order_wins() {
        let id = identifier(regex_table(&[("first", "news", "A"), ("second", "NEWS", "B")]));
        let segments = id.identify("the news");

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].pattern_id, "first");
    }

    #[test]
    fn test_earliest_start_wins_over_longer_later_match() {
        let id = identifier(regex_table(&[
            ("ab", "fake news", "1"),
            ("bc", "news media outlet", "2"),
        ]));
        let segments = id.identify("fake news media outlet");

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].pattern_id, "ab");
    }

    #[test]
    fn test_resolve_overlaps_drops_contained_and_crossing() {
        let kept = resolve_overlaps(vec![
            Candidate { start: 10, end: 14, entry: 0 },
            Candidate { start: 0, end: 5, entry: 1 },
            Candidate { start: 3, end: 8, entry: 2 },
            Candidate { start: 5, end: 7, entry: 3 },
        ]);
        let spans: Vec<(usize, usize)> = kept.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 5), (5, 7), (10, 14)]);
    }

    // -------------------------------------------------------------------------
    // Requirement 5: Zero-width matches terminate and produce nothing
    // -------------------------------------------------------------------------
    #[test]
    fn test_empty_matching_pattern_terminates() {
        let id = identifier(regex_table(&[("empty", "x*", "y")]));
        let segments = id.identify("aaxxbé x");

        let originals: Vec<&str> = segments.iter().map(|s| s.original_text.as_str()).collect();
        assert_eq!(originals, vec!["xx", "x"]);
    }

    #[test]
    fn test_pure_lookaround_style_pattern_yields_nothing() {
        let id = identifier(regex_table(&[("boundary", r"\b", "|")]));
        assert!(id.identify("two words").is_empty());
    }

    // -------------------------------------------------------------------------
    // Requirement 6: Match cap bounds pathological entries
    // -------------------------------------------------------------------------
    #[test]
    fn test_match_cap_is_logged() {
        let logger = Rc::new(MemoryLogger::new());
        let config = EngineConfig { max_matches_per_entry: 3, ..Default::default() };
        let id = SegmentIdentifier::new(regex_table(&[("a", "ab", "x")]), &config, logger.clone()).unwrap();

        let segments = id.identify("ab ab ab ab ab");

        assert_eq!(segments.len(), 3);
        assert_eq!(logger.count(Level::Warn), 1);
    }

    // -------------------------------------------------------------------------
    // Requirement 7: Rewrite and free function agree with the identifier
    // -------------------------------------------------------------------------
    #[test]
    fn test_rewrite_splices_replacements_once() {
        let id = identifier(literal_table());
        assert_eq!(
            id.rewrite("Hillary Clinton spoke to CNN."),
            "Crooked Hillary spoke to Fake News CNN."
        );
        // Replacement text containing a pattern is not rewritten again
        assert_eq!(id.rewrite("CNN"), "Fake News CNN");
    }

    #[test]
    fn test_spans_point_at_replacements() {
        let id = identifier(literal_table());
        let rewrite = id.rewrite_with_spans("CNN met Hillary Clinton");

        assert_eq!(rewrite.text, "Fake News CNN met Crooked Hillary");
        let written: Vec<&str> = rewrite.spans.iter().map(|s| &rewrite.text[s.clone()]).collect();
        assert_eq!(written, vec!["Fake News CNN", "Crooked Hillary"]);
    }

    #[test]
    fn test_protected_ranges_are_left_alone_and_shifted() {
        let id = identifier(literal_table());
        let text = "CNN said Fake News CNN";
        // The second "CNN" sits inside text the engine already wrote
        let protected = vec![9..22];

        let rewrite = splice_protected(text, &id.identify(text), &protected);

        assert_eq!(rewrite.text, "Fake News CNN said Fake News CNN");
        assert_eq!(rewrite.spans, vec![0..13, 19..32]);
    }

    #[test]
    fn test_free_function_matches_identifier() {
        let table = literal_table();
        let text = "CNN interviewed Hillary Clinton about CNN";
        assert_eq!(identify_segments(text, &table), identifier(table.clone()).identify(text));
    }

    #[test]
    fn test_multibyte_offsets_are_char_boundaries() {
        let id = identifier(literal_table());
        let text = "Ünïcödé « CNN » ✓";
        let segments = id.identify(text);

        assert_eq!(segments.len(), 1);
        assert_eq!(&text[segments[0].start..segments[0].end], "CNN");
    }
}
