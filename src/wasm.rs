//! PhraseRewriter: string-level engine surface for JavaScript hosts
//!
//! Hosts that manage their own DOM call into this for identification and
//! cached rewriting; markers are built on the JS side from the returned
//! segments.

use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::error::PatternError;
use crate::logging::{ConsoleLogger, Logger};
use crate::rewrite::cache::{CacheStats, RewriteCache};
use crate::rewrite::pattern::{PatternDefinition, PatternTable};
use crate::rewrite::segment::{Segment, SegmentIdentifier};

#[wasm_bindgen]
pub struct PhraseRewriter {
    identifier: SegmentIdentifier,
    cache: RewriteCache,
}

impl PhraseRewriter {
    pub fn new(
        definitions: &[PatternDefinition],
        config: EngineConfig,
        logger: Rc<dyn Logger>,
    ) -> Result<Self, PatternError> {
        let config = config.validated();
        let table = Rc::new(PatternTable::from_definitions(definitions)?);
        Ok(Self {
            identifier: SegmentIdentifier::new(table, &config, logger)?,
            cache: RewriteCache::new(config.cache_capacity, config.cache_evict_fraction),
        })
    }

    /// Build from JSON pattern definitions and an optional JSON config
    pub fn from_json(patterns: &str, config: Option<&str>) -> Result<Self, PatternError> {
        let definitions: Vec<PatternDefinition> = serde_json::from_str(patterns)?;
        let config = match config {
            Some(json) => EngineConfig::from_json(json)?,
            None => EngineConfig::default(),
        };
        Self::new(&definitions, config, Rc::new(ConsoleLogger))
    }

    pub fn identify(&self, text: &str) -> Vec<Segment> {
        self.identifier.identify(text)
    }

    /// Rewritten text, memoized
    pub fn rewrite(&mut self, text: &str) -> String {
        let identifier = &self.identifier;
        self.cache.get_or_insert_with(text, |t| identifier.rewrite(t))
    }

    pub fn pattern_count(&self) -> usize {
        self.identifier.table().len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

// =============================================================================
// WASM Bindings
// =============================================================================

#[wasm_bindgen]
impl PhraseRewriter {
    /// Expects an array of { id, pattern, replacement, key_terms?, literal? }
    /// and an optional config object
    #[wasm_bindgen(constructor)]
    pub fn js_new(patterns: JsValue, config: JsValue) -> Result<PhraseRewriter, JsValue> {
        let definitions: Vec<PatternDefinition> = serde_wasm_bindgen::from_value(patterns)
            .map_err(|e| JsValue::from_str(&format!("Failed to parse patterns: {}", e)))?;
        let config: EngineConfig = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| JsValue::from_str(&format!("Failed to parse config: {}", e)))?
        };
        Self::new(&definitions, config, Rc::new(ConsoleLogger))
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Segments for one text (array of { original_text, replacement_text, start, end, pattern_id })
    #[wasm_bindgen(js_name = "identifySegments")]
    pub fn js_identify_segments(&self, text: &str) -> JsValue {
        serde_wasm_bindgen::to_value(&self.identify(text)).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "rewriteText")]
    pub fn js_rewrite_text(&mut self, text: &str) -> String {
        self.rewrite(text)
    }

    #[wasm_bindgen(js_name = "patternCount")]
    pub fn js_pattern_count(&self) -> usize {
        self.pattern_count()
    }

    #[wasm_bindgen(js_name = "cacheStats")]
    pub fn js_cache_stats(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.cache_stats()).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = "clearCache")]
    pub fn js_clear_cache(&mut self) {
        self.clear_cache();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullLogger;

    const PATTERNS: &str = r#"[
        {"id": "hillary", "pattern": "Hillary Clinton", "replacement": "Crooked Hillary", "literal": true},
        {"id": "cnn", "pattern": "CNN", "replacement": "Fake News CNN", "literal": true}
    ]"#;

    fn rewriter() -> PhraseRewriter {
        let definitions: Vec<PatternDefinition> = serde_json::from_str(PATTERNS).unwrap();
        PhraseRewriter::new(&definitions, EngineConfig::default(), Rc::new(NullLogger)).unwrap()
    }

    #[test]
    fn test_rewriter_identifies_and_rewrites() {
        let mut rewriter = rewriter();

        let segments = rewriter.identify("Hillary Clinton spoke to CNN");
        assert_eq!(segments.len(), 2);
        assert_eq!(rewriter.pattern_count(), 2);
        assert_eq!(
            rewriter.rewrite("Hillary Clinton spoke to CNN"),
            "Crooked Hillary spoke to Fake News CNN"
        );
    }

    #[test]
    fn test_rewrite_is_cached() {
        let mut rewriter = rewriter();

        rewriter.rewrite("CNN again");
        rewriter.rewrite("CNN again");
        rewriter.rewrite("no match");

        let stats = rewriter.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.len, 2);

        rewriter.clear_cache();
        assert_eq!(rewriter.cache_stats().len, 0);
    }

    #[test]
    fn test_from_json_with_config() {
        let rewriter = PhraseRewriter::from_json(PATTERNS, Some(r#"{"min_text_len": 10}"#)).unwrap();

        assert!(rewriter.identify("CNN").is_empty());
        assert_eq!(rewriter.identify("watching CNN").len(), 1);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(PhraseRewriter::from_json("not json", None), Err(PatternError::Json(_))));

        let invalid = r#"[{"id": "bad", "pattern": "(", "replacement": "x"}]"#;
        assert!(matches!(
            PhraseRewriter::from_json(invalid, None),
            Err(PatternError::InvalidRegex { .. })
        ));
    }
}
