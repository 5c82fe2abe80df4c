//! Browser tests for the JS-facing surface. Run with `wasm-pack test --headless --chrome`.

#![cfg(target_arch = "wasm32")]

use phrasecore::PhraseRewriter;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn patterns() -> JsValue {
    let json = r#"[
        {"id": "hillary", "pattern": "Hillary Clinton", "replacement": "Crooked Hillary", "literal": true},
        {"id": "cnn", "pattern": "CNN", "replacement": "Fake News CNN", "literal": true}
    ]"#;
    js_sys::JSON::parse(json).unwrap()
}

#[wasm_bindgen_test]
fn rewriter_constructs_with_null_config() {
    let rewriter = PhraseRewriter::js_new(patterns(), JsValue::NULL).unwrap();
    assert_eq!(rewriter.js_pattern_count(), 2);
}

#[wasm_bindgen_test]
fn rewrite_text_round_trips_through_js() {
    let mut rewriter = PhraseRewriter::js_new(patterns(), JsValue::UNDEFINED).unwrap();

    assert_eq!(
        rewriter.js_rewrite_text("Hillary Clinton spoke to CNN"),
        "Crooked Hillary spoke to Fake News CNN"
    );
    let segments = rewriter.js_identify_segments("Hillary Clinton spoke to CNN");
    assert!(js_sys::Array::is_array(&segments));
    assert_eq!(js_sys::Array::from(&segments).length(), 2);
}

#[wasm_bindgen_test]
fn bad_patterns_are_rejected() {
    let bad = js_sys::JSON::parse(r#"[{"id": "x"}]"#).unwrap();
    assert!(PhraseRewriter::js_new(bad, JsValue::NULL).is_err());
}
