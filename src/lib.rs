//! PhraseCore: Incremental Phrase Rewriting Engine
//!
//! A Rust/WASM implementation of the live-document phrase rewriter.
//!
//! # Architecture
//!
//! ## Rewrite Components
//! - `rewrite/pattern.rs` - PatternTable: compiled, immutable pattern registry with key terms
//! - `rewrite/segment.rs` - SegmentIdentifier: non-overlapping match segments for one string
//! - `rewrite/annotator.rs` - TreeAnnotator: splits text nodes and wraps matches in markers
//! - `rewrite/coordinator.rs` - RewriteCoordinator: time-sliced sweep + change subscription
//! - `rewrite/processed.rs` - ProcessedRegistry: content-addressed "already handled" records
//! - `rewrite/cache.rs` - RewriteCache: bounded text -> rewritten text memo
//!
//! ## Host Tree
//! - `dom/node.rs` - Document: arena-backed element/text tree
//! - `dom/observer.rs` - Mutation records, observers and the paused-observer guard
//!
//! # Usage (Rust)
//! ```rust,ignore
//! let table = Rc::new(PatternTable::from_literals(&[("hc", "Hillary Clinton", "Crooked Hillary")])?);
//! let mut coordinator = RewriteCoordinator::new(table, EngineConfig::default(), Rc::new(ConsoleLogger))?;
//! coordinator.start(&mut doc, root);
//! coordinator.drive(&mut doc);
//! ```
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { PhraseRewriter } from 'phrasecore';
//!
//! await init();
//! const rewriter = new PhraseRewriter(
//!   [{ id: 'cnn', pattern: 'CNN', replacement: 'Fake News CNN', literal: true }],
//!   null,
//! );
//! rewriter.identifySegments("Hillary Clinton spoke to CNN");
//! rewriter.rewriteText("Hillary Clinton spoke to CNN");
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod logging;
pub mod rewrite;
pub mod wasm;

pub use config::*;
pub use dom::*;
pub use error::*;
pub use logging::*;
pub use rewrite::*;
pub use wasm::*;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("phrasecore v{}", env!("CARGO_PKG_VERSION"))
}
