//! Phrase rewriting pipeline
//!
//! Text flows one way per cycle:
//! coordinator → identifier (segments) → annotator (markers) → coordinator,
//! which recognizes its own markers and never feeds them back in.

pub mod annotator;
pub mod cache;
pub mod coordinator;
pub mod pattern;
pub mod processed;
pub mod segment;

pub use annotator::*;
pub use cache::*;
pub use coordinator::*;
pub use pattern::*;
pub use processed::*;
pub use segment::*;

#[cfg(test)]
mod tests;
