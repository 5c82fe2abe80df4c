//! Error types for the tree model and the pattern registry.
//!
//! Neither error ever reaches the host page: the annotator and coordinator
//! log them and fall back to a neutral value.

use thiserror::Error;

use crate::dom::NodeId;

/// Failure of a tree operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("node {0:?} is not a text node")]
    NotText(NodeId),

    #[error("node {0:?} is not an element")]
    NotElement(NodeId),

    #[error("node {0:?} has no parent")]
    NoParent(NodeId),

    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },

    #[error("split offset {offset} out of range for text of length {len}")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("split offset {0} is not on a character boundary")]
    NotCharBoundary(usize),

    #[error("inserting {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
}

/// Failure while building the pattern table.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern '{id}' is empty")]
    EmptyPattern { id: String },

    #[error("duplicate pattern id '{0}'")]
    DuplicateId(String),

    #[error("pattern '{id}' failed to compile: {source}")]
    InvalidRegex {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("trigger list failed to build: {0}")]
    Trigger(#[from] aho_corasick::BuildError),

    #[error("invalid pattern definitions: {0}")]
    Json(#[from] serde_json::Error),
}
