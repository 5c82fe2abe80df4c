
use std::rc::Rc;

use crate::dom::{Document, NodeData, NodeId};
use crate::rewrite::annotator::{is_marker, ORIGINAL_ATTR};
use crate::rewrite::pattern::{PatternDefinition, PatternTable};

/// The two-phrase table used across scenarios
pub(crate) fn political_table() -> Rc<PatternTable> {
    Rc::new(
        PatternTable::from_literals(&[
            ("hillary", "Hillary Clinton", "Crooked Hillary"),
            ("cnn", "CNN", "Fake News CNN"),
        ])
        .unwrap(),
    )
}

/// Overlapping regex entries
pub(crate) fn overlapping_table() -> Rc<PatternTable> {
    let defs = vec![
        PatternDefinition {
            id: "fake-news".to_string(),
            pattern: r"\bfake news\b".to_string(),
            replacement: "FN".to_string(),
            key_terms: None,
            literal: false,
        },
        PatternDefinition {
            id: "news-media".to_string(),
            pattern: r"\bnews media( outlets?)?\b".to_string(),
            replacement: "NM".to_string(),
            key_terms: None,
            literal: false,
        },
        PatternDefinition {
            id: "cnn".to_string(),
            pattern: "CNN".to_string(),
            replacement: "Fake News CNN".to_string(),
            key_terms: None,
            literal: true,
        },
    ];
    Rc::new(PatternTable::from_definitions(&defs).unwrap())
}

/// Text of a subtree with every marker read back as its original text
pub(crate) fn original_text(doc: &Document, node: NodeId) -> String {
    match doc.data(node) {
        Some(NodeData::Text(content)) => content.clone(),
        Some(NodeData::Element { .. }) if is_marker(doc, node) => {
            doc.attr(node, ORIGINAL_ATTR).unwrap_or_default().to_string()
        }
        Some(NodeData::Element { .. }) => doc
            .children(node)
            .iter()
            .map(|&child| original_text(doc, child))
            .collect(),
        None => String::new(),
    }
}
