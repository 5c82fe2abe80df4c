//! TreeAnnotator: materializes segments as marker elements
//!
//! A marker replaces exactly the matched substring of a text node:
//!
//! ```text
//! "Hillary Clinton spoke to CNN"
//!   => <span class="phrase-marker" data-original-text="Hillary Clinton" ...>Crooked Hillary</span>
//!      " spoke to "
//!      <span class="phrase-marker" data-original-text="CNN" ...>Fake News CNN</span>
//! ```
//!
//! Segments are applied from the last to the first so that splitting the
//! node for one segment never moves the offsets of the ones still pending.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::error::DomError;
use crate::logging::Logger;
use crate::rewrite::processed::PROCESSED_ATTR;
use crate::rewrite::segment::Segment;

// =============================================================================
// Marker contract
// =============================================================================

pub const MARKER_TAG: &str = "span";
pub const MARKER_CLASS: &str = "phrase-marker";
/// Read by the tooltip layer
pub const ORIGINAL_ATTR: &str = "data-original-text";
pub const PATTERN_ATTR: &str = "data-replacement-id";

/// Marker as seen by the tooltip layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerInfo {
    pub node: NodeId,
    pub original_text: String,
    pub visible_text: String,
    pub pattern_id: Option<String>,
}

pub fn is_marker(doc: &Document, node: NodeId) -> bool {
    doc.tag(node) == Some(MARKER_TAG) && doc.has_class(node, MARKER_CLASS)
}

/// Every marker under `root`, in tree order
pub fn markers(doc: &Document, root: NodeId) -> Vec<MarkerInfo> {
    doc.find_all(root, is_marker)
        .into_iter()
        .map(|node| MarkerInfo {
            node,
            original_text: doc.attr(node, ORIGINAL_ATTR).unwrap_or_default().to_string(),
            visible_text: doc.text_content(node),
            pattern_id: doc.attr(node, PATTERN_ATTR).map(str::to_string),
        })
        .collect()
}

fn create_marker(doc: &mut Document, original: &str, segment: &Segment) -> Result<NodeId, DomError> {
    let marker = doc.create_element(MARKER_TAG);
    doc.set_attr(marker, "class", MARKER_CLASS)?;
    doc.set_attr(marker, ORIGINAL_ATTR, original)?;
    doc.set_attr(marker, PATTERN_ATTR, &segment.pattern_id)?;
    doc.set_attr(marker, PROCESSED_ATTR, "true")?;
    // Character data only: replacement text is never interpreted as markup
    doc.set_text_content(marker, &segment.replacement_text)?;
    Ok(marker)
}

// =============================================================================
// Report
// =============================================================================

/// What one `annotate_with_report` call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    pub modified: bool,
    /// Created markers, last segment first
    pub markers: Vec<NodeId>,
    /// Unmatched text left behind, in tree order (includes the input node if it survived)
    pub fragments: Vec<NodeId>,
    /// Segments rejected by validation
    pub skipped: usize,
    /// Tree error that stopped the call, if any
    pub error: Option<DomError>,
}

// =============================================================================
// TreeAnnotator
// =============================================================================

pub struct TreeAnnotator {
    logger: Rc<dyn Logger>,
}

impl TreeAnnotator {
    pub fn new(logger: Rc<dyn Logger>) -> Self {
        Self { logger }
    }

    /// True iff the tree was modified
    pub fn annotate(&self, doc: &mut Document, node: NodeId, segments: &[Segment]) -> bool {
        self.annotate_with_report(doc, node, segments).modified
    }

    pub fn annotate_with_report(
        &self,
        doc: &mut Document,
        node: NodeId,
        segments: &[Segment],
    ) -> AnnotationReport {
        let mut report = AnnotationReport::default();

        let Some(content) = doc.text(node) else {
            self.logger.debug(&format!("[Annotator] {:?} is not a text node", node));
            return report;
        };
        if content.is_empty() || segments.is_empty() || doc.parent(node).is_none() {
            return report;
        }

        let mut ordered: Vec<&Segment> = segments.iter().collect();
        ordered.sort_by(|a, b| b.start.cmp(&a.start));

        let mut tails: Vec<NodeId> = Vec::new();
        for segment in ordered {
            let Some(original) = self.validate(doc, node, segment) else {
                report.skipped += 1;
                continue;
            };
            match self.wrap_segment(doc, node, segment, &original) {
                Ok((marker, tail)) => {
                    report.modified = true;
                    report.markers.push(marker);
                    tails.extend(tail);
                }
                Err(err) => {
                    self.logger.error(&format!(
                        "[Annotator] abandoning {:?} at segment {}..{}: {}",
                        node, segment.start, segment.end, err
                    ));
                    report.error = Some(err);
                    break;
                }
            }
        }

        if doc.parent(node).is_some() && doc.text(node).is_some_and(|t| !t.is_empty()) {
            report.fragments.push(node);
        }
        // Tails were produced back to front
        report
            .fragments
            .extend(tails.into_iter().rev().filter(|&t| doc.text(t).is_some_and(|c| !c.is_empty())));
        report
    }

    /// Current text of the segment's range, if the segment still fits the node
    fn validate(&self, doc: &Document, node: NodeId, segment: &Segment) -> Option<String> {
        let content = doc.text(node)?;
        let in_range = segment.start < segment.end && segment.end <= content.len();
        let slice = if in_range { content.get(segment.start..segment.end) } else { None };

        match slice {
            Some(slice) if slice == segment.original_text => Some(slice.to_string()),
            Some(slice) => {
                self.logger.warn(&format!(
                    "[Annotator] stale segment {}..{}: expected {:?}, found {:?}",
                    segment.start, segment.end, segment.original_text, slice
                ));
                None
            }
            None => {
                self.logger.warn(&format!(
                    "[Annotator] invalid segment {}..{} for text of length {}",
                    segment.start,
                    segment.end,
                    content.len()
                ));
                None
            }
        }
    }

    /// Split out `[start, end)` and put a marker in its place.
    ///
    /// Either all three steps land or the node is stitched back together.
    fn wrap_segment(
        &self,
        doc: &mut Document,
        node: NodeId,
        segment: &Segment,
        original: &str,
    ) -> Result<(NodeId, Option<NodeId>), DomError> {
        let len = doc.text(node).map_or(0, str::len);

        let tail = if segment.end < len {
            Some(doc.split_text(node, segment.end)?)
        } else {
            None
        };

        let middle = if segment.start > 0 {
            match doc.split_text(node, segment.start) {
                Ok(middle) => middle,
                Err(err) => {
                    self.restore(doc, node, &[tail]);
                    return Err(err);
                }
            }
        } else {
            node
        };

        let placed = create_marker(doc, original, segment)
            .and_then(|marker| doc.replace_child(marker, middle).map(|_| marker));
        match placed {
            Ok(marker) => Ok((marker, tail)),
            Err(err) => {
                let pieces = if middle == node { vec![tail] } else { vec![Some(middle), tail] };
                self.restore(doc, node, &pieces);
                Err(err)
            }
        }
    }

    /// Fold split pieces back into `node`
    fn restore(&self, doc: &mut Document, node: NodeId, pieces: &[Option<NodeId>]) {
        for &piece in pieces.iter().flatten() {
            let merged = doc
                .text(piece)
                .map(|tail| format!("{}{}", doc.text(node).unwrap_or_default(), tail));
            let result = match (merged, doc.parent(piece)) {
                (Some(merged), Some(parent)) => doc
                    .set_text(node, &merged)
                    .and_then(|_| doc.remove_child(parent, piece)),
                (Some(merged), None) => doc.set_text(node, &merged),
                (None, _) => Ok(()),
            };
            if let Err(err) = result {
                self.logger.error(&format!("[Annotator] could not restore {:?}: {}", node, err));
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
