use super::{NodeKind, SceneGraph};
use crate::errors::ExtractionError;
use crate::types::NodeId;
use logomotion_schema::{Extraction, SceneElement};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Turns an uploaded document into addressable elements plus an id-annotated copy.
pub trait Extractor: Send + Sync {
    fn extract(&self, document: &str) -> Result<Extraction, ExtractionError>;
}

/// Tags that never become layers.
const NON_VISUAL: &[&str] = &["defs", "metadata", "title", "desc", "style", "script"];

pub const WHOLE_DOCUMENT_ID: &str = "layer-whole";

/// Splits an SVG into its top-level visual children.
///
/// Children keep their own `id`; the rest get `layer-N`, skipping ids already taken.
#[derive(Debug, Default, Clone, Copy)]
pub struct SvgExtractor;

impl Extractor for SvgExtractor {
    #[instrument(skip_all, fields(bytes = document.len()))]
    fn extract(&self, document: &str) -> Result<Extraction, ExtractionError> {
        let mut graph = SceneGraph::parse(document)?;
        let Some(root) = graph.root() else {
            return Err(ExtractionError::Empty);
        };

        let layers: Vec<NodeId> = graph
            .get_node(root)
            .map(|n| n.children.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|&c| {
                graph
                    .get_node(c)
                    .and_then(|n| n.tag())
                    .map(|tag| !NON_VISUAL.contains(&local_name(tag).to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();

        if layers.len() <= 1 {
            let id = match graph.get_node(root).and_then(|n| n.id()) {
                Some(id) => id.to_string(),
                None => {
                    if let Some(node) = graph.get_node_mut(root) {
                        node.set_attribute("id", WHOLE_DOCUMENT_ID);
                    }
                    WHOLE_DOCUMENT_ID.to_string()
                }
            };
            let annotated = graph.to_svg_string(false);
            debug!("Document has at most one visual child, using it whole");
            return Ok(Extraction {
                elements: vec![SceneElement {
                    id,
                    name: "Complete SVG".to_string(),
                    content: annotated.clone(),
                }],
                annotated_document: annotated,
            });
        }

        let mut used: HashSet<String> = graph
            .elements()
            .into_iter()
            .filter_map(|n| graph.get_node(n).and_then(|node| node.id()).map(str::to_string))
            .collect();
        let mut counter = 0usize;
        let mut elements = Vec::with_capacity(layers.len());

        for &layer in &layers {
            let name = element_name(&graph, layer);
            let existing = graph.get_node(layer).and_then(|n| n.id()).map(str::to_string);
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = loop {
                        counter += 1;
                        let candidate = format!("layer-{}", counter);
                        if !used.contains(&candidate) {
                            break candidate;
                        }
                    };
                    used.insert(id.clone());
                    if let Some(node) = graph.get_node_mut(layer) {
                        node.set_attribute("id", &id);
                    }
                    id
                }
            };
            elements.push(SceneElement {
                name,
                content: graph.element_document(layer),
                id,
            });
        }

        debug!(count = elements.len(), "Extracted layers");
        Ok(Extraction {
            elements,
            annotated_document: graph.to_svg_string(false),
        })
    }
}

fn local_name(tag: &str) -> &str {
    tag.rsplit(':').next().unwrap_or(tag)
}

/// Id, else class list, else the id of a group's only child, else the tag name.
///
/// Must run before an id is assigned to the node.
fn element_name(graph: &SceneGraph, id: NodeId) -> String {
    let Some(node) = graph.get_node(id) else {
        return String::new();
    };
    if let Some(id) = node.id() {
        return id.to_string();
    }
    if let Some(class) = node.attribute("class") {
        let classes: Vec<&str> = class.split_whitespace().collect();
        if !classes.is_empty() {
            return classes.join(" ");
        }
    }
    let tag = node.tag().map(local_name).unwrap_or_default().to_ascii_lowercase();
    if tag == "g" {
        let element_children: Vec<NodeId> = node
            .children
            .iter()
            .copied()
            .filter(|&c| matches!(graph.get_node(c).map(|n| &n.kind), Some(NodeKind::Element { .. })))
            .collect();
        if let [only] = element_children.as_slice() {
            if let Some(child_id) = graph.get_node(*only).and_then(|n| n.id()) {
                return child_id.to_string();
            }
        }
    }
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGO: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <defs><linearGradient id="grad"/></defs>
        <title>Logo</title>
        <g class="mark bird"><path d="M0 0L5 5"/></g>
        <g><circle id="sun" r="4"/></g>
        <text id="wordmark">ACME</text>
        <rect id="layer-2" width="1" height="1"/>
        <ellipse rx="2" ry="1"/>
    </svg>"#;

    #[test]
    fn extracts_visual_children_and_assigns_ids() {
        let extraction = SvgExtractor.extract(LOGO).unwrap();
        let ids: Vec<&str> = extraction.elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["layer-1", "layer-3", "wordmark", "layer-2", "layer-4"]);
        let names: Vec<&str> = extraction.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["mark bird", "sun", "wordmark", "layer-2", "ellipse"]);
        assert!(extraction.elements[0].content.starts_with("<svg"));
        assert!(extraction.elements[0].content.contains("viewBox=\"0 0 100 100\""));
    }

    #[test]
    fn every_id_is_present_in_annotated_document() {
        let extraction = SvgExtractor.extract(LOGO).unwrap();
        for element in &extraction.elements {
            assert!(extraction
                .annotated_document
                .contains(&format!("id=\"{}\"", element.id)));
        }
        let again = SvgExtractor.extract(&extraction.annotated_document).unwrap();
        let ids = |e: &Extraction| e.elements.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&again), ids(&extraction));
    }

    #[test]
    fn single_child_documents_are_whole() {
        let extraction = SvgExtractor
            .extract(r#"<svg xmlns="http://www.w3.org/2000/svg"><defs/><path d="M0 0"/></svg>"#)
            .unwrap();
        assert_eq!(extraction.elements.len(), 1);
        assert_eq!(extraction.elements[0].id, WHOLE_DOCUMENT_ID);
        assert_eq!(extraction.elements[0].name, "Complete SVG");
        assert!(extraction.annotated_document.contains("id=\"layer-whole\""));
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(SvgExtractor.extract("<svg><g></svg>").is_err());
        assert!(matches!(
            SvgExtractor.extract("<root/>"),
            Err(ExtractionError::NotSvg(_))
        ));
    }
}
