//! # Scene Module
//!
//! The mutable visual surface animation scripts target.
//!
//! ## Responsibilities
//! - **SceneGraph**: Arena of SVG element and text nodes parsed from the annotated document.
//! - **Style Overrides**: Per-node animated values written by Timeline seeks.
//! - **Serialization**: Rebuilds SVG markup (with or without overrides) for rasterization.
//! - **Selectors**: `#id`, `.class`, tag, attribute and descendant queries (see `selector`).
//! - **Mount / Extraction**: See `mount` and `extract`.

pub mod extract;
pub mod mount;
pub mod selector;

pub use extract::{Extractor, SvgExtractor};
pub use mount::SceneMount;
pub use selector::{Selector, SelectorError};

use crate::errors::ExtractionError;
use crate::types::{AnimatedValue, Color, NodeId};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Shared, lockable handle to a mounted scene. Timelines write through it on seek.
pub type SceneHandle = Arc<Mutex<SceneGraph>>;

/// Locks a scene, recovering the data if a previous holder panicked.
pub fn lock_scene(scene: &SceneHandle) -> MutexGuard<'_, SceneGraph> {
    scene.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A property a Timeline can drive on a node.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Property {
    Opacity,
    TranslateX,
    TranslateY,
    Scale,
    ScaleX,
    ScaleY,
    Rotate,
    SkewX,
    SkewY,
    /// Any other presentation attribute, stored under its kebab-case SVG name.
    Attribute(String),
}

impl Property {
    /// Maps a script-facing key (`translateX`, `strokeDashoffset`, `fill`) to a property.
    pub fn from_key(key: &str) -> Property {
        match key {
            "opacity" => Property::Opacity,
            "translateX" | "x_offset" => Property::TranslateX,
            "translateY" | "y_offset" => Property::TranslateY,
            "scale" => Property::Scale,
            "scaleX" => Property::ScaleX,
            "scaleY" => Property::ScaleY,
            "rotate" | "rotation" => Property::Rotate,
            "skewX" => Property::SkewX,
            "skewY" => Property::SkewY,
            other => Property::Attribute(kebab_case(other)),
        }
    }

    pub fn is_transform(&self) -> bool {
        !matches!(self, Property::Opacity | Property::Attribute(_))
    }

    pub fn is_color(&self) -> bool {
        match self {
            Property::Attribute(name) => matches!(
                name.as_str(),
                "fill" | "stroke" | "stop-color" | "flood-color" | "lighting-color" | "color"
            ),
            _ => false,
        }
    }
}

fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Inline animated state of a node, the equivalent of an element's `style`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeStyle {
    pub values: BTreeMap<Property, AnimatedValue>,
    /// Pivot for rotate/scale/skew in user units (defaults to the origin, as SVG does).
    pub transform_origin: Option<(f64, f64)>,
}

impl NodeStyle {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.transform_origin.is_none()
    }

    fn number(&self, property: &Property) -> Option<f64> {
        self.values.get(property).and_then(AnimatedValue::as_number)
    }

    /// Builds the SVG transform list this style contributes, if any.
    fn transform_list(&self) -> Option<String> {
        if !self.values.keys().any(Property::is_transform) {
            return None;
        }
        let tx = self.number(&Property::TranslateX).unwrap_or(0.0);
        let ty = self.number(&Property::TranslateY).unwrap_or(0.0);
        let uniform = self.number(&Property::Scale).unwrap_or(1.0);
        let sx = uniform * self.number(&Property::ScaleX).unwrap_or(1.0);
        let sy = uniform * self.number(&Property::ScaleY).unwrap_or(1.0);
        let rotate = self.number(&Property::Rotate).unwrap_or(0.0);
        let skew_x = self.number(&Property::SkewX).unwrap_or(0.0);
        let skew_y = self.number(&Property::SkewY).unwrap_or(0.0);
        let (ox, oy) = self.transform_origin.unwrap_or((0.0, 0.0));

        let mut list = String::new();
        if tx != 0.0 || ty != 0.0 {
            let _ = write!(list, "translate({} {}) ", fmt_num(tx), fmt_num(ty));
        }
        let pivoted = rotate != 0.0 || sx != 1.0 || sy != 1.0 || skew_x != 0.0 || skew_y != 0.0;
        if pivoted && (ox != 0.0 || oy != 0.0) {
            let _ = write!(list, "translate({} {}) ", fmt_num(ox), fmt_num(oy));
        }
        if rotate != 0.0 {
            let _ = write!(list, "rotate({}) ", fmt_num(rotate));
        }
        if sx != 1.0 || sy != 1.0 {
            let _ = write!(list, "scale({} {}) ", fmt_num(sx), fmt_num(sy));
        }
        if skew_x != 0.0 {
            let _ = write!(list, "skewX({}) ", fmt_num(skew_x));
        }
        if skew_y != 0.0 {
            let _ = write!(list, "skewY({}) ", fmt_num(skew_y));
        }
        if pivoted && (ox != 0.0 || oy != 0.0) {
            let _ = write!(list, "translate({} {}) ", fmt_num(-ox), fmt_num(-oy));
        }
        Some(list.trim_end().to_string())
    }
}

fn fmt_num(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

/// Element or text payload of a node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

/// A node in the scene arena.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub kind: NodeKind,
    /// Indices of child nodes.
    pub children: Vec<NodeId>,
    /// Index of parent node.
    pub parent: Option<NodeId>,
    pub style: NodeStyle,
}

impl SceneNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            parent: None,
            style: NodeStyle::default(),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.kind {
            match attributes.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id").filter(|id| !id.is_empty())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

/// The Scene Graph data structure: an arena of parsed SVG nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneGraph {
    /// The Arena of all nodes.
    pub nodes: Vec<Option<SceneNode>>,
    root: Option<NodeId>,
    /// Namespace declarations of the root element as `(prefix, uri)`.
    namespaces: Vec<(Option<String>, String)>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an SVG document into a fresh arena.
    pub fn parse(document: &str) -> Result<Self, ExtractionError> {
        if document.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = roxmltree::Document::parse_with_options(document, options)?;
        let root = doc.root_element();
        if root.tag_name().name() != "svg" {
            return Err(ExtractionError::NotSvg(root.tag_name().name().to_string()));
        }

        let mut graph = SceneGraph::new();
        graph.namespaces = root
            .namespaces()
            .filter(|ns| ns.uri() != XML_NS)
            .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
            .collect();
        let root_id = graph.import(root, None);
        graph.root = Some(root_id);
        Ok(graph)
    }

    fn import(&mut self, node: roxmltree::Node<'_, '_>, parent: Option<NodeId>) -> NodeId {
        let tag = qualified_name(node, node.tag_name().namespace(), node.tag_name().name());
        let attributes = node
            .attributes()
            .map(|a| {
                (
                    qualified_name(node, a.namespace(), a.name()),
                    a.value().to_string(),
                )
            })
            .collect();
        let id = self.add_node(SceneNode::new(NodeKind::Element { tag, attributes }));
        if let Some(parent) = parent {
            self.add_child(parent, id);
        }

        for child in node.children() {
            if child.is_element() {
                self.import(child, Some(id));
            } else if child.is_text() {
                let text = child.text().unwrap_or_default();
                if !text.trim().is_empty() {
                    let text_id = self.add_node(SceneNode::new(NodeKind::Text(text.to_string())));
                    self.add_child(id, text_id);
                }
            }
        }
        id
    }

    /// Adds a node to the arena and returns its ID.
    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(node));
        id
    }

    /// Establishes a parent-child relationship between two nodes.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p_node) = self.nodes.get_mut(parent).and_then(|n| n.as_mut()) {
            p_node.children.push(child);
        }
        if let Some(c_node) = self.nodes.get_mut(child).and_then(|n| n.as_mut()) {
            c_node.parent = Some(parent);
        }
    }

    /// Returns a mutable reference to the SceneNode.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id).and_then(|n| n.as_mut())
    }

    /// Returns a shared reference to the SceneNode.
    pub fn get_node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id).and_then(|n| n.as_ref())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Element ids in document order (pre-order).
    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                if let Some(node) = self.get_node(id) {
                    if node.tag().is_some() {
                        out.push(id);
                    }
                    stack.extend(node.children.iter().rev());
                }
            }
        }
        out
    }

    /// Every `id` attribute below the root element, in document order.
    pub fn addressable_ids(&self) -> Vec<String> {
        self.elements()
            .into_iter()
            .filter(|&n| Some(n) != self.root)
            .filter_map(|n| self.get_node(n).and_then(|node| node.id()).map(str::to_string))
            .collect()
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|&n| self.get_node(n).and_then(|node| node.id()) == Some(id))
    }

    /// Resolves a selector against the scene, returning matches in document order.
    pub fn query(&self, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .elements()
            .into_iter()
            .filter(|&n| selector.matches(self, n))
            .collect())
    }

    /// Intrinsic pixel size from `width`/`height`, falling back to the `viewBox`.
    pub fn measure(&self) -> (u32, u32) {
        let Some(root) = self.root.and_then(|r| self.get_node(r)) else {
            return (0, 0);
        };
        let view_box: Option<Vec<f64>> = root.attribute("viewBox").and_then(|vb| {
            vb.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<f64>().ok())
                .collect::<Option<Vec<f64>>>()
                .filter(|v| v.len() == 4)
        });
        let dim = |attr: &str, vb_index: usize| -> u32 {
            let explicit = root
                .attribute(attr)
                .filter(|v| !v.trim_end().ends_with('%'))
                .and_then(|v| leading_number(v));
            let value = explicit.or_else(|| view_box.as_ref().map(|vb| vb[vb_index]));
            match value {
                Some(v) if v.is_finite() && v > 0.0 => v.ceil() as u32,
                _ => 0,
            }
        };
        (dim("width", 2), dim("height", 3))
    }

    /// Value a property has when no Timeline has touched it.
    pub fn base_value(&self, id: NodeId, property: &Property) -> AnimatedValue {
        let node = self.get_node(id);
        match property {
            Property::Opacity => AnimatedValue::Number(
                node.and_then(|n| n.attribute("opacity"))
                    .and_then(leading_number)
                    .unwrap_or(1.0),
            ),
            Property::Scale | Property::ScaleX | Property::ScaleY => AnimatedValue::Number(1.0),
            Property::TranslateX
            | Property::TranslateY
            | Property::Rotate
            | Property::SkewX
            | Property::SkewY => AnimatedValue::Number(0.0),
            Property::Attribute(name) if property.is_color() => {
                let fallback = if name == "fill" {
                    Color::BLACK
                } else {
                    Color::TRANSPARENT
                };
                AnimatedValue::Color(
                    node.and_then(|n| n.attribute(name))
                        .and_then(Color::parse)
                        .unwrap_or(fallback),
                )
            }
            Property::Attribute(name) => AnimatedValue::Number(
                node.and_then(|n| n.attribute(name))
                    .and_then(leading_number)
                    .unwrap_or(0.0),
            ),
        }
    }

    /// Writes an animated value into a node's inline style.
    pub fn set_style(&mut self, id: NodeId, property: Property, value: AnimatedValue) {
        if let Some(node) = self.get_node_mut(id) {
            node.style.values.insert(property, value);
        }
    }

    pub fn set_transform_origin(&mut self, id: NodeId, origin: (f64, f64)) {
        if let Some(node) = self.get_node_mut(id) {
            node.style.transform_origin = Some(origin);
        }
    }

    /// Drops every animated override, restoring the as-mounted appearance.
    pub fn clear_styles(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.style = NodeStyle::default();
        }
    }

    /// Serializes the scene. With `with_styles`, animated overrides are folded into attributes.
    pub fn to_svg_string(&self, with_styles: bool) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.write_node(root, &mut out, with_styles, true);
        }
        out
    }

    /// A standalone document holding the root's attributes and a single subtree.
    pub fn element_document(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(root) = self.root.and_then(|r| self.get_node(r)) {
            out.push_str("<svg");
            self.write_namespaces(&mut out);
            for (name, value) in root_attributes(root) {
                let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
            }
            out.push('>');
            self.write_node(id, &mut out, false, false);
            out.push_str("</svg>");
        }
        out
    }

    fn write_namespaces(&self, out: &mut String) {
        let mut has_default = false;
        for (prefix, uri) in &self.namespaces {
            match prefix {
                Some(p) => {
                    let _ = write!(out, " xmlns:{}=\"{}\"", p, escape_attr(uri));
                }
                None => {
                    has_default = true;
                    let _ = write!(out, " xmlns=\"{}\"", escape_attr(uri));
                }
            }
        }
        if !has_default {
            let _ = write!(out, " xmlns=\"{}\"", SVG_NS);
        }
    }

    fn write_node(&self, id: NodeId, out: &mut String, with_styles: bool, is_root: bool) {
        let Some(node) = self.get_node(id) else {
            return;
        };
        let (tag, attributes) = match &node.kind {
            NodeKind::Text(text) => {
                out.push_str(&escape_text(text));
                return;
            }
            NodeKind::Element { tag, attributes } => (tag, attributes),
        };

        out.push('<');
        out.push_str(tag);
        if is_root {
            self.write_namespaces(out);
        }

        let styled = with_styles && !node.style.is_empty();
        let transform_prefix = if styled {
            node.style.transform_list()
        } else {
            None
        };
        let mut wrote_transform = false;
        for (name, value) in attributes {
            if styled {
                if name == "transform" {
                    if let Some(prefix) = &transform_prefix {
                        let _ = write!(out, " transform=\"{} {}\"", prefix, escape_attr(value));
                        wrote_transform = true;
                        continue;
                    }
                }
                if override_for(&node.style, name).is_some() {
                    continue;
                }
            }
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
        if styled {
            if let (Some(prefix), false) = (&transform_prefix, wrote_transform) {
                let _ = write!(out, " transform=\"{}\"", prefix);
            }
            for (property, value) in &node.style.values {
                let name = match property {
                    Property::Opacity => "opacity",
                    Property::Attribute(name) => name.as_str(),
                    _ => continue,
                };
                let _ = write!(out, " {}=\"{}\"", name, render_value(property, value));
            }
        }

        if node.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for &child in &node.children {
            self.write_node(child, out, with_styles, false);
        }
        let _ = write!(out, "</{}>", tag);
    }
}

fn root_attributes(root: &SceneNode) -> impl Iterator<Item = (&str, &str)> {
    let attrs: &[(String, String)] = match &root.kind {
        NodeKind::Element { attributes, .. } => attributes,
        NodeKind::Text(_) => &[],
    };
    attrs
        .iter()
        .filter(|(k, _)| k != "id")
        .map(|(k, v)| (k.as_str(), v.as_str()))
}

fn override_for<'a>(style: &'a NodeStyle, attribute: &str) -> Option<&'a AnimatedValue> {
    style.values.iter().find_map(|(property, value)| {
        let matches = match property {
            Property::Opacity => attribute == "opacity",
            Property::Attribute(name) => name == attribute,
            _ => false,
        };
        matches.then_some(value)
    })
}

fn render_value(property: &Property, value: &AnimatedValue) -> String {
    match (property, value) {
        (Property::Opacity, AnimatedValue::Number(n)) => fmt_num(n.clamp(0.0, 1.0)),
        (_, AnimatedValue::Number(n)) => fmt_num(*n),
        (_, AnimatedValue::Color(c)) => c.to_svg(),
    }
}

fn qualified_name(node: roxmltree::Node<'_, '_>, namespace: Option<&str>, local: &str) -> String {
    match namespace {
        None | Some(SVG_NS) => local.to_string(),
        Some(XML_NS) => format!("xml:{}", local),
        Some(uri) => match node.lookup_prefix(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, local),
            _ => local.to_string(),
        },
    }
}

/// Parses the leading number of a length such as `"12.5px"` or `"90deg"`.
pub fn leading_number(value: &str) -> Option<f64> {
    let value = value.trim();
    let end = value
        .char_indices()
        .find(|&(i, c)| {
            !(c.is_ascii_digit()
                || c == '.'
                || ((c == '-' || c == '+') && i == 0)
                || ((c == 'e' || c == 'E') && i > 0))
        })
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    value[..end].parse::<f64>().ok().or_else(|| {
        // "1e" style prefixes of unit names ("1em") fail above; retry without the exponent.
        let digits: String = value
            .chars()
            .enumerate()
            .take_while(|&(i, c)| c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+')))
            .map(|(_, c)| c)
            .collect();
        digits.parse::<f64>().ok()
    })
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
