//! DOM capabilities
//!
//! The runtime never talks to a browser API directly. Everything it needs
//! from a page is expressed by [`DomNode`] and [`Document`]; the extension
//! glue implements them over the live DOM and tests use [`memory`].
//!
//! Shadow DOM is a recursive capability: a node may expose zero or one nested
//! root through [`DomNode::shadow_root`], and scans recurse into it.

pub mod memory;
pub mod selector;

use std::fmt;

pub use selector::{query_all, query_first, Selector, SelectorError};

// =============================================================================
// Layout and Style
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub const fn sized(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
}

impl Position {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "relative" => Self::Relative,
            "absolute" => Self::Absolute,
            "fixed" => Self::Fixed,
            "sticky" => Self::Sticky,
            _ => Self::Static,
        }
    }

    /// Taken out of normal flow and free to cover other content.
    pub fn is_out_of_flow(self) -> bool {
        matches!(self, Self::Absolute | Self::Fixed)
    }
}

/// The subset of computed style the runtime reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f64,
    pub position: Position,
    /// `None` for `auto`
    pub z_index: Option<i64>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display_none: false,
            visibility_hidden: false,
            opacity: 1.0,
            position: Position::Static,
            z_index: None,
        }
    }
}

/// Events dispatched when activating a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntheticEvent {
    Focus,
    Click,
    MouseDown,
    MouseUp,
    PointerClick,
}

impl SyntheticEvent {
    /// Sequence used to activate a control so that listeners bound to any
    /// of the common event types fire.
    pub const ACTIVATION: [SyntheticEvent; 6] = [
        SyntheticEvent::Focus,
        SyntheticEvent::Click,
        SyntheticEvent::MouseDown,
        SyntheticEvent::MouseUp,
        SyntheticEvent::Click,
        SyntheticEvent::PointerClick,
    ];

    /// Whether the event counts as an activation of the target.
    pub fn activates(self) -> bool {
        matches!(self, Self::Click | Self::PointerClick)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("node is not attached to a document")]
    Detached,
    #[error("removal refused: {0}")]
    RemovalRefused(String),
    #[error("style update rejected: {0}")]
    Style(String),
    #[error("event dispatch failed: {0}")]
    Dispatch(String),
    #[error("host DOM error: {0}")]
    Host(String),
}

// =============================================================================
// Capabilities
// =============================================================================

/// An element handle.
///
/// Handles are cheap to clone and compare by identity. `Weak` handles do not
/// keep a node alive.
pub trait DomNode: Clone + fmt::Debug {
    type Weak: Clone + fmt::Debug;

    fn downgrade(&self) -> Self::Weak;
    fn upgrade(weak: &Self::Weak) -> Option<Self>;

    /// Identity key, stable while the node is alive.
    fn node_key(&self) -> usize;

    fn same_node(&self, other: &Self) -> bool {
        self.node_key() == other.node_key()
    }

    /// Lowercase tag name.
    fn tag_name(&self) -> String;
    fn attribute(&self, name: &str) -> Option<String>;
    fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError>;

    fn text_content(&self) -> String;
    fn set_text_content(&self, text: &str);

    /// Element children in document order, light tree only.
    fn children(&self) -> Vec<Self>;
    fn parent(&self) -> Option<Self>;
    fn append_child(&self, child: &Self) -> Result<(), DomError>;
    fn remove(&self) -> Result<(), DomError>;

    /// The nested root a scan may recurse into.
    fn shadow_root(&self) -> Option<Self>;

    fn computed_style(&self) -> ComputedStyle;
    fn bounding_rect(&self) -> Rect;
    fn style_property(&self, name: &str) -> Option<String>;
    fn set_style_property(&self, name: &str, value: &str, important: bool) -> Result<(), DomError>;
    fn remove_style_property(&self, name: &str);

    fn dispatch(&self, event: SyntheticEvent) -> Result<(), DomError>;

    /// Whether this element matches `selector`.
    fn matches(&self, selector: &Selector) -> bool;

    fn id(&self) -> String {
        self.attribute("id").unwrap_or_default()
    }

    fn class_name(&self) -> String {
        self.attribute("class").unwrap_or_default()
    }

    /// Whether `other` is this node or one of its light-tree descendants.
    fn contains(&self, other: &Self) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.same_node(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }
}

/// A page's document.
pub trait Document {
    type Node: DomNode;

    fn document_element(&self) -> Self::Node;
    fn head(&self) -> Option<Self::Node>;
    fn body(&self) -> Option<Self::Node>;
    fn create_element(&self, tag: &str) -> Result<Self::Node, DomError>;
    /// Viewport width and height in CSS pixels.
    fn viewport(&self) -> (f64, f64);
    fn url(&self) -> String;

    fn get_element_by_id(&self, id: &str) -> Option<Self::Node> {
        find_by_id(&self.document_element(), id)
    }
}

/// Rendered with a non-empty box and not hidden by style.
pub fn is_visible<N: DomNode>(node: &N) -> bool {
    let style = node.computed_style();
    !style.display_none
        && !style.visibility_hidden
        && style.opacity > 0.0
        && !node.bounding_rect().is_empty()
}

/// Light-tree descendants of `root`, in document order.
pub fn descendants<N: DomNode>(root: &N) -> Vec<N> {
    let mut out = Vec::new();
    let mut stack: Vec<N> = root.children().into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        stack.extend(node.children().into_iter().rev());
        out.push(node);
    }
    out
}

/// First light-tree node (including `root`) with the given id.
pub fn find_by_id<N: DomNode>(root: &N, id: &str) -> Option<N> {
    if root.id() == id {
        return Some(root.clone());
    }
    descendants(root).into_iter().find(|n| n.id() == id)
}

/// CSS-hide a node, the fallback when it cannot be removed.
pub fn force_hide<N: DomNode>(node: &N) -> Result<(), DomError> {
    node.set_style_property("display", "none", true)?;
    node.set_style_property("visibility", "hidden", true)
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryDocument;
    use super::*;

    #[test]
    fn test_visibility() {
        let doc = MemoryDocument::new();
        let shown = doc.element("div").rect(Rect::sized(10.0, 10.0)).append_to(&doc.body_node());
        let empty = doc.element("div").rect(Rect::default()).append_to(&doc.body_node());
        let faded = doc
            .element("div")
            .rect(Rect::sized(10.0, 10.0))
            .style("opacity", "0")
            .append_to(&doc.body_node());

        assert!(is_visible(&shown));
        assert!(!is_visible(&empty));
        assert!(!is_visible(&faded));

        force_hide(&shown).unwrap();
        assert!(!is_visible(&shown));
    }

    #[test]
    fn test_contains_and_descendants() {
        let doc = MemoryDocument::new();
        let outer = doc.element("section").append_to(&doc.body_node());
        let inner = doc.element("p").id("x").append_to(&outer);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert_eq!(descendants(&outer).len(), 1);
        assert!(doc.get_element_by_id("x").unwrap().same_node(&inner));
    }
}
