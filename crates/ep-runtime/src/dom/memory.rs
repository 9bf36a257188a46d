//! In-memory DOM
//!
//! A small reference-counted element tree implementing [`DomNode`] and
//! [`Document`]. Layout is not computed: every element carries an explicit
//! rect, reported as empty while the element is detached or rendered inside
//! a `display: none` ancestor.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::matching::{ElementSelectorFlags, MatchingContext};
use selectors::OpaqueElement;

use super::selector::{CssIdent, CssString, EchoSelectors, PseudoClass, PseudoElement};
use super::{ComputedStyle, DomError, DomNode, Document, Position, Rect, Selector, SyntheticEvent};

const SHADOW_ROOT_TAG: &str = "#shadow-root";

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Rect given to built elements unless overridden.
pub const DEFAULT_RECT: Rect = Rect::sized(100.0, 20.0);

pub const DEFAULT_VIEWPORT: (f64, f64) = (1280.0, 800.0);

/// Side effect run when an element is activated.
#[derive(Debug, Clone)]
pub enum ClickAction {
    /// Set `display: none` on the target
    Hide(MemoryNode),
    /// Clear `display` on the target
    Reveal(MemoryNode),
    /// Detach the target
    Remove(MemoryNode),
}

#[derive(Debug, Clone, Copy)]
enum ActionKind {
    Hide,
    Reveal,
    Remove,
}

type Link = Weak<RefCell<NodeData>>;

#[derive(Debug)]
struct StyleDecl {
    name: String,
    value: String,
    important: bool,
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    attrs: Vec<(String, String)>,
    style: Vec<StyleDecl>,
    text: String,
    children: Vec<MemoryNode>,
    parent: Link,
    host: Link,
    shadow: Option<MemoryNode>,
    rect: Rect,
    is_root: bool,
    refuse_removal: bool,
    actions: Vec<(ActionKind, Link)>,
    events: Vec<SyntheticEvent>,
}

impl NodeData {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            style: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            parent: Weak::new(),
            host: Weak::new(),
            shadow: None,
            rect: DEFAULT_RECT,
            is_root: false,
            refuse_removal: false,
            actions: Vec::new(),
            events: Vec::new(),
        }
    }

    fn style_value(&self, name: &str) -> Option<&str> {
        self.style
            .iter()
            .find(|decl| decl.name == name)
            .map(|decl| decl.value.as_str())
    }

    fn set_style(&mut self, name: &str, value: &str, important: bool) {
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_string();
        match self.style.iter_mut().find(|decl| decl.name == name) {
            Some(decl) => {
                decl.value = value;
                decl.important = important;
            }
            None => self.style.push(StyleDecl {
                name,
                value,
                important,
            }),
        }
    }

    fn style_text(&self) -> String {
        self.style
            .iter()
            .map(|decl| {
                if decl.important {
                    format!("{}: {} !important", decl.name, decl.value)
                } else {
                    format!("{}: {}", decl.name, decl.value)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn parse_style_text(&mut self, text: &str) {
        self.style.clear();
        for decl in text.split(';') {
            let Some((name, value)) = decl.split_once(':') else {
                continue;
            };
            let value = value.trim();
            let (value, important) = match value.strip_suffix("!important") {
                Some(v) => (v.trim(), true),
                None => (value, false),
            };
            self.set_style(name, value, important);
        }
    }
}

// =============================================================================
// Node
// =============================================================================

#[derive(Clone)]
pub struct MemoryNode(Rc<RefCell<NodeData>>);

#[derive(Debug, Clone)]
pub struct WeakNode(Link);

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        write!(f, "<{}", data.tag)?;
        for (name, value) in data.attrs.iter().filter(|(n, _)| n == "id" || n == "class") {
            write!(f, " {name}=\"{value}\"")?;
        }
        write!(f, ">")
    }
}

impl PartialEq for MemoryNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl MemoryNode {
    fn from_data(data: NodeData) -> Self {
        Self(Rc::new(RefCell::new(data)))
    }

    fn from_link(link: &Link) -> Option<Self> {
        link.upgrade().map(Self)
    }

    /// Create and attach an empty shadow root, replacing any previous one.
    pub fn attach_shadow(&self) -> MemoryNode {
        let mut data = NodeData::new(SHADOW_ROOT_TAG);
        data.host = Rc::downgrade(&self.0);
        let root = Self::from_data(data);
        self.0.borrow_mut().shadow = Some(root.clone());
        root
    }

    pub fn set_rect(&self, rect: Rect) {
        self.0.borrow_mut().rect = rect;
    }

    pub fn refuse_removal(&self, refuse: bool) {
        self.0.borrow_mut().refuse_removal = refuse;
    }

    pub fn on_click(&self, action: ClickAction) {
        let (kind, target) = match action {
            ClickAction::Hide(n) => (ActionKind::Hide, n),
            ClickAction::Reveal(n) => (ActionKind::Reveal, n),
            ClickAction::Remove(n) => (ActionKind::Remove, n),
        };
        self.0
            .borrow_mut()
            .actions
            .push((kind, Rc::downgrade(&target.0)));
    }

    /// Events dispatched on this node so far.
    pub fn events(&self) -> Vec<SyntheticEvent> {
        self.0.borrow().events.clone()
    }

    pub fn was_clicked(&self) -> bool {
        self.0.borrow().events.iter().any(|e| e.activates())
    }

    /// Attached to a document, possibly through shadow hosts.
    pub fn is_connected(&self) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let data = node.0.borrow();
            if data.is_root {
                return true;
            }
            current = Self::from_link(&data.parent).or_else(|| Self::from_link(&data.host));
        }
        false
    }

    fn rendered(&self) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let data = node.0.borrow();
            if data.style_value("display") == Some("none") {
                return false;
            }
            current = Self::from_link(&data.parent).or_else(|| Self::from_link(&data.host));
        }
        true
    }

    fn is_shadow_root(&self) -> bool {
        self.0.borrow().tag == SHADOW_ROOT_TAG
    }

    /// Element siblings before (`-1`) or after (`1`) this node.
    fn sibling(&self, step: isize) -> Option<Self> {
        let parent = self.parent()?;
        let data = parent.0.borrow();
        let index = data.children.iter().position(|c| c == self)?;
        let index = index.checked_add_signed(step)?;
        data.children.get(index).cloned()
    }

    fn run_action(kind: ActionKind, target: &MemoryNode) {
        let outcome = match kind {
            ActionKind::Hide => target.set_style_property("display", "none", false),
            ActionKind::Reveal => {
                target.remove_style_property("display");
                Ok(())
            }
            ActionKind::Remove => target.remove(),
        };
        if let Err(err) = outcome {
            log::trace!("Click action on {target:?} had no effect: {err}");
        }
    }
}

impl DomNode for MemoryNode {
    type Weak = WeakNode;

    fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    fn upgrade(weak: &WeakNode) -> Option<Self> {
        Self::from_link(&weak.0)
    }

    fn node_key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    fn tag_name(&self) -> String {
        self.0.borrow().tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        let data = self.0.borrow();
        if name.eq_ignore_ascii_case("style") {
            return (!data.style.is_empty()).then(|| data.style_text());
        }
        data.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
        let mut data = self.0.borrow_mut();
        let name = name.to_ascii_lowercase();
        if name == "style" {
            data.parse_style_text(value);
            return Ok(());
        }
        match data.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => data.attrs.push((name, value.to_string())),
        }
        Ok(())
    }

    fn text_content(&self) -> String {
        let data = self.0.borrow();
        let mut text = data.text.clone();
        for child in &data.children {
            text.push_str(&child.text_content());
        }
        text
    }

    fn set_text_content(&self, text: &str) {
        let mut data = self.0.borrow_mut();
        for child in data.children.drain(..) {
            child.0.borrow_mut().parent = Weak::new();
        }
        data.text = text.to_string();
    }

    fn children(&self) -> Vec<Self> {
        self.0.borrow().children.clone()
    }

    fn parent(&self) -> Option<Self> {
        Self::from_link(&self.0.borrow().parent)
    }

    fn append_child(&self, child: &Self) -> Result<(), DomError> {
        if child.contains(self) {
            return Err(DomError::Dispatch("cannot append an ancestor".into()));
        }
        if let Some(old) = child.parent() {
            old.0.borrow_mut().children.retain(|c| c != child);
        }
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), DomError> {
        if self.0.borrow().refuse_removal {
            return Err(DomError::RemovalRefused(format!("{self:?}")));
        }
        let parent = self.parent().ok_or(DomError::Detached)?;
        parent.0.borrow_mut().children.retain(|c| c != self);
        self.0.borrow_mut().parent = Weak::new();
        Ok(())
    }

    fn shadow_root(&self) -> Option<Self> {
        self.0.borrow().shadow.clone()
    }

    fn computed_style(&self) -> ComputedStyle {
        let data = self.0.borrow();
        ComputedStyle {
            display_none: data.style_value("display") == Some("none"),
            visibility_hidden: data.style_value("visibility") == Some("hidden"),
            opacity: data
                .style_value("opacity")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            position: data.style_value("position").map(Position::parse).unwrap_or_default(),
            z_index: data.style_value("z-index").and_then(|v| v.parse().ok()),
        }
    }

    fn bounding_rect(&self) -> Rect {
        if self.is_connected() && self.rendered() {
            self.0.borrow().rect
        } else {
            Rect::default()
        }
    }

    fn style_property(&self, name: &str) -> Option<String> {
        self.0.borrow().style_value(name).map(str::to_string)
    }

    fn set_style_property(&self, name: &str, value: &str, important: bool) -> Result<(), DomError> {
        self.0.borrow_mut().set_style(name, value, important);
        Ok(())
    }

    fn remove_style_property(&self, name: &str) {
        self.0.borrow_mut().style.retain(|decl| decl.name != name);
    }

    fn dispatch(&self, event: SyntheticEvent) -> Result<(), DomError> {
        let actions = {
            let mut data = self.0.borrow_mut();
            data.events.push(event);
            if !event.activates() {
                return Ok(());
            }
            data.actions.clone()
        };
        for (kind, link) in actions {
            if let Some(target) = Self::from_link(&link) {
                Self::run_action(kind, &target);
            }
        }
        Ok(())
    }

    fn matches(&self, selector: &Selector) -> bool {
        selector.matches_element(self)
    }
}

impl selectors::Element for MemoryNode {
    type Impl = EchoSelectors;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(&*self.0)
    }

    fn parent_element(&self) -> Option<Self> {
        self.parent().filter(|p| !p.is_shadow_root())
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        self.parent().is_some_and(|p| p.is_shadow_root())
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        let mut current = self.parent();
        while let Some(node) = current {
            if node.is_shadow_root() {
                return Self::from_link(&node.0.borrow().host);
            }
            current = node.parent();
        }
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.sibling(-1)
    }

    fn next_sibling_element(&self) -> Option<Self> {
        self.sibling(1)
    }

    fn first_element_child(&self) -> Option<Self> {
        self.0.borrow().children.first().cloned()
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, name: &CssIdent) -> bool {
        self.0.borrow().tag == name.as_ref()
    }

    fn has_namespace(&self, ns: &CssIdent) -> bool {
        ns.as_ref() == HTML_NAMESPACE
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.0.borrow().tag == other.0.borrow().tag
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&CssIdent>,
        local_name: &CssIdent,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        if let NamespaceConstraint::Specific(url) = ns {
            if !url.as_ref().is_empty() {
                return false;
            }
        }
        self.attribute(local_name.as_ref())
            .is_some_and(|value| operation.eval_str(&value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        pc: &PseudoClass,
        _context: &mut MatchingContext<'_, EchoSelectors>,
    ) -> bool {
        match *pc {}
    }

    fn match_pseudo_element(
        &self,
        pe: &PseudoElement,
        _context: &mut MatchingContext<'_, EchoSelectors>,
    ) -> bool {
        match *pe {}
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        let data = self.0.borrow();
        matches!(data.tag.as_str(), "a" | "area" | "link")
            && data.attrs.iter().any(|(name, _)| name == "href")
    }

    fn is_html_slot_element(&self) -> bool {
        self.0.borrow().tag == "slot"
    }

    fn has_id(&self, id: &CssIdent, case_sensitivity: CaseSensitivity) -> bool {
        self.attribute("id")
            .is_some_and(|own| case_sensitivity.eq(own.as_bytes(), id.as_ref().as_bytes()))
    }

    fn has_class(&self, name: &CssIdent, case_sensitivity: CaseSensitivity) -> bool {
        self.class_name()
            .split_ascii_whitespace()
            .any(|class| case_sensitivity.eq(class.as_bytes(), name.as_ref().as_bytes()))
    }

    fn imported_part(&self, _name: &CssIdent) -> Option<CssIdent> {
        None
    }

    fn is_part(&self, _name: &CssIdent) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        let data = self.0.borrow();
        data.children.is_empty() && data.text.is_empty()
    }

    fn is_root(&self) -> bool {
        self.0.borrow().is_root
    }
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Clone)]
pub struct MemoryDocument {
    root: MemoryNode,
    head: MemoryNode,
    body: MemoryNode,
    viewport: (f64, f64),
    url: Rc<RefCell<String>>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::with_viewport(DEFAULT_VIEWPORT)
    }

    pub fn with_viewport(viewport: (f64, f64)) -> Self {
        let mut root = NodeData::new("html");
        root.is_root = true;
        root.rect = Rect::sized(viewport.0, viewport.1);
        let root = MemoryNode::from_data(root);
        let head = MemoryNode::from_data(NodeData::new("head"));
        let body = MemoryNode::from_data(NodeData::new("body"));
        body.set_rect(Rect::sized(viewport.0, viewport.1));

        let doc = Self {
            root,
            head,
            body,
            viewport,
            url: Rc::new(RefCell::new("https://example.com/".into())),
        };
        // Fresh nodes, so appends cannot fail.
        let _ = doc.root.append_child(&doc.head);
        let _ = doc.root.append_child(&doc.body);
        doc
    }

    pub fn body_node(&self) -> MemoryNode {
        self.body.clone()
    }

    pub fn head_node(&self) -> MemoryNode {
        self.head.clone()
    }

    pub fn set_url(&self, url: &str) {
        *self.url.borrow_mut() = url.to_string();
    }

    /// Start building a detached element.
    pub fn element(&self, tag: &str) -> ElementBuilder {
        ElementBuilder {
            node: MemoryNode::from_data(NodeData::new(tag)),
        }
    }
}

impl Document for MemoryDocument {
    type Node = MemoryNode;

    fn document_element(&self) -> MemoryNode {
        self.root.clone()
    }

    fn head(&self) -> Option<MemoryNode> {
        Some(self.head.clone())
    }

    fn body(&self) -> Option<MemoryNode> {
        Some(self.body.clone())
    }

    fn create_element(&self, tag: &str) -> Result<MemoryNode, DomError> {
        Ok(MemoryNode::from_data(NodeData::new(tag)))
    }

    fn viewport(&self) -> (f64, f64) {
        self.viewport
    }

    fn url(&self) -> String {
        self.url.borrow().clone()
    }
}

/// Fluent construction of test fixtures.
pub struct ElementBuilder {
    node: MemoryNode,
}

impl ElementBuilder {
    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn attr(self, name: &str, value: &str) -> Self {
        // Memory nodes accept every attribute.
        let _ = self.node.set_attribute(name, value);
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.node.0.borrow_mut().text = text.to_string();
        self
    }

    pub fn style(self, name: &str, value: &str) -> Self {
        self.node.0.borrow_mut().set_style(name, value, false);
        self
    }

    pub fn rect(self, rect: Rect) -> Self {
        self.node.set_rect(rect);
        self
    }

    pub fn on_click(self, action: ClickAction) -> Self {
        self.node.on_click(action);
        self
    }

    pub fn refuse_removal(self) -> Self {
        self.node.refuse_removal(true);
        self
    }

    pub fn build(self) -> MemoryNode {
        self.node
    }

    pub fn append_to(self, parent: &MemoryNode) -> MemoryNode {
        let _ = parent.append_child(&self.node);
        self.node
    }
}
