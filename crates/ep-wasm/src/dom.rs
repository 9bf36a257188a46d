//! Live DOM
//!
//! [`WebNode`] and [`WebDocument`] implement the runtime's DOM capabilities
//! over `web_sys`. A node is either an element or an open shadow root;
//! selector matching is delegated to the browser's `Element.matches`.

use std::sync::atomic::{AtomicUsize, Ordering};

use ep_runtime::dom::{ComputedStyle, DomError, DomNode, Document, Position, Rect, Selector, SyntheticEvent};
use wasm_bindgen::{JsCast, JsValue};

/// Expando property holding a node's identity key.
const NODE_KEY_PROPERTY: &str = "__echoNodeKey";

const SHADOW_ROOT_TAG: &str = "#shadow-root";

static NEXT_NODE_KEY: AtomicUsize = AtomicUsize::new(1);

/// Message of a thrown JS value.
pub(crate) fn js_error(err: &JsValue) -> String {
    if let Some(text) = err.as_string() {
        return text;
    }
    match err.dyn_ref::<js_sys::Error>() {
        Some(error) => String::from(error.message()),
        None => format!("{err:?}"),
    }
}

/// Build a [`ComputedStyle`] from a property reader.
pub(crate) fn computed_style_from(read: impl Fn(&str) -> String) -> ComputedStyle {
    let opacity = read("opacity");
    let z_index = read("z-index");
    ComputedStyle {
        display_none: read("display").trim() == "none",
        visibility_hidden: read("visibility").trim() == "hidden",
        opacity: opacity.trim().parse().unwrap_or(1.0),
        position: Position::parse(&read("position")),
        z_index: z_index.trim().parse().ok(),
    }
}

// =============================================================================
// Node
// =============================================================================

#[derive(Clone)]
pub struct WebNode(web_sys::Node);

impl std::fmt::Debug for WebNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.element() {
            Some(element) => write!(f, "<{} id=\"{}\">", element.tag_name().to_ascii_lowercase(), element.id()),
            None => f.write_str(SHADOW_ROOT_TAG),
        }
    }
}

impl From<web_sys::Element> for WebNode {
    fn from(element: web_sys::Element) -> Self {
        Self(element.into())
    }
}

impl From<web_sys::ShadowRoot> for WebNode {
    fn from(root: web_sys::ShadowRoot) -> Self {
        Self(root.into())
    }
}

impl WebNode {
    pub fn as_node(&self) -> &web_sys::Node {
        &self.0
    }

    fn element(&self) -> Option<&web_sys::Element> {
        self.0.dyn_ref::<web_sys::Element>()
    }

    fn html(&self) -> Option<&web_sys::HtmlElement> {
        self.0.dyn_ref::<web_sys::HtmlElement>()
    }

    /// Wrap a parent or child, skipping documents and text nodes.
    fn wrap(node: web_sys::Node) -> Option<Self> {
        if node.is_instance_of::<web_sys::Element>() || node.is_instance_of::<web_sys::ShadowRoot>() {
            Some(Self(node))
        } else {
            None
        }
    }

    fn dispatch_mouse(&self, kind: &str) -> Result<(), DomError> {
        let init = web_sys::MouseEventInit::new();
        init.set_bubbles(true);
        init.set_cancelable(true);
        let event = web_sys::MouseEvent::new_with_mouse_event_init_dict(kind, &init)
            .map_err(|e| DomError::Dispatch(js_error(&e)))?;
        self.0
            .dispatch_event(&event)
            .map(|_| ())
            .map_err(|e| DomError::Dispatch(js_error(&e)))
    }

    fn dispatch_pointer_click(&self) -> Result<(), DomError> {
        let init = web_sys::PointerEventInit::new();
        init.set_bubbles(true);
        init.set_cancelable(true);
        let event = web_sys::PointerEvent::new_with_event_init_dict("click", &init)
            .map_err(|e| DomError::Dispatch(js_error(&e)))?;
        self.0
            .dispatch_event(&event)
            .map(|_| ())
            .map_err(|e| DomError::Dispatch(js_error(&e)))
    }
}

impl DomNode for WebNode {
    /// The browser owns node lifetimes; a handle is live while connected.
    type Weak = WebNode;

    fn downgrade(&self) -> WebNode {
        self.clone()
    }

    fn upgrade(weak: &WebNode) -> Option<Self> {
        weak.0.is_connected().then(|| weak.clone())
    }

    fn node_key(&self) -> usize {
        let key = JsValue::from_str(NODE_KEY_PROPERTY);
        if let Some(existing) = js_sys::Reflect::get(&self.0, &key).ok().and_then(|v| v.as_f64()) {
            return existing as usize;
        }
        let next = NEXT_NODE_KEY.fetch_add(1, Ordering::Relaxed);
        if js_sys::Reflect::set(&self.0, &key, &JsValue::from(next as f64)).is_err() {
            log::trace!("Could not tag {self:?} with a node key");
        }
        next
    }

    fn same_node(&self, other: &Self) -> bool {
        self.0.is_same_node(Some(&other.0))
    }

    fn tag_name(&self) -> String {
        match self.element() {
            Some(element) => element.tag_name().to_ascii_lowercase(),
            None => SHADOW_ROOT_TAG.to_string(),
        }
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.element()?.get_attribute(name)
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
        let element = self.element().ok_or_else(|| DomError::Host(format!("{self:?} has no attributes")))?;
        element
            .set_attribute(name, value)
            .map_err(|e| DomError::Host(js_error(&e)))
    }

    fn text_content(&self) -> String {
        self.0.text_content().unwrap_or_default()
    }

    fn set_text_content(&self, text: &str) {
        self.0.set_text_content(Some(text));
    }

    fn children(&self) -> Vec<Self> {
        let nodes = self.0.child_nodes();
        (0..nodes.length())
            .filter_map(|idx| nodes.get(idx))
            .filter(|node| node.is_instance_of::<web_sys::Element>())
            .map(Self)
            .collect()
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent_node().and_then(Self::wrap)
    }

    fn append_child(&self, child: &Self) -> Result<(), DomError> {
        self.0
            .append_child(&child.0)
            .map(|_| ())
            .map_err(|e| DomError::Host(js_error(&e)))
    }

    fn remove(&self) -> Result<(), DomError> {
        let Some(element) = self.element() else {
            return Err(DomError::RemovalRefused(format!("{self:?}")));
        };
        if element.parent_node().is_none() {
            return Err(DomError::Detached);
        }
        element.remove();
        Ok(())
    }

    fn shadow_root(&self) -> Option<Self> {
        self.element()?.shadow_root().map(Self::from)
    }

    fn computed_style(&self) -> ComputedStyle {
        let declaration = self
            .element()
            .zip(web_sys::window())
            .and_then(|(element, window)| window.get_computed_style(element).ok().flatten());
        match declaration {
            Some(style) => computed_style_from(|name| style.get_property_value(name).unwrap_or_default()),
            None => ComputedStyle::default(),
        }
    }

    fn bounding_rect(&self) -> Rect {
        match self.element() {
            Some(element) => {
                let rect = element.get_bounding_client_rect();
                Rect::new(rect.x(), rect.y(), rect.width(), rect.height())
            }
            None => Rect::default(),
        }
    }

    fn style_property(&self, name: &str) -> Option<String> {
        let value = self.html()?.style().get_property_value(name).ok()?;
        (!value.is_empty()).then_some(value)
    }

    fn set_style_property(&self, name: &str, value: &str, important: bool) -> Result<(), DomError> {
        let html = self.html().ok_or_else(|| DomError::Style(format!("{self:?} has no inline style")))?;
        let priority = if important { "important" } else { "" };
        html.style()
            .set_property_with_priority(name, value, priority)
            .map_err(|e| DomError::Style(js_error(&e)))
    }

    fn remove_style_property(&self, name: &str) {
        if let Some(html) = self.html() {
            let _ = html.style().remove_property(name);
        }
    }

    fn dispatch(&self, event: SyntheticEvent) -> Result<(), DomError> {
        let html = self.html().ok_or_else(|| DomError::Dispatch(format!("{self:?} is not an HTML element")))?;
        match event {
            SyntheticEvent::Focus => html.focus().map_err(|e| DomError::Dispatch(js_error(&e))),
            SyntheticEvent::Click => {
                html.click();
                Ok(())
            }
            SyntheticEvent::MouseDown => self.dispatch_mouse("mousedown"),
            SyntheticEvent::MouseUp => self.dispatch_mouse("mouseup"),
            SyntheticEvent::PointerClick => self.dispatch_pointer_click(),
        }
    }

    fn matches(&self, selector: &Selector) -> bool {
        let Some(element) = self.element() else {
            return false;
        };
        match element.matches(selector.as_str()) {
            Ok(matched) => matched,
            Err(err) => {
                log::trace!("Browser rejected '{selector}': {}", js_error(&err));
                false
            }
        }
    }
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Clone)]
pub struct WebDocument {
    window: web_sys::Window,
    document: web_sys::Document,
}

impl WebDocument {
    /// The document of the current global window.
    pub fn current() -> Result<Self, DomError> {
        let window = web_sys::window().ok_or_else(|| DomError::Host("no global window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| DomError::Host("window has no document".into()))?;
        Ok(Self { window, document })
    }
}

impl Document for WebDocument {
    type Node = WebNode;

    fn document_element(&self) -> WebNode {
        match self.document.document_element() {
            Some(root) => root.into(),
            None => WebNode(self.document.clone().into()),
        }
    }

    fn head(&self) -> Option<WebNode> {
        self.document.head().map(|head| WebNode(head.into()))
    }

    fn body(&self) -> Option<WebNode> {
        self.document.body().map(|body| WebNode(body.into()))
    }

    fn create_element(&self, tag: &str) -> Result<WebNode, DomError> {
        self.document
            .create_element(tag)
            .map(WebNode::from)
            .map_err(|e| DomError::Host(js_error(&e)))
    }

    fn viewport(&self) -> (f64, f64) {
        let read = |value: Result<JsValue, JsValue>| value.ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        (read(self.window.inner_width()), read(self.window.inner_height()))
    }

    fn url(&self) -> String {
        self.document.url().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_computed_style_from_declarations() {
        let values: HashMap<&str, &str> = [
            ("display", "block"),
            ("visibility", "visible"),
            ("opacity", "0.5"),
            ("position", "fixed"),
            ("z-index", "2147483647"),
        ]
        .into_iter()
        .collect();
        let style = computed_style_from(|name| values.get(name).copied().unwrap_or_default().to_string());

        assert!(!style.display_none);
        assert!(!style.visibility_hidden);
        assert_eq!(style.opacity, 0.5);
        assert_eq!(style.position, Position::Fixed);
        assert_eq!(style.z_index, Some(2_147_483_647));
    }

    #[test]
    fn test_computed_style_defaults_for_auto_and_missing() {
        let style = computed_style_from(|name| match name {
            "display" => "none".to_string(),
            "z-index" => "auto".to_string(),
            _ => String::new(),
        });

        assert!(style.display_none);
        assert_eq!(style.opacity, 1.0);
        assert_eq!(style.position, Position::Static);
        assert_eq!(style.z_index, None);
    }
}
