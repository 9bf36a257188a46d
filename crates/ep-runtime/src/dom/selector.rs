//! CSS selectors
//!
//! Catalog entries are parsed by the `selectors` crate, the matching engine
//! behind Servo's style system, with [`EchoSelectors`] as the parser
//! implementation. Any DOM that implements [`selectors::Element`] is matched
//! by [`Selector::matches_element`]; a browser DOM can hand
//! [`Selector::as_str`] to its native matcher instead.
//!
//! Pseudo-classes other than the tree-structural ones and pseudo-elements are
//! rejected at parse time, so a catalog never carries a selector that would
//! silently match nothing.

use std::fmt;

use cssparser::ToCss;
use ep_core::fingerprint::murmur3_32;
use precomputed_hash::PrecomputedHash;
use selectors::matching::{
    self, IgnoreNthChildForInvalidation, MatchingContext, MatchingMode, NeedsSelectorFlags, QuirksMode,
};
use selectors::parser::{self, ParseRelative, SelectorList, SelectorParseErrorKind};
use selectors::NthIndexCache;

use super::{descendants, DomNode};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("invalid selector '{selector}': {reason}")]
    Invalid { selector: String, reason: String },
}

// =============================================================================
// Parser Implementation
// =============================================================================

/// Selector dialect: HTML documents, no namespaces, no state pseudo-classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoSelectors;

/// Attribute values as written in a selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CssString(String);

impl From<&str> for CssString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for CssString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToCss for CssString {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        cssparser::serialize_string(&self.0, dest)
    }
}

/// Tag names, ids, classes, attribute names and namespace URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CssIdent(String);

impl From<&str> for CssIdent {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for CssIdent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToCss for CssIdent {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        cssparser::serialize_identifier(&self.0, dest)
    }
}

impl PrecomputedHash for CssIdent {
    fn precomputed_hash(&self) -> u32 {
        murmur3_32(self.0.as_bytes(), 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoClass {}

impl parser::NonTSPseudoClass for PseudoClass {
    type Impl = EchoSelectors;

    fn is_active_or_hover(&self) -> bool {
        match *self {}
    }

    fn is_user_action_state(&self) -> bool {
        match *self {}
    }
}

impl ToCss for PseudoClass {
    fn to_css<W: fmt::Write>(&self, _dest: &mut W) -> fmt::Result {
        match *self {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoElement {}

impl parser::PseudoElement for PseudoElement {
    type Impl = EchoSelectors;
}

impl ToCss for PseudoElement {
    fn to_css<W: fmt::Write>(&self, _dest: &mut W) -> fmt::Result {
        match *self {}
    }
}

impl parser::SelectorImpl for EchoSelectors {
    type ExtraMatchingData<'a> = ();
    type AttrValue = CssString;
    type Identifier = CssIdent;
    type LocalName = CssIdent;
    type NamespaceUrl = CssIdent;
    type NamespacePrefix = CssIdent;
    type BorrowedNamespaceUrl = CssIdent;
    type BorrowedLocalName = CssIdent;
    type NonTSPseudoClass = PseudoClass;
    type PseudoElement = PseudoElement;
}

struct CatalogParser;

impl<'i> parser::Parser<'i> for CatalogParser {
    type Impl = EchoSelectors;
    type Error = SelectorParseErrorKind<'i>;
}

// =============================================================================
// Selector
// =============================================================================

/// A parsed selector list.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    list: SelectorList<EchoSelectors>,
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(SelectorError::Empty);
        }

        let mut input = cssparser::ParserInput::new(source);
        let mut css = cssparser::Parser::new(&mut input);
        let list = SelectorList::parse(&CatalogParser, &mut css, ParseRelative::No).map_err(|err| {
            SelectorError::Invalid {
                selector: source.to_string(),
                reason: format!("{:?} at column {}", err.kind, err.location.column),
            }
        })?;

        Ok(Self {
            source: source.to_string(),
            list,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match against an element the `selectors` engine can walk.
    pub fn matches_element<E>(&self, element: &E) -> bool
    where
        E: selectors::Element<Impl = EchoSelectors>,
    {
        let mut nth_index_cache = NthIndexCache::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut nth_index_cache,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            IgnoreNthChildForInvalidation::No,
        );
        matching::matches_selector_list(&self.list, element, &mut context)
    }

    pub fn matches<N: DomNode>(&self, node: &N) -> bool {
        node.matches(self)
    }
}

/// Light-tree descendants of `root` matching `selector`, in document order.
///
/// Like `querySelectorAll`, the search does not enter shadow roots.
pub fn query_all<N: DomNode>(root: &N, selector: &Selector) -> Vec<N> {
    descendants(root)
        .into_iter()
        .filter(|n| n.matches(selector))
        .collect()
}

pub fn query_first<N: DomNode>(root: &N, selector: &Selector) -> Option<N> {
    descendants(root).into_iter().find(|n| n.matches(selector))
}

/// Parse a static catalog, skipping entries this engine cannot evaluate.
pub fn parse_catalog(entries: &[&str]) -> Vec<Selector> {
    entries
        .iter()
        .filter_map(|entry| match Selector::parse(entry) {
            Ok(selector) => Some(selector),
            Err(err) => {
                log::warn!("Skipping selector '{entry}': {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryDocument, MemoryNode};
    use crate::dom::Document;

    fn matches(selector: &str, node: &MemoryNode) -> bool {
        Selector::parse(selector).unwrap().matches(node)
    }

    #[test]
    fn test_compound_parts() {
        let doc = MemoryDocument::new();
        let node = doc
            .element("ins")
            .id("slot-1")
            .class("adsbygoogle wide")
            .attr("data-ad-client", "ca-pub-1")
            .build();

        assert!(matches("ins.adsbygoogle", &node));
        assert!(matches(".wide.adsbygoogle", &node));
        assert!(matches("#slot-1", &node));
        assert!(matches("[data-ad-client]", &node));
        assert!(matches("*[data-ad-client^=\"ca-pub\"]", &node));
        assert!(matches("INS", &node));
        assert!(!matches("div.adsbygoogle", &node));
        assert!(!matches(".ads", &node));
        assert!(!matches(".ADSBYGOOGLE", &node));
    }

    #[test]
    fn test_attribute_operators() {
        let doc = MemoryDocument::new();
        let node = doc
            .element("iframe")
            .attr("src", "https://ad.doubleclick.net/x")
            .attr("aria-label", "Cookie Consent")
            .attr("class", "a b")
            .build();

        assert!(matches("iframe[src*=\"doubleclick\"]", &node));
        assert!(matches("[src^='https://ad.']", &node));
        assert!(matches("[src$=\"/x\"]", &node));
        assert!(matches("[class~=b]", &node));
        assert!(matches("[aria-label*=\"cookie\" i]", &node));
        assert!(!matches("[aria-label*=\"cookie\"]", &node));
        assert!(!matches("[src*=\"\"]", &node));
    }

    #[test]
    fn test_selector_lists() {
        let doc = MemoryDocument::new();
        let node = doc.element("section").attr("role", "dialog").build();
        assert!(matches("div, section, aside", &node));
        assert!(matches("div, [role=\"dialog\"]", &node));
    }

    #[test]
    fn test_combinators_and_structural_pseudo_classes() {
        let doc = MemoryDocument::new();
        let wrapper = doc.element("div").class("ad-wrapper").append_to(&doc.body_node());
        let label = doc.element("span").class("label").append_to(&wrapper);
        let frame = doc.element("iframe").append_to(&wrapper);

        assert!(matches(".ad-wrapper > iframe", &frame));
        assert!(matches("body .ad-wrapper iframe", &frame));
        assert!(matches(".label + iframe", &frame));
        assert!(matches(".label ~ iframe", &frame));
        assert!(matches("iframe:last-child", &frame));
        assert!(matches("span:first-child", &label));
        assert!(matches("div:not(.content) > span", &label));
        assert!(matches(":root", &doc.document_element()));
        assert!(!matches("section > iframe", &frame));
        assert!(!matches("iframe + .label", &label));
    }

    #[test]
    fn test_shadow_root_is_not_an_ancestor_element() {
        let doc = MemoryDocument::new();
        let host = doc.element("div").class("host").append_to(&doc.body_node());
        let shadow = host.attach_shadow();
        let inner = doc.element("div").class("ad").append_to(&shadow);

        assert!(matches(".ad", &inner));
        assert!(!matches(".host .ad", &inner));
        assert!(!matches("* > .ad", &inner));
    }

    #[test]
    fn test_rejects_unsupported_syntax() {
        assert_eq!(Selector::parse("  "), Err(SelectorError::Empty));
        for source in ["a:hover", "p::before", "div:has-text(Ad)", "div >", ".", "{}"] {
            assert!(
                matches!(Selector::parse(source), Err(SelectorError::Invalid { .. })),
                "{source}"
            );
        }
    }

    #[test]
    fn test_query_skips_shadow_content() {
        let doc = MemoryDocument::new();
        let host = doc.element("div").append_to(&doc.body_node());
        let shadow = host.attach_shadow();
        doc.element("div").class("ad").append_to(&shadow);
        doc.element("div").class("ad").append_to(&host);

        let selector = Selector::parse(".ad").unwrap();
        assert_eq!(query_all(&doc.body_node(), &selector).len(), 1);
        assert_eq!(query_all(&shadow, &selector).len(), 1);
        assert!(query_first(&shadow, &selector).is_some());
    }

    #[test]
    fn test_parse_catalog_skips_bad_entries() {
        let catalog = parse_catalog(&[".ad", "div:hover", "#x"]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[1].as_str(), "#x");
        assert_eq!(catalog[1].to_string(), "#x");
    }
}
