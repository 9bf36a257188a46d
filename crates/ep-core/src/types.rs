//! Core type definitions for Echo Privacy
//!
//! These types describe compiled rules independently of how they are
//! persisted. See `artifact` for the wire shape consumed by the browser's
//! declarative request matcher.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

// =============================================================================
// Dispositions
// =============================================================================

/// What a network rule does with a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Block rule - cancels the request
    Block,
    /// Exception rule (@@...) - allows the request
    Allow,
}

impl Disposition {
    /// Priority emitted for rules of this disposition.
    ///
    /// Exceptions always sit strictly above blocks so that they win
    /// regardless of pattern specificity.
    #[inline]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Block => BLOCK_PRIORITY,
            Self::Allow => ALLOW_PRIORITY,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Allow => "allow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "block" => Some(Self::Block),
            "allow" => Some(Self::Allow),
            _ => None,
        }
    }
}

pub const BLOCK_PRIORITY: u8 = 1;
pub const ALLOW_PRIORITY: u8 = 2;

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u16 {
        const MAIN_FRAME = 1 << 0;
        const SUB_FRAME = 1 << 1;   // iframe/frame
        const STYLESHEET = 1 << 2;
        const SCRIPT = 1 << 3;
        const IMAGE = 1 << 4;
        const FONT = 1 << 5;
        const OBJECT = 1 << 6;
        const XMLHTTPREQUEST = 1 << 7;
        const PING = 1 << 8;
        const MEDIA = 1 << 9;
        const WEBSOCKET = 1 << 10;
        const OTHER = 1 << 11;

        /// Types a rule covers when the filter names none.
        const DEFAULT = Self::SCRIPT.bits()
            | Self::IMAGE.bits()
            | Self::STYLESHEET.bits()
            | Self::XMLHTTPREQUEST.bits()
            | Self::SUB_FRAME.bits()
            | Self::MEDIA.bits()
            | Self::FONT.bits()
            | Self::PING.bits()
            | Self::OTHER.bits();
    }
}

/// Declarative-matcher names, in emission order.
const RESOURCE_TYPE_NAMES: &[(ResourceType, &str)] = &[
    (ResourceType::MAIN_FRAME, "main_frame"),
    (ResourceType::SUB_FRAME, "sub_frame"),
    (ResourceType::STYLESHEET, "stylesheet"),
    (ResourceType::SCRIPT, "script"),
    (ResourceType::IMAGE, "image"),
    (ResourceType::FONT, "font"),
    (ResourceType::OBJECT, "object"),
    (ResourceType::XMLHTTPREQUEST, "xmlhttprequest"),
    (ResourceType::PING, "ping"),
    (ResourceType::MEDIA, "media"),
    (ResourceType::WEBSOCKET, "websocket"),
    (ResourceType::OTHER, "other"),
];

impl ResourceType {
    /// Parse a declarative-matcher resource type name.
    pub fn from_name(name: &str) -> Option<Self> {
        RESOURCE_TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(ty, _)| *ty)
    }

    /// Names of every type in this mask, in a stable order.
    pub fn names(self) -> Vec<&'static str> {
        RESOURCE_TYPE_NAMES
            .iter()
            .filter(|(ty, _)| self.contains(*ty))
            .map(|(_, n)| *n)
            .collect()
    }
}

// =============================================================================
// Scopes
// =============================================================================

/// Which requests a rule applies to relative to the initiating page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PartyScope {
    #[default]
    Any,
    ThirdParty,
    FirstParty,
}

impl PartyScope {
    /// The `domainType` value of the declarative matcher, if any.
    pub const fn domain_type(self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::ThirdParty => Some("thirdParty"),
            Self::FirstParty => Some("firstParty"),
        }
    }

    pub fn from_domain_type(value: Option<&str>) -> Option<Self> {
        match value {
            None => Some(Self::Any),
            Some("thirdParty") => Some(Self::ThirdParty),
            Some("firstParty") => Some(Self::FirstParty),
            Some(_) => None,
        }
    }
}

/// Initiator domains a rule is restricted to (`$domain=`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DomainScope {
    pub included: BTreeSet<String>,
    pub excluded: BTreeSet<String>,
}

impl DomainScope {
    pub fn is_unrestricted(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A compiled network rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkRule {
    /// Unique across the whole compiled ruleset
    pub id: u32,
    pub priority: u8,
    pub disposition: Disposition,
    /// Pattern in declarative `urlFilter` syntax
    pub url_pattern: String,
    pub resource_types: ResourceType,
    pub domain_scope: DomainScope,
    pub party_scope: PartyScope,
}

/// Where a cosmetic selector applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CosmeticScope {
    Generic,
    DomainScoped(BTreeSet<String>),
}

/// An element-hiding selector that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmeticSelector {
    pub selector: String,
    pub scope: CosmeticScope,
}

// =============================================================================
// Compiled Ruleset
// =============================================================================

/// Everything one compile produces.
///
/// A ruleset is superseded wholesale on refresh and never patched in place.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRuleset {
    /// Ordered by id
    pub network_rules: Vec<NetworkRule>,
    pub generic_css: String,
    /// Lowercase domain -> selectors, first-seen order per domain
    pub domain_selectors: BTreeMap<String, Vec<String>>,
    pub generated_at: DateTime<Utc>,
    /// Opaque fingerprint of the list contents this was built from
    pub source_list_version: String,
}

impl CompiledRuleset {
    /// Number of distinct generic selectors embedded in `generic_css`.
    pub fn generic_selector_count(&self) -> usize {
        generic_selector_count(&self.generic_css)
    }
}

/// Count selectors in a stylesheet produced by the cosmetic extractor.
pub fn generic_selector_count(css: &str) -> usize {
    css.split('}')
        .filter_map(|block| block.split('{').next())
        .map(|head| {
            head.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with("/*"))
                .count()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceptions_outrank_blocks() {
        assert!(Disposition::Allow.priority() > Disposition::Block.priority());
    }

    #[test]
    fn test_resource_type_names_roundtrip_order() {
        let mask = ResourceType::IMAGE | ResourceType::SCRIPT | ResourceType::SUB_FRAME;
        assert_eq!(mask.names(), vec!["sub_frame", "script", "image"]);
        assert_eq!(ResourceType::from_name("xmlhttprequest"), Some(ResourceType::XMLHTTPREQUEST));
        assert_eq!(ResourceType::from_name("subdocument"), None);
    }

    #[test]
    fn test_default_types_exclude_documents() {
        assert!(!ResourceType::DEFAULT.contains(ResourceType::MAIN_FRAME));
        assert!(!ResourceType::DEFAULT.contains(ResourceType::OBJECT));
        assert_eq!(ResourceType::DEFAULT.names().len(), 9);
    }

    #[test]
    fn test_party_scope_domain_type() {
        assert_eq!(PartyScope::ThirdParty.domain_type(), Some("thirdParty"));
        assert_eq!(PartyScope::from_domain_type(None), Some(PartyScope::Any));
        assert_eq!(PartyScope::from_domain_type(Some("sameSite")), None);
    }

    #[test]
    fn test_generic_selector_count() {
        let css = "/* header */\n\n.a,\n.b {\n  display: none !important;\n}\n\n.c {\n  display: none !important;\n}\n\n";
        assert_eq!(generic_selector_count(css), 3);
        assert_eq!(generic_selector_count(""), 0);
    }
}
