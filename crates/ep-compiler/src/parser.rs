//! Network filter parser
//!
//! Turns one EasyList line into a [`NetworkRule`] for a given pass, or
//! nothing. Lines are either block requests or exception requests; each
//! pass only ever yields its own kind.

use std::collections::BTreeSet;

use ep_core::types::{Disposition, DomainScope, NetworkRule, PartyScope, ResourceType};

/// Longest `urlFilter` the declarative matcher is handed.
pub const MAX_URL_FILTER_LEN: usize = 2048;

/// Markers that route a line to the cosmetic extractor.
const COSMETIC_MARKERS: &[&str] = &["##", "#@#", "#?#", "#$#"];

/// Options whose semantics a plain block/allow rule cannot carry.
const UNSUPPORTED_OPTIONS: &[&str] = &[
    "badfilter",
    "redirect",
    "redirect-rule",
    "removeparam",
    "csp",
    "rewrite",
    "popup",
    "elemhide",
    "generichide",
    "specifichide",
    "replace",
    "header",
    "permissions",
];

// =============================================================================
// URL Patterns
// =============================================================================

/// A filter pattern classified by how it anchors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPattern {
    /// `||host...` - host or any of its subdomains
    HostAnchored { host: String, rest: String },
    /// `|literal` - URL starts with the literal
    LeftAnchored(String),
    /// Literal containing an explicit scheme
    Literal(String),
    /// Unanchored substring match
    Substring(String),
}

impl UrlPattern {
    /// Classify a raw filter pattern. Regex filters (`/.../`) are not
    /// expressible and yield `None`, as do degenerate patterns.
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        if is_degenerate(pattern) || !pattern.is_ascii() {
            return None;
        }

        if pattern.len() > 1 && pattern.starts_with('/') && pattern.ends_with('/') {
            return None;
        }

        if let Some(rest) = pattern.strip_prefix("||") {
            let rest = rest.strip_prefix('.').unwrap_or(rest);
            let end = rest
                .find(|c: char| matches!(c, '/' | '^' | '*' | '?' | '#' | ':' | '|'))
                .unwrap_or(rest.len());
            let host = normalize_domain(&rest[..end])?;
            return Some(Self::HostAnchored {
                host,
                rest: rest[end..].to_string(),
            });
        }

        if let Some(rest) = pattern.strip_prefix('|') {
            if is_degenerate(rest) {
                return None;
            }
            return Some(Self::LeftAnchored(rest.to_string()));
        }

        if pattern.contains("://") {
            return Some(Self::Literal(pattern.to_string()));
        }

        Some(Self::Substring(pattern.to_string()))
    }

    /// Render in declarative `urlFilter` syntax.
    pub fn to_url_filter(&self) -> String {
        match self {
            Self::HostAnchored { host, rest } => format!("||{host}{rest}"),
            Self::LeftAnchored(literal) => format!("|{literal}"),
            Self::Literal(literal) | Self::Substring(literal) => literal.clone(),
        }
    }
}

/// Empty, or only wildcard/anchor/separator characters.
fn is_degenerate(pattern: &str) -> bool {
    pattern.chars().all(|c| matches!(c, '*' | '^' | '|'))
}

// =============================================================================
// Line Classification
// =============================================================================

pub fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}

pub fn is_cosmetic_line(line: &str) -> bool {
    COSMETIC_MARKERS.iter().any(|m| line.contains(m))
}

// =============================================================================
// Line Parsing
// =============================================================================

/// Parse one line for the given pass.
///
/// `pass` is [`Disposition::Allow`] for the exception pass and
/// [`Disposition::Block`] for the block pass.
pub fn parse_line(line: &str, id: u32, pass: Disposition) -> Option<NetworkRule> {
    parse_line_with_limit(line, id, pass, MAX_URL_FILTER_LEN)
}

pub fn parse_line_with_limit(
    line: &str,
    id: u32,
    pass: Disposition,
    max_url_filter_len: usize,
) -> Option<NetworkRule> {
    let line = line.trim();
    if line.is_empty() || is_comment_line(line) || is_cosmetic_line(line) {
        return None;
    }

    let body = match (line.strip_prefix("@@"), pass) {
        (Some(rest), Disposition::Allow) => rest,
        (None, Disposition::Block) => line,
        _ => return None,
    };

    let (pattern_part, options_text) = split_rule_options(body);
    let options = match options_text {
        Some(text) => parse_options(text)?,
        None => ParsedOptions::default(),
    };

    let url_pattern = UrlPattern::parse(pattern_part)?.to_url_filter();
    if url_pattern.len() > max_url_filter_len {
        let head: String = url_pattern.chars().take(32).collect();
        log::debug!("urlFilter over {max_url_filter_len} chars: {head}...");
        return None;
    }

    Some(NetworkRule {
        id,
        priority: pass.priority(),
        disposition: pass,
        url_pattern,
        resource_types: options.resource_types,
        domain_scope: options.domain_scope,
        party_scope: options.party_scope,
    })
}

/// Split on the last unescaped `$`.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    let found = bytes
        .iter()
        .enumerate()
        .rev()
        .find(|&(i, &b)| b == b'$' && (i == 0 || bytes[i - 1] != b'\\'))
        .map(|(i, _)| i);

    match found {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct ParsedOptions {
    resource_types: ResourceType,
    party_scope: PartyScope,
    domain_scope: DomainScope,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            resource_types: ResourceType::DEFAULT,
            party_scope: PartyScope::Any,
            domain_scope: DomainScope::default(),
        }
    }
}

/// Fold options left to right. `None` rejects the whole rule.
fn parse_options(text: &str) -> Option<ParsedOptions> {
    let mut options = ParsedOptions::default();

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        if matches!(raw_lower, "important" | "match-case" | "genericblock") {
            continue;
        }

        if let Some(domain_value) = raw_lower.strip_prefix("domain=") {
            merge_domain_option(&mut options.domain_scope, domain_value)?;
            continue;
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        let key = name.split('=').next().unwrap_or(name);
        if UNSUPPORTED_OPTIONS.contains(&key) {
            log::debug!("Unsupported option '{raw}'");
            return None;
        }

        if let Some(ty) = request_type(name) {
            if negated {
                options.resource_types.remove(ty);
            } else {
                options.resource_types = ty;
            }
            continue;
        }

        if let Some(scope) = party_scope(name, negated) {
            options.party_scope = scope;
            continue;
        }

        // Unknown options are ignored
    }

    if options.resource_types.is_empty() {
        return None;
    }

    Some(options)
}

fn merge_domain_option(scope: &mut DomainScope, value: &str) -> Option<()> {
    let mut included = BTreeSet::new();
    let mut excluded = BTreeSet::new();

    for raw in value.split('|') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw)?;
        if is_exclude {
            excluded.insert(domain);
        } else {
            included.insert(domain);
        }
    }

    if included.is_empty() && excluded.is_empty() {
        return None;
    }

    scope.included.extend(included);
    scope.excluded.extend(excluded);
    Some(())
}

fn request_type(name: &str) -> Option<ResourceType> {
    match name {
        "script" => Some(ResourceType::SCRIPT),
        "image" => Some(ResourceType::IMAGE),
        "stylesheet" => Some(ResourceType::STYLESHEET),
        "object" => Some(ResourceType::OBJECT),
        "subdocument" => Some(ResourceType::SUB_FRAME),
        "document" => Some(ResourceType::MAIN_FRAME),
        "xmlhttprequest" | "xhr" => Some(ResourceType::XMLHTTPREQUEST),
        "media" => Some(ResourceType::MEDIA),
        "font" => Some(ResourceType::FONT),
        "ping" => Some(ResourceType::PING),
        "websocket" => Some(ResourceType::WEBSOCKET),
        "other" => Some(ResourceType::OTHER),
        _ => None,
    }
}

fn party_scope(name: &str, negated: bool) -> Option<PartyScope> {
    let third = match name {
        "third-party" | "thirdparty" | "3p" => true,
        "first-party" | "firstparty" | "1p" => false,
        _ => return None,
    };
    if third != negated {
        Some(PartyScope::ThirdParty)
    } else {
        Some(PartyScope::FirstParty)
    }
}

pub(crate) fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ep_core::pattern::UrlFilter;

    fn block(line: &str) -> Option<NetworkRule> {
        parse_line(line, 1, Disposition::Block)
    }

    fn allow(line: &str) -> Option<NetworkRule> {
        parse_line(line, 1, Disposition::Allow)
    }

    #[test]
    fn test_rejects_non_network_lines() {
        for line in [
            "",
            "! comment",
            "[Adblock Plus 2.0]",
            "##.ad",
            "example.com##.ad",
            "example.com#@#.ad",
            "example.com#?#.ad:has(span)",
            "example.com#$#abort-on-property-read x",
        ] {
            assert_eq!(block(line), None, "{line}");
            assert_eq!(allow(line), None, "{line}");
        }
    }

    #[test]
    fn test_pass_separation() {
        assert!(block("||ads.com^").is_some());
        assert!(allow("||ads.com^").is_none());
        assert!(block("@@||ads.com^").is_none());
        assert!(allow("@@||ads.com^").is_some());
    }

    #[test]
    fn test_host_anchor_pattern() {
        let rule = block("||AdNetwork.com^").unwrap();
        assert_eq!(rule.url_pattern, "||adnetwork.com^");
        assert_eq!(rule.resource_types, ResourceType::DEFAULT);
        assert_eq!(rule.party_scope, PartyScope::Any);
        assert!(rule.domain_scope.is_unrestricted());
        assert_eq!(rule.priority, 1);
    }

    #[test]
    fn test_host_anchor_matches_subdomains_only() {
        for domain in ["adnetwork.com", "tracker.co.uk", "a-b.example.org"] {
            let rule = block(&format!("||{domain}^")).unwrap();
            let filter = UrlFilter::compile(&rule.url_pattern);
            assert!(filter.matches(&format!("https://{domain}/x")));
            assert!(filter.matches(&format!("https://sub.{domain}/x")));
            assert!(!filter.matches(&format!("https://not{domain}/x")));
        }
    }

    #[test]
    fn test_pattern_kinds() {
        assert_eq!(
            UrlPattern::parse("|https://ads."),
            Some(UrlPattern::LeftAnchored("https://ads.".into()))
        );
        assert_eq!(
            UrlPattern::parse("http://ads.example.com/banner"),
            Some(UrlPattern::Literal("http://ads.example.com/banner".into()))
        );
        assert_eq!(
            UrlPattern::parse("/ad_banner."),
            Some(UrlPattern::Substring("/ad_banner.".into()))
        );
        assert_eq!(UrlPattern::parse("/banner\\d+/"), None);
    }

    #[test]
    fn test_degenerate_patterns_rejected() {
        for line in ["*", "**", "|", "||", "^", "*^*", "||*", "|*"] {
            assert_eq!(block(line), None, "{line}");
        }
        assert_eq!(block("/ads/été"), None);
    }

    #[test]
    fn test_url_filter_ceiling() {
        let long = format!("/{}", "a".repeat(MAX_URL_FILTER_LEN));
        assert_eq!(block(&long), None);
        let ok = format!("/{}", "a".repeat(MAX_URL_FILTER_LEN - 1));
        assert!(block(&ok).is_some());
    }

    #[test]
    fn test_short_ceiling_with_debug_logging() {
        let _ = env_logger::Builder::new()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
        assert!(log::log_enabled!(log::Level::Debug));

        assert_eq!(parse_line_with_limit("/abcdefghijklmnopqrst", 1, Disposition::Block, 10), None);
        let long = format!("/{}", "b".repeat(40));
        assert_eq!(parse_line_with_limit(&long, 1, Disposition::Block, 20), None);
        assert!(parse_line_with_limit("/abcdefgh", 1, Disposition::Block, 10).is_some());
    }

    #[test]
    fn test_type_options_fold_left_to_right() {
        let rule = block("/ads/*$script,image").unwrap();
        assert_eq!(rule.resource_types, ResourceType::IMAGE);

        let rule = block("/ads/*$~image").unwrap();
        assert_eq!(rule.resource_types, ResourceType::DEFAULT - ResourceType::IMAGE);

        let rule = block("/ads/*$subdocument").unwrap();
        assert_eq!(rule.resource_types, ResourceType::SUB_FRAME);

        assert_eq!(block("/ads/*$image,~image"), None);
    }

    #[test]
    fn test_party_options_last_wins() {
        assert_eq!(block("/a/*$third-party").unwrap().party_scope, PartyScope::ThirdParty);
        assert_eq!(block("/a/*$~third-party").unwrap().party_scope, PartyScope::FirstParty);
        assert_eq!(block("/a/*$3p,1p").unwrap().party_scope, PartyScope::FirstParty);
        assert_eq!(block("/a/*$~first-party").unwrap().party_scope, PartyScope::ThirdParty);
    }

    #[test]
    fn test_domain_option_accumulates() {
        let rule = block("/ads/*$domain=a.com|~b.a.com,domain=C.com").unwrap();
        let included: Vec<&str> = rule.domain_scope.included.iter().map(String::as_str).collect();
        let excluded: Vec<&str> = rule.domain_scope.excluded.iter().map(String::as_str).collect();
        assert_eq!(included, vec!["a.com", "c.com"]);
        assert_eq!(excluded, vec!["b.a.com"]);

        assert_eq!(block("/ads/*$domain=|"), None);
    }

    #[test]
    fn test_unsupported_and_unknown_options() {
        assert_eq!(block("||ads.com^$badfilter"), None);
        assert_eq!(block("||ads.com^$redirect=noop.js"), None);
        assert_eq!(block("||ads.com^$csp=script-src 'none'"), None);
        assert_eq!(block("||ads.com^$popup"), None);
        assert!(block("||ads.com^$important,match-case").is_some());
        assert!(block("||ads.com^$someday-option").is_some());
    }

    #[test]
    fn test_split_on_last_unescaped_dollar() {
        assert_eq!(split_rule_options("a$b$image"), ("a$b", Some("image")));
        assert_eq!(split_rule_options("a\\$b"), ("a\\$b", None));
        assert_eq!(split_rule_options("plain"), ("plain", None));
    }

    #[test]
    fn test_third_party_image_rule() {
        let rule = block("||adnetwork.com/track^$image,third-party").unwrap();
        assert_eq!(rule.disposition, Disposition::Block);
        assert_eq!(rule.url_pattern, "||adnetwork.com/track^");
        assert_eq!(rule.resource_types, ResourceType::IMAGE);
        assert_eq!(rule.party_scope, PartyScope::ThirdParty);

        let filter = UrlFilter::compile(&rule.url_pattern);
        assert!(filter.matches("https://adnetwork.com/track?px=1"));
        assert!(filter.matches("https://cdn.adnetwork.com/track"));
        assert!(!filter.matches("https://notadnetwork.com/track"));
    }

    #[test]
    fn test_scoped_exception() {
        let rule = allow("@@||trusted.com^$domain=example.com").unwrap();
        assert_eq!(rule.disposition, Disposition::Allow);
        assert_eq!(rule.url_pattern, "||trusted.com^");
        assert!(rule.domain_scope.included.contains("example.com"));
        assert!(rule.priority > block("||trusted.com^").unwrap().priority);
    }
}
