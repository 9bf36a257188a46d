//! Cosmetic filter extraction
//!
//! Collects `##` element-hiding selectors into a generic stylesheet and a
//! domain -> selectors map. Procedural and scriptlet variants are not
//! supported and never reach the output.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use ep_core::cosmetic::hiding_stylesheet;
use ep_core::types::{CosmeticScope, CosmeticSelector};

use crate::parser::normalize_domain;

/// Substrings that mark a selector as procedural, scriptable, or able to
/// break out of the stylesheet it is embedded in.
const REJECTED_MARKERS: &[&str] = &[
    ":has(",
    ":has-text(",
    ":xpath(",
    ":style(",
    ":remove(",
    ":matches-css(",
    ":matches-css-before(",
    ":matches-css-after(",
    ":min-text-length(",
    ":nth-ancestor(",
    ":upward(",
    ":watch-attr(",
    ":matches-path(",
    ":others(",
    ":if(",
    ":if-not(",
    ":-",
    "javascript:",
    "data:",
    "vbscript:",
    "{",
    "}",
    "/*",
];

const UNSUPPORTED_VARIANTS: &[&str] = &["#@#", "#?#", "#$#"];

/// Length bounds applied to trimmed selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorLimits {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for SelectorLimits {
    fn default() -> Self {
        Self {
            min_len: 2,
            max_len: 500,
        }
    }
}

/// How a single line was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CosmeticLine {
    /// Not an element-hiding line
    NotCosmetic,
    /// `#@#`, `#?#` or `#$#`
    Unsupported,
    /// Selector failed validation, or no usable domain remained
    Rejected,
    Selector(CosmeticSelector),
}

/// Classify one raw line.
pub fn parse_cosmetic_line(line: &str, limits: SelectorLimits) -> CosmeticLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with('!') || line.starts_with('[') {
        return CosmeticLine::NotCosmetic;
    }

    if UNSUPPORTED_VARIANTS.iter().any(|v| line.contains(v)) {
        return CosmeticLine::Unsupported;
    }

    let Some((domain_part, selector)) = line.split_once("##") else {
        return CosmeticLine::NotCosmetic;
    };

    let selector = selector.trim();
    if !is_valid_selector(selector, limits) {
        return CosmeticLine::Rejected;
    }
    let selector = escape_selector(selector);

    if domain_part.trim().is_empty() {
        return CosmeticLine::Selector(CosmeticSelector {
            selector,
            scope: CosmeticScope::Generic,
        });
    }

    // `~domain` exclusions are dropped, not applied as negative scope
    let domains: BTreeSet<String> = domain_part
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty() && !d.starts_with('~'))
        .filter_map(normalize_domain)
        .collect();

    if domains.is_empty() {
        return CosmeticLine::Rejected;
    }

    CosmeticLine::Selector(CosmeticSelector {
        selector,
        scope: CosmeticScope::DomainScoped(domains),
    })
}

pub fn is_valid_selector(selector: &str, limits: SelectorLimits) -> bool {
    let len = selector.chars().count();
    if selector.is_empty() || len < limits.min_len || len > limits.max_len {
        return false;
    }

    let lower = selector.to_ascii_lowercase();
    !REJECTED_MARKERS.iter().any(|m| lower.contains(m))
}

/// Make a selector safe to inline inside a `<style>` element.
pub fn escape_selector(selector: &str) -> String {
    selector.replace('<', "\\3c ")
}

// =============================================================================
// Extractor
// =============================================================================

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Distinct generic selectors
    pub generic: usize,
    /// Domain-scoped lines accepted
    pub domain_scoped: usize,
    pub rejected: usize,
    pub unsupported: usize,
}

/// Everything the extractor produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CosmeticOutput {
    pub generic_css: String,
    pub domain_selectors: BTreeMap<String, Vec<String>>,
    pub report: ExtractReport,
}

/// Accumulates selectors across lines and lists, keeping first-seen order.
#[derive(Debug, Default)]
pub struct CosmeticExtractor {
    limits: SelectorLimits,
    chunk_size: usize,
    generic: Vec<String>,
    generic_seen: HashSet<String>,
    domains: BTreeMap<String, Vec<String>>,
    report: ExtractReport,
}

impl CosmeticExtractor {
    pub fn new(limits: SelectorLimits, chunk_size: usize) -> Self {
        Self {
            limits,
            chunk_size,
            ..Self::default()
        }
    }

    pub fn push_line(&mut self, line: &str) {
        match parse_cosmetic_line(line, self.limits) {
            CosmeticLine::NotCosmetic => {}
            CosmeticLine::Unsupported => self.report.unsupported += 1,
            CosmeticLine::Rejected => {
                log::debug!("Rejected cosmetic line: {}", line.trim());
                self.report.rejected += 1;
            }
            CosmeticLine::Selector(selector) => self.push_selector(selector),
        }
    }

    fn push_selector(&mut self, selector: CosmeticSelector) {
        match selector.scope {
            CosmeticScope::Generic => {
                if self.generic_seen.insert(selector.selector.clone()) {
                    self.generic.push(selector.selector);
                }
            }
            CosmeticScope::DomainScoped(domains) => {
                self.report.domain_scoped += 1;
                for domain in domains {
                    let entry = self.domains.entry(domain).or_default();
                    if !entry.contains(&selector.selector) {
                        entry.push(selector.selector.clone());
                    }
                }
            }
        }
    }

    pub fn finish(mut self) -> CosmeticOutput {
        self.report.generic = self.generic.len();
        let generic_css =
            hiding_stylesheet(self.generic.iter().map(String::as_str), self.chunk_size, true);

        CosmeticOutput {
            generic_css,
            domain_selectors: self.domains,
            report: self.report,
        }
    }
}
