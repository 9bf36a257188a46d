//! Filter compiler
//!
//! Drives the parser over every fetched list in two passes (block, then
//! exception), numbers rules from disjoint per-list ranges, enforces the
//! per-list and aggregate caps, and hands the same lines to the cosmetic
//! extractor.
//!
//! Rule ids are laid out as
//! `1 + namespace * 2_000_000 + pass * 1_000_000 + ordinal`, so an id depends
//! only on its list's namespace and that list's own line order.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ep_core::fingerprint::Fingerprint;
use ep_core::types::{CompiledRuleset, Disposition, NetworkRule};

use crate::config::{CompilerConfig, ListSpec, MAX_NAMESPACE, PASS_ID_RANGE};
use crate::cosmetic::{CosmeticExtractor, ExtractReport};
use crate::parser::{is_comment_line, is_cosmetic_line, parse_line_with_limit};

/// A list that could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("list '{list}': {reason}")]
pub struct FetchError {
    pub list: String,
    pub reason: String,
}

impl FetchError {
    pub fn new(list: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            list: list.into(),
            reason: reason.to_string(),
        }
    }
}

/// A list together with the outcome of fetching it.
#[derive(Debug, Clone)]
pub struct ListInput {
    pub spec: ListSpec,
    pub body: Result<String, FetchError>,
}

impl ListInput {
    pub fn fetched(spec: ListSpec, body: impl Into<String>) -> Self {
        Self {
            spec,
            body: Ok(body.into()),
        }
    }

    pub fn failed(spec: ListSpec, reason: impl ToString) -> Self {
        let err = FetchError::new(spec.name.clone(), reason);
        Self {
            spec,
            body: Err(err),
        }
    }
}

/// Per-list counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListReport {
    pub name: String,
    pub lines: usize,
    pub block_rules: usize,
    pub exception_rules: usize,
    /// Network lines neither pass could express
    pub dropped: usize,
    /// Rules or lines cut by the per-list or aggregate cap
    pub capped: usize,
    pub fetch_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub lists: Vec<ListReport>,
    pub network_rules: usize,
    pub cosmetic: ExtractReport,
}

impl CompileReport {
    pub fn failed_lists(&self) -> usize {
        self.lists.iter().filter(|l| l.fetch_error.is_some()).count()
    }

    pub fn dropped_lines(&self) -> usize {
        self.lists.iter().map(|l| l.dropped).sum()
    }
}

// =============================================================================
// Id Layout
// =============================================================================

/// First id of a list's pass, or `None` when the namespace is out of range.
pub fn pass_base(namespace: u16, pass: Disposition) -> Option<u32> {
    if namespace > MAX_NAMESPACE {
        return None;
    }
    let pass_index = match pass {
        Disposition::Block => 0,
        Disposition::Allow => 1,
    };
    Some(1 + namespace as u32 * 2 * PASS_ID_RANGE + pass_index * PASS_ID_RANGE)
}

// =============================================================================
// Per-list Compilation
// =============================================================================

fn is_network_candidate(line: &str) -> bool {
    !line.is_empty() && !is_comment_line(line) && !is_cosmetic_line(line)
}

/// Compile one list's network rules, block pass first.
pub fn compile_list(spec: &ListSpec, body: &str, config: &CompilerConfig) -> (Vec<NetworkRule>, ListReport) {
    let mut report = ListReport {
        name: spec.name.clone(),
        ..ListReport::default()
    };
    let mut rules = Vec::new();

    let lines: Vec<&str> = body.lines().map(str::trim).collect();
    report.lines = lines.len();

    for pass in [Disposition::Block, Disposition::Allow] {
        let Some(base) = pass_base(spec.namespace, pass) else {
            log::warn!("List '{}': namespace {} out of range", spec.name, spec.namespace);
            return (Vec::new(), report);
        };
        let wants_exception = pass == Disposition::Allow;
        let mut ordinal: u32 = 0;

        let candidates = lines
            .iter()
            .filter(|l| is_network_candidate(l) && l.starts_with("@@") == wants_exception);

        for line in candidates {
            if rules.len() >= config.max_rules_per_list {
                report.capped += 1;
                continue;
            }

            match parse_line_with_limit(line, base + ordinal, pass, config.max_url_filter_len) {
                Some(rule) => {
                    ordinal += 1;
                    match pass {
                        Disposition::Block => report.block_rules += 1,
                        Disposition::Allow => report.exception_rules += 1,
                    }
                    rules.push(rule);
                }
                None => {
                    log::debug!("Dropped line in '{}': {}", spec.name, line);
                    report.dropped += 1;
                }
            }
        }
    }

    if report.capped > 0 {
        log::warn!(
            "List '{}' hit the per-list cap of {}; {} lines skipped",
            spec.name,
            config.max_rules_per_list,
            report.capped
        );
    }

    (rules, report)
}

// =============================================================================
// Build
// =============================================================================

/// Compile every list into one ruleset, stamped with the current time.
pub fn build(lists: &[ListInput], config: &CompilerConfig) -> (CompiledRuleset, CompileReport) {
    build_at(lists, config, Utc::now())
}

/// Compile with an explicit `generated_at`.
pub fn build_at(
    lists: &[ListInput],
    config: &CompilerConfig,
    generated_at: DateTime<Utc>,
) -> (CompiledRuleset, CompileReport) {
    let mut report = CompileReport::default();
    let mut extractor = CosmeticExtractor::new(config.selector_limits(), config.css_chunk_size);
    let mut fingerprint = Fingerprint::new();
    let mut namespaces = HashSet::new();
    let mut network_rules: Vec<NetworkRule> = Vec::new();

    for input in lists {
        let spec = &input.spec;
        let body = match &input.body {
            Ok(body) => body,
            Err(err) => {
                log::warn!("Skipping {err}");
                report.lists.push(ListReport {
                    name: spec.name.clone(),
                    fetch_error: Some(err.reason.clone()),
                    ..ListReport::default()
                });
                continue;
            }
        };

        if !namespaces.insert(spec.namespace) {
            log::warn!("List '{}' reuses namespace {}; skipped", spec.name, spec.namespace);
            report.lists.push(ListReport {
                name: spec.name.clone(),
                fetch_error: Some(format!("namespace {} already in use", spec.namespace)),
                ..ListReport::default()
            });
            continue;
        }

        fingerprint.update(spec.name.as_bytes()).update(body.as_bytes());

        let (rules, mut list_report) = compile_list(spec, body, config);
        for line in body.lines() {
            extractor.push_line(line);
        }

        // Aggregate cap in configured list order, then line order
        let room = config.max_total_rules.saturating_sub(network_rules.len());
        if rules.len() > room {
            list_report.capped += rules.len() - room;
            log::warn!(
                "Total rule cap of {} reached in '{}'; {} rules dropped",
                config.max_total_rules,
                spec.name,
                rules.len() - room
            );
        }
        network_rules.extend(rules.into_iter().take(room));

        log::info!(
            "List '{}': {} block, {} exception, {} dropped",
            list_report.name,
            list_report.block_rules,
            list_report.exception_rules,
            list_report.dropped
        );
        report.lists.push(list_report);
    }

    network_rules.sort_by_key(|r| r.id);
    report.network_rules = network_rules.len();

    let cosmetic = extractor.finish();
    report.cosmetic = cosmetic.report;

    let ruleset = CompiledRuleset {
        network_rules,
        generic_css: cosmetic.generic_css,
        domain_selectors: cosmetic.domain_selectors,
        generated_at,
        source_list_version: fingerprint.to_hex(),
    };

    (ruleset, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ep_core::pattern::UrlFilter;
    use ep_core::types::{PartyScope, ResourceType};

    const SAMPLE: &str = "[Adblock Plus 2.0]
! Title: Sample
||adnetwork.com/track^$image,third-party
||ads.example^
@@||trusted.com^$domain=example.com
||trusted.com^
/banner/*/img^$popup
##.ad-banner
example.com,~sub.example.com##.promo
example.com#@#.promo
";

    fn spec(name: &str, namespace: u16) -> ListSpec {
        ListSpec::new(name, format!("https://lists.test/{name}.txt"), namespace)
    }

    fn config() -> CompilerConfig {
        CompilerConfig {
            lists: vec![],
            ..CompilerConfig::default()
        }
    }

    #[test]
    fn test_pass_base_layout() {
        assert_eq!(pass_base(0, Disposition::Block), Some(1));
        assert_eq!(pass_base(0, Disposition::Allow), Some(1_000_001));
        assert_eq!(pass_base(1, Disposition::Block), Some(2_000_001));
        assert_eq!(pass_base(MAX_NAMESPACE + 1, Disposition::Block), None);
    }

    #[test]
    fn test_compile_list_ids_and_counts() {
        let (rules, report) = compile_list(&spec("easylist", 0), SAMPLE, &config());
        let ids: Vec<u32> = rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 1_000_001]);
        assert_eq!(report.block_rules, 3);
        assert_eq!(report.exception_rules, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.lines, 10);
    }

    #[test]
    fn test_build_end_to_end() {
        let lists = vec![ListInput::fetched(spec("easylist", 0), SAMPLE)];
        let (ruleset, report) = build(&lists, &config());

        assert_eq!(report.network_rules, 4);
        assert_eq!(report.cosmetic.generic, 1);
        assert_eq!(report.cosmetic.unsupported, 1);

        let track = &ruleset.network_rules[0];
        assert_eq!(track.url_pattern, "||adnetwork.com/track^");
        assert_eq!(track.resource_types, ResourceType::IMAGE);
        assert_eq!(track.party_scope, PartyScope::ThirdParty);

        let exception = ruleset
            .network_rules
            .iter()
            .find(|r| r.disposition == Disposition::Allow)
            .unwrap();
        assert_eq!(exception.url_pattern, "||trusted.com^");
        assert!(exception.domain_scope.included.contains("example.com"));
        let trusted_block = ruleset
            .network_rules
            .iter()
            .find(|r| r.disposition == Disposition::Block && r.url_pattern == "||trusted.com^")
            .unwrap();
        assert!(exception.priority > trusted_block.priority);

        assert!(ruleset.generic_css.contains(".ad-banner {"));
        assert_eq!(ruleset.domain_selectors.len(), 1);
        assert_eq!(ruleset.domain_selectors["example.com"], vec![".promo"]);
    }

    #[test]
    fn test_exceptions_always_outrank_blocks() {
        let lists = vec![
            ListInput::fetched(spec("a", 0), SAMPLE),
            ListInput::fetched(spec("b", 5), "@@/ok/*\n/bad/*\n@@||x.com^$script\n"),
        ];
        let (ruleset, _) = build(&lists, &config());
        let max_block = ruleset
            .network_rules
            .iter()
            .filter(|r| r.disposition == Disposition::Block)
            .map(|r| r.priority)
            .max()
            .unwrap();
        assert!(ruleset
            .network_rules
            .iter()
            .filter(|r| r.disposition == Disposition::Allow)
            .all(|r| r.priority > max_block));
    }

    #[test]
    fn test_build_is_deterministic() {
        let lists = vec![
            ListInput::fetched(spec("a", 0), SAMPLE),
            ListInput::fetched(spec("b", 1), "||tracker.io^\n@@||tracker.io/ok^\n"),
        ];
        let now = Utc::now();
        let (first, _) = build_at(&lists, &config(), now);
        let (second, _) = build_at(&lists, &config(), now);
        assert_eq!(first, second);
        assert_eq!(first.source_list_version, second.source_list_version);
    }

    #[test]
    fn test_ids_unique_and_sorted() {
        let lists = vec![
            ListInput::fetched(spec("late", 3), "||one.com^\n@@||two.com^\n"),
            ListInput::fetched(spec("early", 0), SAMPLE),
        ];
        let (ruleset, _) = build(&lists, &config());
        let ids: Vec<u32> = ruleset.network_rules.iter().map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ids, sorted);
        assert!(ids.contains(&6_000_001));
        assert!(ids.contains(&7_000_001));
    }

    #[test]
    fn test_fetch_failure_is_not_fatal() {
        let lists = vec![
            ListInput::failed(spec("down", 0), "HTTP 503"),
            ListInput::fetched(spec("up", 1), "||ads.example^\n"),
        ];
        let (ruleset, report) = build(&lists, &config());
        assert_eq!(ruleset.network_rules.len(), 1);
        assert_eq!(ruleset.network_rules[0].id, 2_000_001);
        assert_eq!(report.failed_lists(), 1);
        assert_eq!(report.lists[0].fetch_error.as_deref(), Some("HTTP 503"));
    }

    #[test]
    fn test_per_list_cap_spans_both_passes() {
        let body = "||a.com^\n||b.com^\n@@||c.com^\n||d.com^\n";
        let config = CompilerConfig {
            max_rules_per_list: 2,
            ..config()
        };
        let (rules, report) = compile_list(&spec("l", 0), body, &config);
        let patterns: Vec<&str> = rules.iter().map(|r| r.url_pattern.as_str()).collect();
        assert_eq!(patterns, vec!["||a.com^", "||b.com^"]);
        assert_eq!(report.capped, 2);
    }

    #[test]
    fn test_total_cap_follows_list_order() {
        let config = CompilerConfig {
            max_total_rules: 3,
            ..config()
        };
        let lists = vec![
            ListInput::fetched(spec("first", 4), "||a.com^\n||b.com^\n"),
            ListInput::fetched(spec("second", 0), "||c.com^\n||d.com^\n"),
        ];
        let (ruleset, report) = build(&lists, &config);
        let patterns: Vec<&str> = ruleset.network_rules.iter().map(|r| r.url_pattern.as_str()).collect();
        // Sorted by id: namespace 0 sorts first even though it was configured second
        assert_eq!(patterns, vec!["||c.com^", "||a.com^", "||b.com^"]);
        assert_eq!(report.lists[1].capped, 1);
    }

    #[test]
    fn test_duplicate_namespace_skipped() {
        let lists = vec![
            ListInput::fetched(spec("a", 0), "||a.com^\n"),
            ListInput::fetched(spec("b", 0), "||b.com^\n"),
        ];
        let (ruleset, report) = build(&lists, &config());
        assert_eq!(ruleset.network_rules.len(), 1);
        assert!(report.lists[1].fetch_error.is_some());
    }

    #[test]
    fn test_host_rules_match_subdomains() {
        let lists = vec![ListInput::fetched(spec("a", 0), "||adnetwork.com^\n")];
        let (ruleset, _) = build(&lists, &config());
        let filter = UrlFilter::compile(&ruleset.network_rules[0].url_pattern);
        assert!(filter.matches("https://adnetwork.com/x.js"));
        assert!(filter.matches("https://cdn.adnetwork.com/x.js"));
        assert!(!filter.matches("https://notadnetwork.com/x.js"));
    }

    #[test]
    fn test_cosmetic_scopes_from_build() {
        let lists = vec![ListInput::fetched(spec("a", 0), "##.ad-banner\nexample.com,~sub.example.com##.promo\n")];
        let (ruleset, _) = build(&lists, &config());
        assert_eq!(ruleset.generic_selector_count(), 1);
        assert_eq!(ruleset.domain_selectors.keys().collect::<Vec<_>>(), vec!["example.com"]);
    }
}
