//! Heuristic ad-element classifier
//!
//! Candidates come from a selector catalog. Each visible candidate is scored
//! against a fixed table of weighted signals; at or above the threshold it is
//! removed, or CSS-hidden when removal fails. Every node acted on is recorded
//! so repeated scans never score it again.
//!
//! Scans walk the page and every nested shadow root. Each root gets one
//! copy of the hiding stylesheet.

use once_cell::sync::Lazy;

use ep_core::cosmetic::hiding_stylesheet;

use crate::config::ClassifierConfig;
use crate::dom::selector::parse_catalog;
use crate::dom::{descendants, find_by_id, force_hide, is_visible, ComputedStyle, Document, DomNode, Rect, Selector};
use crate::handled::HandledSet;

pub const PAGE_STYLE_ID: &str = "echo-adblock-styles";
pub const SHADOW_STYLE_ID: &str = "echo-shadow-styles";

/// Standard IAB display sizes.
pub const IAB_SIZES: &[(u32, u32)] = &[
    (728, 90),
    (300, 250),
    (160, 600),
    (300, 600),
    (970, 250),
    (320, 50),
    (468, 60),
    (234, 60),
    (120, 600),
];

// =============================================================================
// Catalogs
// =============================================================================

const CANDIDATE_SELECTORS: &[&str] = &[
    // Containers
    "[id*=\"ad-container\"]",
    "[class*=\"ad-container\"]",
    "[id*=\"ad_container\"]",
    "[class*=\"ad_container\"]",
    "[id*=\"google_ads\"]",
    // Generic classes
    ".ad",
    ".ads",
    ".advert",
    ".adsbygoogle",
    ".ad-banner",
    ".ad-box",
    ".ad-unit",
    ".ad-slot",
    ".ad-wrapper",
    ".ad-block",
    ".ad-frame",
    // Networks
    "[class*=\"doubleclick\"]",
    "[id*=\"doubleclick\"]",
    "[class*=\"adsense\"]",
    "[class*=\"adservice\"]",
    "[class*=\"taboola\"]",
    "[id*=\"taboola\"]",
    "[class*=\"outbrain\"]",
    "[id*=\"outbrain\"]",
    "[class*=\"mgid\"]",
    "[class*=\"propeller\"]",
    "[class*=\"popunder\"]",
    "[class*=\"pop-under\"]",
    "ins.adsbygoogle",
    // Frames
    "iframe[src*=\"doubleclick\"]",
    "iframe[src*=\"googlesyndication\"]",
    "iframe[src*=\"/ads/\"]",
    "iframe[src*=\"ad.\"]",
    "iframe[id*=\"google_ads\"]",
    // Sponsored and tagged slots
    "[class*=\"sponsored\"]",
    "[id*=\"sponsored\"]",
    "[data-ad]",
    "[data-advertisement]",
    "[data-google-query-id]",
    "[data-ad-slot]",
    // Interstitials
    "[class*=\"interstitial\"]",
    "[class*=\"overlay-ad\"]",
    "[class*=\"ad-overlay\"]",
    "[class*=\"fullscreen-ad\"]",
    // Push prompts
    "[class*=\"push-notification\"]",
    "[class*=\"web-push\"]",
    "[class*=\"browser-notification\"]",
    "[id*=\"notification-box\"]",
    // Video
    "[class*=\"video-ad-container\"]",
    "[class*=\"preroll-ad\"]",
    "[class*=\"ima-ad-container\"]",
    // Banners
    "[class*=\"banner-ad\"]",
    "div[class*=\"banner\"][class*=\"ad\"]",
    // Links
    "a[href*=\"click.\"]",
    "a[href*=\"/aff/\"]",
    "a[href*=\"affiliate\"]",
    "a[target=\"_blank\"][href*=\"ad\"]",
    // Stacking
    "div[style*=\"z-index: 2147483647\"]",
    "div[style*=\"z-index: 9999999\"]",
];

/// Selectors hidden by stylesheet before any scan runs.
const HIDDEN_BY_STYLESHEET: &[&str] = &[
    "ins.adsbygoogle",
    ".adsbygoogle",
    "[id^=\"google_ads_iframe\"]",
    "iframe[src*=\"doubleclick.net\"]",
    "iframe[src*=\"googlesyndication.com\"]",
    "[data-ad-slot]",
    "[data-google-query-id]",
    ".ad-banner",
    ".ad-slot",
    ".ad-unit",
    ".ad-container",
    ".ad-wrapper",
    "[class*=\"taboola\"]",
    "[id*=\"taboola\"]",
    "[class*=\"outbrain\"]",
    "[id*=\"outbrain\"]",
];

static CANDIDATES: Lazy<Vec<Selector>> = Lazy::new(|| {
    let mut catalog = parse_catalog(CANDIDATE_SELECTORS);
    let sized: Vec<String> = IAB_SIZES
        .iter()
        .map(|(w, h)| format!("iframe[width=\"{w}\"][height=\"{h}\"]"))
        .collect();
    let sized: Vec<&str> = sized.iter().map(String::as_str).collect();
    catalog.extend(parse_catalog(&sized));
    catalog
});

/// Stylesheet injected into the page and every shadow root.
pub static HIDING_CSS: Lazy<String> =
    Lazy::new(|| hiding_stylesheet(HIDDEN_BY_STYLESHEET.iter().copied(), 100, false));

/// Whole class or id words that mark an element as an ad.
const AD_MARKER_PARTS: &[&str] = &[
    "ad",
    "ads",
    "advert",
    "adverts",
    "advertisement",
    "advertising",
    "adsbygoogle",
    "adsense",
    "adslot",
    "adunit",
    "adbox",
    "adcontainer",
    "adwrapper",
    "adbanner",
    "sponsored",
    "doubleclick",
    "taboola",
    "outbrain",
    "mgid",
    "popunder",
];

const AD_DATA_ATTRIBUTES: &[&str] = &[
    "data-ad",
    "data-advertisement",
    "data-google-query-id",
    "data-ad-slot",
];

const AD_TEXTS: &[&str] = &["ad", "ads", "advertisement", "sponsored", "promoted"];

const PUSH_FRAGMENTS: &[&str] = &[
    "push-notification",
    "web-push",
    "browser-notification",
    "notification-box",
    "onesignal",
];

const VIDEO_AD_FRAGMENTS: &[&str] = &["video-ad-container", "preroll-ad", "ima-ad-container"];

/// Fragments of player chrome that must never be taken down.
const PLAYER_FRAGMENTS: &[&str] = &["player", "controls"];

// =============================================================================
// Features and Signals
// =============================================================================

/// Everything the signals read from a candidate, collected once.
#[derive(Debug, Clone, Default)]
pub struct ElementFeatures {
    pub tag: String,
    pub class_name: String,
    pub id: String,
    class_parts: Vec<String>,
    id_parts: Vec<String>,
    pub has_ad_data_attribute: bool,
    pub src: String,
    pub href: String,
    pub text: String,
    pub size_attributes: Option<(u32, u32)>,
    pub style: ComputedStyle,
    pub rect: Rect,
    pub viewport: (f64, f64),
}

fn word_parts(value: &str) -> Vec<String> {
    value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

impl ElementFeatures {
    pub fn collect<N: DomNode>(node: &N, viewport: (f64, f64)) -> Self {
        let class_name = node.class_name().to_lowercase();
        let id = node.id().to_lowercase();
        let lower = |name: &str| node.attribute(name).unwrap_or_default().to_lowercase();
        let dimension = |name: &str| node.attribute(name).and_then(|v| v.trim().parse::<u32>().ok());

        Self {
            tag: node.tag_name(),
            class_parts: word_parts(&class_name),
            id_parts: word_parts(&id),
            class_name,
            id,
            has_ad_data_attribute: AD_DATA_ATTRIBUTES
                .iter()
                .any(|name| node.attribute(name).is_some()),
            src: lower("src"),
            href: lower("href"),
            text: node.text_content().trim().to_lowercase(),
            size_attributes: dimension("width").zip(dimension("height")),
            style: node.computed_style(),
            rect: node.bounding_rect(),
            viewport,
        }
    }

    fn class_or_id_contains(&self, fragments: &[&str]) -> bool {
        fragments
            .iter()
            .any(|f| self.class_name.contains(f) || self.id.contains(f))
    }
}

fn has_marker(parts: &[String]) -> bool {
    parts.iter().any(|p| AD_MARKER_PARTS.contains(&p.as_str()))
}

/// `needle` occurring at the start of a word, as in a host label.
pub(crate) fn contains_at_word_start(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_ascii_alphanumeric())
    })
}

/// A weighted test over a candidate's features.
#[derive(Clone, Copy)]
pub struct Signal {
    pub name: &'static str,
    pub weight: u32,
    pub test: fn(&ElementFeatures, &ClassifierConfig) -> bool,
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish()
    }
}

pub static SIGNALS: &[Signal] = &[
    Signal {
        name: "ad-marker",
        weight: 1,
        test: |f, _| has_marker(&f.class_parts),
    },
    Signal {
        name: "ad-marker-id",
        weight: 1,
        test: |f, _| has_marker(&f.id_parts),
    },
    Signal {
        name: "data-ad-attribute",
        weight: 2,
        test: |f, _| f.has_ad_data_attribute,
    },
    Signal {
        name: "ad-iframe-source",
        weight: 3,
        test: |f, _| {
            f.tag == "iframe"
                && (["doubleclick", "googlesyndication", "googleadservices", "adservice", "/ads/"]
                    .iter()
                    .any(|n| f.src.contains(n))
                    || contains_at_word_start(&f.src, "ad.")
                    || contains_at_word_start(&f.src, "ads."))
        },
    },
    Signal {
        name: "high-z-index-positioned",
        weight: 2,
        test: |f, config| {
            f.style.position.is_out_of_flow()
                && f.style.z_index.is_some_and(|z| z > config.z_index_floor)
        },
    },
    Signal {
        name: "viewport-overlay",
        weight: 2,
        test: |f, config| {
            let (vw, vh) = f.viewport;
            f.style.position.is_out_of_flow()
                && f.rect.width > vw * config.overlay_fraction
                && f.rect.height > vh * config.overlay_fraction
        },
    },
    Signal {
        name: "ad-text",
        weight: 1,
        test: |f, _| AD_TEXTS.contains(&f.text.as_str()),
    },
    Signal {
        name: "push-notification",
        weight: 2,
        test: |f, _| f.class_or_id_contains(PUSH_FRAGMENTS),
    },
    Signal {
        name: "video-ad",
        weight: 2,
        test: |f, _| {
            f.class_or_id_contains(VIDEO_AD_FRAGMENTS)
                && !f.class_or_id_contains(PLAYER_FRAGMENTS)
                && !f.class_parts.iter().any(|p| p == "ui")
        },
    },
    Signal {
        name: "banner-ad",
        weight: 2,
        test: |f, _| {
            f.class_name.contains("banner-ad")
                || (f.class_parts.iter().any(|p| p == "banner") && has_marker(&f.class_parts))
        },
    },
    Signal {
        name: "ad-link",
        weight: 2,
        test: |f, _| {
            f.tag == "a"
                && (f.href.contains("/aff/")
                    || f.href.contains("affiliate")
                    || contains_at_word_start(&f.href, "click.")
                    || contains_at_word_start(&f.href, "ad."))
        },
    },
    Signal {
        name: "iab-iframe-size",
        weight: 1,
        test: |f, _| f.tag == "iframe" && f.size_attributes.is_some_and(|s| IAB_SIZES.contains(&s)),
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    pub total: u32,
    pub matched: Vec<&'static str>,
}

pub fn score(features: &ElementFeatures, config: &ClassifierConfig) -> Score {
    let mut score = Score::default();
    for signal in SIGNALS {
        if (signal.test)(features, config) {
            score.total += signal.weight;
            score.matched.push(signal.name);
        }
    }
    score
}

pub fn is_candidate<N: DomNode>(node: &N) -> bool {
    CANDIDATES.iter().any(|s| s.matches(node))
}

// =============================================================================
// Scanning
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub removed: usize,
    pub hidden: usize,
    pub below_threshold: usize,
    pub skipped_handled: usize,
    pub scopes: usize,
    pub styles_injected: usize,
}

impl ScanReport {
    pub fn acted(&self) -> usize {
        self.removed + self.hidden
    }
}

/// Per-page classifier state.
#[derive(Debug)]
pub struct Classifier<N: DomNode> {
    config: ClassifierConfig,
    handled: HandledSet<N>,
    styled_roots: HandledSet<N>,
}

impl<N: DomNode> Classifier<N> {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            handled: HandledSet::new(),
            styled_roots: HandledSet::new(),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_handled(&self, node: &N) -> bool {
        self.handled.contains(node)
    }

    pub fn evaluate(&self, node: &N, viewport: (f64, f64)) -> Score {
        score(&ElementFeatures::collect(node, viewport), &self.config)
    }

    /// Scan the page and every shadow root reachable from it.
    pub fn scan<D: Document<Node = N>>(&mut self, doc: &D) -> ScanReport {
        let mut report = ScanReport::default();
        let viewport = doc.viewport();

        if find_by_id(&doc.document_element(), PAGE_STYLE_ID).is_none() {
            let parent = doc.head().unwrap_or_else(|| doc.document_element());
            if inject_style(doc, &parent, PAGE_STYLE_ID) {
                report.styles_injected += 1;
            }
        }

        let mut scopes = vec![doc.document_element()];
        while let Some(scope) = scopes.pop() {
            report.scopes += 1;
            for node in descendants(&scope) {
                if let Some(shadow) = node.shadow_root() {
                    if self.styled_roots.insert(&shadow)
                        && find_by_id(&shadow, SHADOW_STYLE_ID).is_none()
                        && inject_style(doc, &shadow, SHADOW_STYLE_ID)
                    {
                        report.styles_injected += 1;
                    }
                    scopes.push(shadow);
                }
                self.consider(&node, viewport, &mut report);
            }
        }

        self.handled.prune();
        if report.acted() > 0 {
            log::debug!(
                "Ad scan: {} removed, {} hidden of {} candidates",
                report.removed,
                report.hidden,
                report.candidates
            );
        }
        report
    }

    fn consider(&mut self, node: &N, viewport: (f64, f64), report: &mut ScanReport) {
        if !is_candidate(node) {
            return;
        }
        report.candidates += 1;

        if self.handled.contains(node) {
            report.skipped_handled += 1;
            return;
        }
        // Invisible candidates stay eligible for later scans.
        if !is_visible(node) {
            return;
        }

        let score = self.evaluate(node, viewport);
        if score.total < self.config.threshold {
            report.below_threshold += 1;
            return;
        }

        self.handled.insert(node);
        match node.remove() {
            Ok(()) => {
                log::trace!("Removed {node:?} (score {}: {:?})", score.total, score.matched);
                report.removed += 1;
            }
            Err(err) => match force_hide(node) {
                Ok(()) => {
                    log::trace!("Hid {node:?} after failed removal: {err}");
                    report.hidden += 1;
                }
                Err(hide_err) => log::warn!("Could not take down {node:?}: {hide_err}"),
            },
        }
    }

    /// Remove injected stylesheets and forget handled nodes.
    pub fn teardown<D: Document<Node = N>>(&mut self, doc: &D) {
        if let Some(style) = find_by_id(&doc.document_element(), PAGE_STYLE_ID) {
            let _ = style.remove();
        }
        for root in self.styled_roots.nodes() {
            if let Some(style) = find_by_id(&root, SHADOW_STYLE_ID) {
                let _ = style.remove();
            }
        }
        self.styled_roots.clear();
        self.handled.clear();
    }
}

fn inject_style<D: Document>(doc: &D, parent: &D::Node, id: &str) -> bool {
    let attached = doc.create_element("style").and_then(|style| {
        style.set_attribute("id", id)?;
        style.set_text_content(&HIDING_CSS);
        parent.append_child(&style)
    });
    match attached {
        Ok(()) => true,
        Err(err) => {
            log::warn!("Could not inject '{id}': {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::{MemoryDocument, MemoryNode};
    use crate::dom::Rect;

    fn classifier() -> Classifier<MemoryNode> {
        Classifier::new(ClassifierConfig::default())
    }

    fn style_count(root: &MemoryNode, id: &str) -> usize {
        descendants(root).iter().filter(|n| n.id() == id).count()
    }

    #[test]
    fn test_third_party_frame_removed_first_party_kept() {
        let doc = MemoryDocument::new();
        let body = doc.body_node();
        let ad = doc
            .element("iframe")
            .attr("src", "https://ad.doubleclick.net/ddm/adi/N123")
            .attr("width", "300")
            .attr("height", "250")
            .rect(Rect::sized(300.0, 250.0))
            .append_to(&body);
        let widget = doc
            .element("iframe")
            .attr("src", "https://example.com/widgets/weather")
            .attr("width", "300")
            .attr("height", "250")
            .rect(Rect::sized(300.0, 250.0))
            .append_to(&body);

        let mut classifier = classifier();
        assert_eq!(classifier.evaluate(&widget, doc.viewport()).total, 1);

        let report = classifier.scan(&doc);
        assert_eq!(report.removed, 1);
        assert_eq!(report.below_threshold, 1);
        assert!(!ad.is_connected());
        assert!(widget.is_connected());
    }

    #[test]
    fn test_repeat_scans_are_idempotent() {
        let doc = MemoryDocument::new();
        let stubborn = doc
            .element("div")
            .class("ad-slot")
            .attr("data-ad-slot", "123")
            .refuse_removal()
            .append_to(&doc.body_node());

        let mut classifier = classifier();
        let first = classifier.scan(&doc);
        assert_eq!(first.hidden, 1);
        assert_eq!(first.styles_injected, 1);
        assert!(classifier.is_handled(&stubborn));

        let second = classifier.scan(&doc);
        assert_eq!(second.acted(), 0);
        assert_eq!(second.skipped_handled, 1);
        assert_eq!(second.styles_injected, 0);
        assert_eq!(style_count(&doc.head_node(), PAGE_STYLE_ID), 1);
    }

    #[test]
    fn test_scans_shadow_roots() {
        let doc = MemoryDocument::new();
        let host = doc.element("news-feed").append_to(&doc.body_node());
        let shadow = host.attach_shadow();
        let nested_host = doc.element("feed-item").append_to(&shadow);
        let nested = nested_host.attach_shadow();
        let ad = doc
            .element("div")
            .class("ad-wrapper")
            .attr("data-ad", "")
            .text("Advertisement")
            .append_to(&nested);

        let report = classifier().scan(&doc);
        assert_eq!(report.scopes, 3);
        assert_eq!(report.removed, 1);
        assert!(!ad.is_connected());
        assert_eq!(style_count(&shadow, SHADOW_STYLE_ID), 1);
        assert_eq!(style_count(&nested, SHADOW_STYLE_ID), 1);
    }

    #[test]
    fn test_full_viewport_overlay() {
        let doc = MemoryDocument::new();
        let overlay = doc
            .element("div")
            .attr("style", "position: fixed; z-index: 2147483647")
            .rect(Rect::sized(1280.0, 800.0))
            .append_to(&doc.body_node());

        let report = classifier().scan(&doc);
        assert_eq!(report.removed, 1);
        assert!(!overlay.is_connected());
    }

    #[test]
    fn test_weak_candidates_and_invisible_nodes_survive() {
        let doc = MemoryDocument::new();
        let lone = doc.element("div").class("ad").append_to(&doc.body_node());
        let hidden = doc
            .element("div")
            .class("ad-box")
            .attr("data-ad", "")
            .style("display", "none")
            .append_to(&doc.body_node());

        let mut classifier = classifier();
        let report = classifier.scan(&doc);
        assert_eq!(report.acted(), 0);
        assert!(lone.is_connected());
        assert!(!classifier.is_handled(&hidden));

        hidden.remove_style_property("display");
        assert_eq!(classifier.scan(&doc).removed, 1);
    }

    #[test]
    fn test_marker_words_not_substrings() {
        let config = ClassifierConfig::default();
        let features = |class: &str| ElementFeatures {
            class_parts: word_parts(class),
            class_name: class.into(),
            ..ElementFeatures::default()
        };

        assert!(score(&features("ad-wrapper"), &config).matched.contains(&"ad-marker"));
        assert!(score(&features("adcontainer"), &config).matched.contains(&"ad-marker"));
        assert_eq!(score(&features("header read-more"), &config).total, 0);
        assert_eq!(score(&features("top-banner ad"), &config).total, 3);
    }

    #[test]
    fn test_player_chrome_is_not_a_video_ad() {
        let config = ClassifierConfig::default();
        let mut features = ElementFeatures {
            class_name: "ima-ad-container".into(),
            ..ElementFeatures::default()
        };
        assert_eq!(score(&features, &config).matched, vec!["video-ad"]);

        features.class_name = "ima-ad-container player-controls".into();
        assert!(score(&features, &config).matched.is_empty());
    }

    #[test]
    fn test_teardown_removes_styles() {
        let doc = MemoryDocument::new();
        let host = doc.element("div").append_to(&doc.body_node());
        let shadow = host.attach_shadow();

        let mut classifier = classifier();
        classifier.scan(&doc);
        assert_eq!(style_count(&doc.head_node(), PAGE_STYLE_ID), 1);

        classifier.teardown(&doc);
        assert_eq!(style_count(&doc.head_node(), PAGE_STYLE_ID), 0);
        assert_eq!(style_count(&shadow, SHADOW_STYLE_ID), 0);
    }
}
