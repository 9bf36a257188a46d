//! Consent banner resolver
//!
//! Finds cookie banners and answers them with the least consent on offer.
//! Each banner moves through:
//!
//! ```text
//! Idle -> Detected -> AttemptingNecessaryOnly -> AttemptingSettingsPanel -> Hidden | Dismissed
//! ```
//!
//! A control whose label grants full consent is never clicked. Banners that
//! cannot be answered within the attempt ceiling are hidden by force, along
//! with any backdrop and scroll lock they left behind.

pub mod patterns;

use regex::Regex;

use crate::config::ConsentConfig;
use crate::dom::{is_visible, query_all, Document, DomNode, SyntheticEvent};
use crate::handled::HandledSet;
use crate::schedule::{earliest, Debouncer, Millis};

use patterns::{
    has_banner_keyword, is_accept_all, matches_any, BANNER_SELECTORS, CONTROL_SELECTORS,
    NECESSARY_ONLY, OVERLAY_SELECTORS, SAVE, SETTINGS, TEXT_CONTAINERS,
};

/// Inline styles applied before a banner is removed.
const HIDE_DECLARATIONS: &[(&str, &str)] = &[
    ("display", "none"),
    ("visibility", "hidden"),
    ("opacity", "0"),
    ("pointer-events", "none"),
    ("z-index", "-9999"),
];

const SCROLL_LOCK_CLASS_FRAGMENTS: &[&str] = &["no-scroll", "overflow"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerState {
    Idle,
    Detected,
    AttemptingNecessaryOnly,
    AttemptingSettingsPanel,
    Hidden,
    Dismissed,
}

impl BannerState {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Hidden | Self::Dismissed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    VendorSelector,
    TextHeuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The page's own control made the banner go away
    Dismissed,
    /// The banner was hidden by force
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverEvent {
    pub outcome: Outcome,
    pub method: DetectionMethod,
    pub attempts: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// Search the banner for a control
    Act,
    /// Check whether the last click dismissed the banner
    Verify,
    /// Search the whole document once the settings panel has rendered
    SettingsPanel,
}

#[derive(Debug)]
struct ActiveBanner<N> {
    element: N,
    method: DetectionMethod,
    attempt: u8,
    state: BannerState,
    pending: Pending,
    wake_at: Millis,
}

/// Per-page resolver state.
#[derive(Debug)]
pub struct ConsentResolver<N: DomNode> {
    config: ConsentConfig,
    enabled: bool,
    handled: HandledSet<N>,
    banners: Vec<ActiveBanner<N>>,
    detection_at: Option<Millis>,
    detection_attempts: u8,
    mutation_debounce: Debouncer,
}

impl<N: DomNode> ConsentResolver<N> {
    pub fn new(config: ConsentConfig) -> Self {
        let mutation_debounce = Debouncer::new(config.mutation_debounce_ms);
        Self {
            config,
            enabled: false,
            handled: HandledSet::new(),
            banners: Vec::new(),
            detection_at: None,
            detection_attempts: 0,
            mutation_debounce,
        }
    }

    /// Schedule the first detection pass after the initial delay.
    pub fn start(&mut self, now: Millis) {
        self.enabled = true;
        self.detection_attempts = 0;
        self.detection_at = Some(now + self.config.initial_delay_ms);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling cancels active banners; enabling detects right away.
    pub fn set_enabled(&mut self, enabled: bool, now: Millis) {
        self.enabled = enabled;
        if enabled {
            self.detection_attempts = 0;
            self.detection_at = Some(now);
        } else {
            self.banners.clear();
            self.detection_at = None;
            self.mutation_debounce.cancel();
        }
    }

    pub fn on_mutation(&mut self, now: Millis) {
        if self.enabled {
            self.mutation_debounce.trigger(now);
        }
    }

    /// Same-document navigation: forget everything and detect afresh.
    pub fn on_url_change(&mut self, now: Millis) {
        if !self.enabled {
            return;
        }
        self.handled.clear();
        self.banners.clear();
        self.mutation_debounce.cancel();
        self.detection_attempts = 0;
        self.detection_at = Some(now + self.config.initial_delay_ms);
    }

    /// States of banners still being worked on.
    pub fn active_states(&self) -> Vec<BannerState> {
        self.banners.iter().map(|b| b.state).collect()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        if !self.enabled {
            return None;
        }
        earliest(
            [self.detection_at, self.mutation_debounce.deadline()]
                .into_iter()
                .chain(self.banners.iter().map(|b| Some(b.wake_at))),
        )
    }

    /// Run everything due at `now`.
    pub fn advance<D: Document<Node = N>>(&mut self, doc: &D, now: Millis) -> Vec<ResolverEvent> {
        let mut events = Vec::new();
        if !self.enabled {
            return events;
        }

        let mut detect = false;
        if self.detection_at.is_some_and(|at| now >= at) {
            self.detection_at = None;
            detect = true;
        }
        if self.mutation_debounce.fire_if_due(now) {
            detect = true;
        }
        if detect {
            self.detect(doc, now);
        }

        let mut banners = std::mem::take(&mut self.banners);
        for banner in banners.iter_mut().filter(|b| b.wake_at <= now) {
            if let Some(outcome) = self.step(doc, banner, now) {
                banner.state = match outcome {
                    Outcome::Dismissed => BannerState::Dismissed,
                    Outcome::Hidden => BannerState::Hidden,
                };
                log::info!(
                    "Consent banner {outcome:?} after {} attempt(s) ({:?})",
                    banner.attempt,
                    banner.method
                );
                events.push(ResolverEvent {
                    outcome,
                    method: banner.method,
                    attempts: banner.attempt,
                });
            }
        }
        banners.retain(|b| !b.state.is_final());
        self.banners = banners;

        events
    }

    // =========================================================================
    // Detection
    // =========================================================================

    fn overlaps_known(&self, node: &N, found: &[(N, DetectionMethod)]) -> bool {
        self.banners
            .iter()
            .map(|b| &b.element)
            .chain(found.iter().map(|(n, _)| n))
            .any(|known| known.contains(node) || node.contains(known))
    }

    fn detect<D: Document<Node = N>>(&mut self, doc: &D, now: Millis) {
        let root = doc.document_element();
        let mut found: Vec<(N, DetectionMethod)> = Vec::new();

        for selector in BANNER_SELECTORS.iter() {
            for node in query_all(&root, selector) {
                if self.handled.contains(&node) || !is_visible(&node) || self.overlaps_known(&node, &found) {
                    continue;
                }
                log::debug!("Consent banner matched '{selector}'");
                found.push((node, DetectionMethod::VendorSelector));
            }
        }

        if found.is_empty() && self.banners.is_empty() {
            if let Some(node) = self.text_search(&root) {
                found.push((node, DetectionMethod::TextHeuristic));
            }
        }

        if found.is_empty() {
            if self.banners.is_empty() && self.detection_attempts < self.config.max_attempts {
                self.detection_attempts += 1;
                let backoff = self.config.retry_delay_ms * Millis::from(self.detection_attempts);
                self.detection_at = Some(now + backoff);
                log::trace!(
                    "No consent banner yet, retry {} in {backoff} ms",
                    self.detection_attempts
                );
            }
            return;
        }

        for (element, method) in found {
            self.handled.insert(&element);
            self.banners.push(ActiveBanner {
                element,
                method,
                attempt: 1,
                state: BannerState::Detected,
                pending: Pending::Act,
                wake_at: now,
            });
        }
    }

    /// First visible dialog-shaped container with banner wording and a
    /// plausible amount of text.
    fn text_search(&self, root: &N) -> Option<N> {
        TEXT_CONTAINERS.iter().find_map(|selector| {
            query_all(root, selector).into_iter().find(|node| {
                if self.handled.contains(node) || !is_visible(node) {
                    return false;
                }
                let text = node.text_content();
                let len = text.trim().chars().count();
                len > self.config.min_text_len
                    && len < self.config.max_text_len
                    && has_banner_keyword(&text)
            })
        })
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    fn step<D: Document<Node = N>>(&self, doc: &D, banner: &mut ActiveBanner<N>, now: Millis) -> Option<Outcome> {
        match banner.pending {
            Pending::Act => self.act(doc, banner, now),
            Pending::Verify => {
                if !is_visible(&banner.element) {
                    return Some(Outcome::Dismissed);
                }
                if banner.attempt < self.config.max_attempts {
                    banner.attempt += 1;
                    return self.act(doc, banner, now);
                }
                hide_banner(doc, &banner.element);
                Some(Outcome::Hidden)
            }
            Pending::SettingsPanel => {
                let scope = doc.body().unwrap_or_else(|| doc.document_element());
                let control = find_control(&scope, &NECESSARY_ONLY).or_else(|| find_control(&scope, &SAVE));
                match control {
                    Some(control) => {
                        activate(&control);
                        banner.pending = Pending::Verify;
                        banner.wake_at = now + self.config.retry_delay_ms;
                        None
                    }
                    None => {
                        hide_banner(doc, &banner.element);
                        Some(Outcome::Hidden)
                    }
                }
            }
        }
    }

    fn act<D: Document<Node = N>>(&self, doc: &D, banner: &mut ActiveBanner<N>, now: Millis) -> Option<Outcome> {
        if let Some(control) = find_control(&banner.element, &NECESSARY_ONLY) {
            activate(&control);
            banner.state = BannerState::AttemptingNecessaryOnly;
            banner.pending = Pending::Verify;
            banner.wake_at = now + self.config.retry_delay_ms;
            return None;
        }

        if banner.attempt == 1 {
            if let Some(control) = find_control(&banner.element, &SETTINGS) {
                activate(&control);
                banner.state = BannerState::AttemptingSettingsPanel;
                banner.pending = Pending::SettingsPanel;
                banner.wake_at = now + self.config.settings_wait_ms;
                return None;
            }
        }

        if banner.attempt < self.config.max_attempts {
            banner.attempt += 1;
            banner.pending = Pending::Act;
            banner.wake_at = now + self.config.retry_delay_ms;
            return None;
        }

        hide_banner(doc, &banner.element);
        Some(Outcome::Hidden)
    }
}

// =============================================================================
// Controls
// =============================================================================

/// Labels a control is known by.
fn control_texts<N: DomNode>(node: &N) -> Vec<String> {
    std::iter::once(Some(node.text_content()))
        .chain(["aria-label", "title", "value", "alt"].iter().map(|a| node.attribute(a)))
        .flatten()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// First visible control in `container` whose label matches `patterns`.
/// Controls with any accept-all label are never returned.
pub fn find_control<N: DomNode>(container: &N, patterns: &[Regex]) -> Option<N> {
    for selector in CONTROL_SELECTORS.iter() {
        for node in query_all(container, selector) {
            if !is_visible(&node) {
                continue;
            }
            let texts = control_texts(&node);
            if texts.iter().any(|t| is_accept_all(t)) {
                log::trace!("Skipping accept-all control {node:?}");
                continue;
            }
            if texts.iter().any(|t| matches_any(patterns, t)) {
                return Some(node);
            }
        }
    }
    None
}

fn activate<N: DomNode>(control: &N) {
    log::debug!(
        "Clicking consent control '{}'",
        control.text_content().trim().chars().take(50).collect::<String>()
    );
    for event in SyntheticEvent::ACTIVATION {
        if let Err(err) = control.dispatch(event) {
            log::debug!("{event:?} on {control:?} failed: {err}");
        }
    }
}

/// Hide and remove a banner, its backdrops and its scroll lock.
pub fn hide_banner<D: Document>(doc: &D, banner: &D::Node) {
    for (name, value) in HIDE_DECLARATIONS {
        if let Err(err) = banner.set_style_property(name, value, true) {
            log::debug!("Could not set {name} on banner: {err}");
        }
    }
    if let Err(err) = banner.remove() {
        log::debug!("Banner left in place, hidden: {err}");
    }

    let root = doc.document_element();
    for selector in OVERLAY_SELECTORS.iter() {
        for overlay in query_all(&root, selector) {
            let _ = overlay.set_style_property("display", "none", true);
            if let Err(err) = overlay.remove() {
                log::debug!("Overlay left in place, hidden: {err}");
            }
        }
    }

    let body = doc.body();
    for node in std::iter::once(root).chain(body.clone()) {
        if node.style_property("overflow").as_deref() == Some("hidden") {
            node.remove_style_property("overflow");
        }
    }

    if let Some(body) = body {
        let class_name = body.class_name();
        let kept: Vec<&str> = class_name
            .split_whitespace()
            .filter(|c| !SCROLL_LOCK_CLASS_FRAGMENTS.iter().any(|f| c.contains(f)))
            .collect();
        if kept.len() != class_name.split_whitespace().count() {
            if let Err(err) = body.set_attribute("class", &kept.join(" ")) {
                log::debug!("Could not clear scroll lock classes: {err}");
            }
        }
    }
}
