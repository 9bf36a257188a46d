//! Behavioral interceptor
//!
//! Decides what the page-level wrappers do: which `window.open` calls go
//! through, which service workers may register, which ad links may open, and
//! which globals get replaced so anti-adblock scripts see ads running. The
//! page glue installs the wrappers through [`PageGlobals`] and forwards each
//! intercepted call to the matching decision method.
//!
//! Installation happens once per page. A page-global guard flag makes any
//! later install a no-op, since wrapping an already wrapped native corrupts
//! its call semantics.

use std::collections::{BTreeMap, HashSet};

use crate::classifier::contains_at_word_start;

pub const INSTALL_GUARD: &str = "__echoAdBlockerInjected";

const AD_URL_KEYWORDS: &[&str] = &[
    "/ads/",
    "doubleclick",
    "googlesyndication",
    "popup",
    "popunder",
    "redirect",
    "aff=",
    "affiliate",
    "banner",
    "promo",
];

/// Host-label keywords, matched only at the start of a word.
const AD_HOST_PREFIXES: &[&str] = &["ad.", "click.", "track."];

const PUSH_WORKER_KEYWORDS: &[&str] = &["push", "notification", "onesignal"];

const AD_LINK_KEYWORDS: &[&str] = &["/ads/", "doubleclick", "redirect", "affiliate", "aff="];

// =============================================================================
// Replacements
// =============================================================================

/// What a redefined global evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubValue {
    Undefined,
    Bool(bool),
}

/// Stub objects standing in for ad tag managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdTag {
    /// `{loaded: true, push() {}}`
    AdsByGoogle,
    /// Command queue that runs callbacks, plus no-op slot and service methods
    GoogleTag,
}

/// The replacement installed at a global path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    /// Accessor returning a constant; writes are ignored
    Value(StubValue),
    AdTag(AdTag),
    /// Detector class whose instances report "not detected"
    DetectorClass,
    DetectorInstance,
    /// Function returning `false`
    NotDetected,
    /// Routes calls through [`Interceptor::window_open`]
    WindowOpenGuard,
    /// Permission `denied`; requests resolve `denied`; prototype kept
    DeniedNotification,
    /// `subscribe` rejects and `getSubscription` resolves empty
    EmptyPushManager,
    /// Routes calls through [`Interceptor::register_service_worker`]
    ServiceWorkerGuard,
    /// Capture-phase click listener using [`Interceptor::link_click`]
    LinkClickGuard,
}

/// Globals replaced to defeat anti-adblock detection.
pub const ANTI_ADBLOCK_CATALOG: &[(&str, Replacement)] = &[
    ("adsbygoogle", Replacement::AdTag(AdTag::AdsByGoogle)),
    ("google_ad_client", Replacement::Value(StubValue::Undefined)),
    ("googletag", Replacement::AdTag(AdTag::GoogleTag)),
    ("google_ads", Replacement::Value(StubValue::Undefined)),
    ("__google_ad_urls", Replacement::Value(StubValue::Undefined)),
    ("googlefc", Replacement::Value(StubValue::Undefined)),
    ("adBlocker", Replacement::Value(StubValue::Undefined)),
    ("adblockDetector", Replacement::Value(StubValue::Undefined)),
    ("blockAdBlock", Replacement::DetectorInstance),
    ("fuckAdBlock", Replacement::DetectorInstance),
    ("sniffAdBlock", Replacement::Value(StubValue::Undefined)),
    ("canRunAds", Replacement::Value(StubValue::Bool(true))),
    ("isAdBlockActive", Replacement::Value(StubValue::Undefined)),
    ("adBlockDetected", Replacement::Value(StubValue::Undefined)),
    ("adBlockEnabled", Replacement::Value(StubValue::Undefined)),
    ("hasAdblock", Replacement::Value(StubValue::Undefined)),
    ("detectAdBlock", Replacement::Value(StubValue::Undefined)),
    ("adblock_detected", Replacement::Value(StubValue::Undefined)),
    ("adblock_test", Replacement::Value(StubValue::Undefined)),
    ("BlockAdBlock", Replacement::DetectorClass),
    ("FuckAdBlock", Replacement::DetectorClass),
    ("detectAdBlocker", Replacement::NotDetected),
    ("checkAdBlocker", Replacement::NotDetected),
    ("isAdBlockerActive", Replacement::NotDetected),
];

/// Native entry points that may be missing on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageApi {
    WindowOpen,
    Notification,
    PushManager,
    ServiceWorker,
}

const API_WRAPPERS: &[(PageApi, &str, Replacement)] = &[
    (PageApi::WindowOpen, "window.open", Replacement::WindowOpenGuard),
    (PageApi::Notification, "window.Notification", Replacement::DeniedNotification),
    (PageApi::PushManager, "window.PushManager", Replacement::EmptyPushManager),
    (
        PageApi::ServiceWorker,
        "navigator.serviceWorker.register",
        Replacement::ServiceWorkerGuard,
    ),
];

const LINK_GUARD_PATH: &str = "document.click";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefineError {
    #[error("'{0}' is not configurable")]
    NonConfigurable(String),
    #[error("host rejected '{path}': {reason}")]
    Host { path: String, reason: String },
}

/// The page's global object, as seen by the installer.
pub trait PageGlobals {
    fn has_flag(&self, name: &str) -> bool;
    fn set_flag(&mut self, name: &str) -> Result<(), DefineError>;
    fn has_api(&self, api: PageApi) -> bool;
    fn define(&mut self, path: &str, replacement: Replacement) -> Result<(), DefineError>;
}

// =============================================================================
// Decisions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Missing URL or `about:blank`, typical of click hijacking
    NoDestination,
    AdKeyword,
    NoUserActivation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenDecision {
    Allow,
    /// The wrapper returns a null window handle
    Block(BlockReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("push service worker blocked")]
pub struct WorkerBlocked;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptStats {
    pub popups_blocked: u32,
    pub workers_blocked: u32,
    pub links_blocked: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub already_installed: bool,
    pub replaced: Vec<String>,
    pub skipped: Vec<(String, DefineError)>,
}

/// True when the URL should be treated as an ad destination.
pub fn is_ad_url(url: &str) -> bool {
    let url = url.to_lowercase();
    AD_URL_KEYWORDS.iter().any(|k| url.contains(k))
        || AD_HOST_PREFIXES.iter().any(|k| contains_at_word_start(&url, k))
}

fn is_ad_link(href: &str) -> bool {
    let href = href.to_lowercase();
    AD_LINK_KEYWORDS.iter().any(|k| href.contains(k))
        || AD_HOST_PREFIXES.iter().any(|k| contains_at_word_start(&href, k))
}

/// Per-page interceptor state.
#[derive(Debug, Clone)]
pub struct Interceptor {
    enabled: bool,
    installed: bool,
    stats: InterceptStats,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor {
    pub fn new() -> Self {
        Self {
            enabled: true,
            installed: false,
            stats: InterceptStats::default(),
        }
    }

    pub fn stats(&self) -> InterceptStats {
        self.stats
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Installed wrappers stay in place; while disabled they pass through.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Install wrappers and stubs. Never fails: globals that cannot be
    /// redefined are skipped and reported.
    pub fn install<G: PageGlobals>(&mut self, globals: &mut G) -> InstallReport {
        let mut report = InstallReport::default();

        if globals.has_flag(INSTALL_GUARD) {
            log::debug!("Interceptor already installed on this page");
            report.already_installed = true;
            self.installed = true;
            return report;
        }
        if let Err(err) = globals.set_flag(INSTALL_GUARD) {
            log::warn!("Could not set install guard: {err}");
        }

        let wrappers = API_WRAPPERS
            .iter()
            .filter(|(api, _, _)| globals.has_api(*api))
            .map(|(_, path, replacement)| (*path, *replacement))
            .collect::<Vec<_>>();
        let targets = wrappers
            .into_iter()
            .chain(std::iter::once((LINK_GUARD_PATH, Replacement::LinkClickGuard)))
            .chain(ANTI_ADBLOCK_CATALOG.iter().copied());

        for (path, replacement) in targets {
            match globals.define(path, replacement) {
                Ok(()) => report.replaced.push(path.to_string()),
                Err(err) => {
                    log::debug!("Skipping '{path}': {err}");
                    report.skipped.push((path.to_string(), err));
                }
            }
        }

        self.installed = true;
        log::debug!(
            "Interceptor installed: {} replaced, {} skipped",
            report.replaced.len(),
            report.skipped.len()
        );
        report
    }

    /// Decide an intercepted `window.open(url)`.
    pub fn window_open(&mut self, url: Option<&str>, user_activation: bool) -> OpenDecision {
        if !self.enabled {
            return OpenDecision::Allow;
        }

        let url = url.map(str::trim).unwrap_or_default();
        let decision = if url.is_empty() || url.eq_ignore_ascii_case("about:blank") {
            OpenDecision::Block(BlockReason::NoDestination)
        } else if is_ad_url(url) {
            OpenDecision::Block(BlockReason::AdKeyword)
        } else if !user_activation {
            OpenDecision::Block(BlockReason::NoUserActivation)
        } else {
            OpenDecision::Allow
        };

        if let OpenDecision::Block(reason) = decision {
            self.stats.popups_blocked += 1;
            log::debug!("Blocked popup ({reason:?}): {}", url.chars().take(60).collect::<String>());
        }
        decision
    }

    /// Decide an intercepted `navigator.serviceWorker.register(url)`.
    pub fn register_service_worker(&mut self, script_url: &str) -> Result<(), WorkerBlocked> {
        if !self.enabled {
            return Ok(());
        }
        let url = script_url.to_lowercase();
        if PUSH_WORKER_KEYWORDS.iter().any(|k| url.contains(k)) {
            self.stats.workers_blocked += 1;
            log::debug!("Blocked push service worker: {script_url}");
            return Err(WorkerBlocked);
        }
        Ok(())
    }

    /// Whether a click on an anchor should be cancelled.
    pub fn link_click(&mut self, href: &str, target: Option<&str>) -> bool {
        if !self.enabled || target != Some("_blank") || !is_ad_link(href) {
            return false;
        }
        self.stats.links_blocked += 1;
        log::debug!("Blocked ad link: {href}");
        true
    }
}

// =============================================================================
// In-memory Globals
// =============================================================================

/// A scriptable global object for non-browser harnesses.
#[derive(Debug, Clone)]
pub struct MemoryGlobals {
    flags: HashSet<String>,
    apis: HashSet<PageApi>,
    locked: HashSet<String>,
    defined: BTreeMap<String, Replacement>,
}

impl Default for MemoryGlobals {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGlobals {
    /// A page exposing every native API.
    pub fn new() -> Self {
        Self {
            flags: HashSet::new(),
            apis: [
                PageApi::WindowOpen,
                PageApi::Notification,
                PageApi::PushManager,
                PageApi::ServiceWorker,
            ]
            .into_iter()
            .collect(),
            locked: HashSet::new(),
            defined: BTreeMap::new(),
        }
    }

    pub fn without_api(mut self, api: PageApi) -> Self {
        self.apis.remove(&api);
        self
    }

    /// Make a path non-configurable.
    pub fn lock(mut self, path: &str) -> Self {
        self.locked.insert(path.to_string());
        self
    }

    pub fn replacement(&self, path: &str) -> Option<Replacement> {
        self.defined.get(path).copied()
    }

    pub fn defined_count(&self) -> usize {
        self.defined.len()
    }
}

impl PageGlobals for MemoryGlobals {
    fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    fn set_flag(&mut self, name: &str) -> Result<(), DefineError> {
        self.flags.insert(name.to_string());
        Ok(())
    }

    fn has_api(&self, api: PageApi) -> bool {
        self.apis.contains(&api)
    }

    fn define(&mut self, path: &str, replacement: Replacement) -> Result<(), DefineError> {
        if self.locked.contains(path) {
            return Err(DefineError::NonConfigurable(path.to_string()));
        }
        if self.defined.insert(path.to_string(), replacement).is_some() {
            log::trace!("Redefined '{path}'");
        }
        Ok(())
    }
}
