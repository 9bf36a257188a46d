//! Page runtime
//!
//! One instance per page load. The host feeds it page events and the current
//! time, then calls [`PageRuntime::advance`] at or after
//! [`PageRuntime::next_deadline`]. All timers are virtual, so the same loop
//! runs under a browser event loop or a test harness.

use crate::classifier::{Classifier, ScanReport};
use crate::config::RuntimeConfig;
use crate::consent::{ConsentResolver, ResolverEvent};
use crate::cosmetic::{self, CosmeticArtifacts};
use crate::dom::Document;
use crate::interceptor::{InstallReport, Interceptor, PageGlobals};
use crate::schedule::{earliest, Debouncer, Interval, Millis};
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// Subtree insertions under `<body>`
    DomMutated,
    /// Same-document navigation to the given URL
    UrlChanged(String),
    SettingsChanged(Settings),
}

/// Work done by one call into the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tick {
    pub install: Option<InstallReport>,
    pub scans: Vec<ScanReport>,
    pub consent: Vec<ResolverEvent>,
}

pub struct PageRuntime<D: Document, G: PageGlobals> {
    doc: D,
    globals: G,
    config: RuntimeConfig,
    settings: Settings,
    cosmetics: Option<CosmeticArtifacts>,
    classifier: Classifier<D::Node>,
    consent: ConsentResolver<D::Node>,
    interceptor: Interceptor,
    scan_debounce: Debouncer,
    sweep: Interval,
    rescan_at: Option<Millis>,
}

impl<D: Document, G: PageGlobals> PageRuntime<D, G> {
    pub fn new(doc: D, globals: G, config: RuntimeConfig, settings: Settings) -> Self {
        Self {
            classifier: Classifier::new(config.classifier.clone()),
            consent: ConsentResolver::new(config.consent.clone()),
            interceptor: Interceptor::new(),
            scan_debounce: Debouncer::new(config.classifier.scan_debounce_ms),
            sweep: Interval::new(config.classifier.sweep_interval_ms),
            rescan_at: None,
            cosmetics: None,
            doc,
            globals,
            config,
            settings,
        }
    }

    /// Cached cosmetic artifacts to inject while cosmetic blocking is on.
    pub fn with_cosmetics(mut self, artifacts: CosmeticArtifacts) -> Self {
        self.cosmetics = Some(artifacts);
        self
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Decision surface for the installed wrappers.
    pub fn interceptor_mut(&mut self) -> &mut Interceptor {
        &mut self.interceptor
    }

    pub fn start(&mut self, now: Millis) -> Tick {
        let mut tick = Tick::default();
        if self.settings.ad_blocking {
            tick.install = Some(self.interceptor.install(&mut self.globals));
        } else {
            self.interceptor.set_enabled(false);
        }
        if self.settings.cosmetic_blocking {
            self.enable_cosmetic(now, &mut tick);
        }
        if self.settings.cookie_banner_blocking {
            self.consent.start(now);
        }
        log::debug!("Page runtime started with {:?}", self.settings);
        tick
    }

    pub fn handle(&mut self, event: PageEvent, now: Millis) -> Tick {
        let mut tick = Tick::default();
        match event {
            PageEvent::DomMutated => {
                if self.settings.cosmetic_blocking {
                    self.scan_debounce.trigger(now);
                }
                self.consent.on_mutation(now);
            }
            PageEvent::UrlChanged(url) => {
                log::debug!("Navigated to {url}");
                if self.settings.cosmetic_blocking {
                    self.rescan_at = Some(now + self.config.classifier.navigation_rescan_ms);
                    if let Some(artifacts) = &self.cosmetics {
                        cosmetic::inject(&self.doc, artifacts);
                    }
                }
                self.consent.on_url_change(now);
            }
            PageEvent::SettingsChanged(new) => self.apply_settings(new, now, &mut tick),
        }
        tick
    }

    fn apply_settings(&mut self, new: Settings, now: Millis, tick: &mut Tick) {
        let diff = self.settings.diff(&new);
        self.settings = new;
        if diff.is_empty() {
            return;
        }
        log::info!("Settings changed: {diff:?}");

        match diff.ad_blocking {
            Some(true) => {
                self.interceptor.set_enabled(true);
                tick.install = Some(self.interceptor.install(&mut self.globals));
            }
            Some(false) => self.interceptor.set_enabled(false),
            None => {}
        }

        match diff.cosmetic_blocking {
            Some(true) => self.enable_cosmetic(now, tick),
            Some(false) => {
                self.classifier.teardown(&self.doc);
                cosmetic::teardown(&self.doc);
                self.scan_debounce.cancel();
                self.sweep.stop();
                self.rescan_at = None;
            }
            None => {}
        }

        if let Some(enabled) = diff.cookie_banner_blocking {
            self.consent.set_enabled(enabled, now);
        }
    }

    fn enable_cosmetic(&mut self, now: Millis, tick: &mut Tick) {
        if let Some(artifacts) = &self.cosmetics {
            cosmetic::inject(&self.doc, artifacts);
        }
        tick.scans.push(self.classifier.scan(&self.doc));
        self.sweep.start(now);
    }

    /// Run all work due at `now`.
    pub fn advance(&mut self, now: Millis) -> Tick {
        let mut tick = Tick::default();

        if self.settings.cosmetic_blocking {
            // Evaluate every timer so each one is consumed.
            let debounced = self.scan_debounce.fire_if_due(now);
            let swept = self.sweep.fire_if_due(now);
            let navigated = self.rescan_at.is_some_and(|at| now >= at);
            if navigated {
                self.rescan_at = None;
            }
            if debounced || swept || navigated {
                tick.scans.push(self.classifier.scan(&self.doc));
            }
        }

        tick.consent = self.consent.advance(&self.doc, now);
        tick
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        earliest([
            self.scan_debounce.deadline(),
            self.sweep.deadline(),
            self.rescan_at,
            self.consent.next_deadline(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PAGE_STYLE_ID;
    use crate::consent::Outcome;
    use crate::cosmetic::GENERIC_STYLE_ID;
    use crate::dom::memory::{ClickAction, MemoryDocument, MemoryNode};
    use crate::dom::DomNode;
    use crate::interceptor::{MemoryGlobals, OpenDecision, INSTALL_GUARD};

    type Runtime = PageRuntime<MemoryDocument, MemoryGlobals>;

    fn runtime(doc: &MemoryDocument, settings: Settings) -> Runtime {
        let artifacts = CosmeticArtifacts {
            generic_css: ".ad-banner {\n  display: none !important;\n}\n\n".into(),
            ..CosmeticArtifacts::default()
        };
        PageRuntime::new(doc.clone(), MemoryGlobals::new(), RuntimeConfig::default(), settings)
            .with_cosmetics(artifacts)
    }

    fn ad(doc: &MemoryDocument) -> MemoryNode {
        doc.element("div")
            .class("ad-unit")
            .attr("data-google-query-id", "q1")
            .append_to(&doc.body_node())
    }

    #[test]
    fn test_start_runs_every_subsystem() {
        let doc = MemoryDocument::new();
        let early = ad(&doc);
        let mut runtime = runtime(&doc, Settings::default());

        let tick = runtime.start(0);
        let install = tick.install.unwrap();
        assert!(!install.already_installed);
        assert_eq!(tick.scans.len(), 1);
        assert_eq!(tick.scans[0].removed, 1);
        assert!(!early.is_connected());
        assert!(doc.get_element_by_id(GENERIC_STYLE_ID).is_some());
        assert!(doc.get_element_by_id(PAGE_STYLE_ID).is_some());
        assert!(runtime.globals.has_flag(INSTALL_GUARD));

        // Consent detection waits for its initial delay.
        assert_eq!(runtime.next_deadline(), Some(1500));
    }

    #[test]
    fn test_mutations_are_debounced() {
        let doc = MemoryDocument::new();
        let settings = Settings {
            cookie_banner_blocking: false,
            ..Settings::default()
        };
        let mut runtime = runtime(&doc, settings);
        runtime.start(0);

        let late = ad(&doc);
        runtime.handle(PageEvent::DomMutated, 100);
        runtime.handle(PageEvent::DomMutated, 200);
        assert_eq!(runtime.next_deadline(), Some(700));

        assert!(runtime.advance(699).scans.is_empty());
        let tick = runtime.advance(700);
        assert_eq!(tick.scans.len(), 1);
        assert!(!late.is_connected());
    }

    #[test]
    fn test_periodic_sweep() {
        let doc = MemoryDocument::new();
        let settings = Settings {
            cookie_banner_blocking: false,
            ..Settings::default()
        };
        let mut runtime = runtime(&doc, settings);
        runtime.start(0);

        let unobserved = ad(&doc);
        assert_eq!(runtime.next_deadline(), Some(2000));
        assert_eq!(runtime.advance(2000).scans[0].removed, 1);
        assert!(!unobserved.is_connected());
        assert_eq!(runtime.next_deadline(), Some(4000));
    }

    #[test]
    fn test_navigation_rescans() {
        let doc = MemoryDocument::new();
        let mut runtime = runtime(&doc, Settings::default());
        runtime.start(0);

        doc.set_url("https://example.com/next");
        let next = ad(&doc);
        runtime.handle(PageEvent::UrlChanged(doc.url()), 1000);
        assert_eq!(runtime.next_deadline(), Some(1500));

        let tick = runtime.advance(1500);
        assert_eq!(tick.scans.len(), 1);
        assert!(!next.is_connected());
    }

    #[test]
    fn test_disabling_cosmetic_tears_down() {
        let doc = MemoryDocument::new();
        let mut runtime = runtime(&doc, Settings::default());
        runtime.start(0);

        let off = Settings {
            cosmetic_blocking: false,
            ..Settings::default()
        };
        runtime.handle(PageEvent::SettingsChanged(off), 100);
        assert!(doc.get_element_by_id(GENERIC_STYLE_ID).is_none());
        assert!(doc.get_element_by_id(PAGE_STYLE_ID).is_none());

        let survivor = ad(&doc);
        runtime.handle(PageEvent::DomMutated, 200);
        assert!(runtime.advance(5000).scans.is_empty());
        assert!(survivor.is_connected());

        let tick = runtime.handle(PageEvent::SettingsChanged(Settings::default()), 6000);
        assert_eq!(tick.scans[0].removed, 1);
    }

    #[test]
    fn test_ad_blocking_toggle_controls_interceptor() {
        let doc = MemoryDocument::new();
        let off = Settings {
            ad_blocking: false,
            ..Settings::default()
        };
        let mut runtime = runtime(&doc, off);
        assert!(runtime.start(0).install.is_none());
        assert_eq!(runtime.interceptor_mut().window_open(None, false), OpenDecision::Allow);

        let tick = runtime.handle(PageEvent::SettingsChanged(Settings::default()), 10);
        assert!(tick.install.is_some());
        assert!(matches!(
            runtime.interceptor_mut().window_open(None, false),
            OpenDecision::Block(_)
        ));
    }

    #[test]
    fn test_consent_runs_inside_loop() {
        let doc = MemoryDocument::new();
        let banner = doc
            .element("div")
            .id("CybotCookiebotDialog")
            .text("This website uses cookies. ")
            .append_to(&doc.body_node());
        doc.element("button")
            .text("Use necessary cookies only")
            .on_click(ClickAction::Remove(banner.clone()))
            .append_to(&banner);

        let mut runtime = runtime(&doc, Settings::default());
        runtime.start(0);

        let mut outcomes = Vec::new();
        while let Some(at) = runtime.next_deadline() {
            if at > 5000 {
                break;
            }
            outcomes.extend(runtime.advance(at).consent.into_iter().map(|e| e.outcome));
        }
        assert_eq!(outcomes, vec![Outcome::Dismissed]);
        assert!(!banner.is_connected());
    }
}
