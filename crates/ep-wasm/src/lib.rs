//! WebAssembly bindings for Echo Privacy
//!
//! The extension's service worker fetches the configured lists itself and
//! hands the bodies to [`compile_filter_lists`]; content scripts ask for the
//! per-host stylesheet and either drive a whole page through [`EchoPage`] or
//! route intercepted page calls through [`PopupGuard`].

pub mod dom;
pub mod globals;

use ep_compiler::{build, CompileReport, CompilerConfig, ListInput, ListSpec};
use ep_core::artifact::{domain_map_to_json, network_rules_to_json};
use ep_core::psl::{is_same_site, is_third_party, registrable_domain};
use ep_core::url::extract_host;
use ep_runtime::consent::{DetectionMethod, Outcome};
use ep_runtime::cosmetic::CosmeticArtifacts;
use ep_runtime::interceptor::{Interceptor, OpenDecision};
use ep_runtime::{Millis, PageEvent, PageRuntime, RuntimeConfig, Settings, Tick};
use wasm_bindgen::prelude::*;

use crate::dom::WebDocument;
use crate::globals::WebGlobals;

// =============================================================================
// Compilation
// =============================================================================

/// Serialized artifacts of one compilation.
#[derive(Debug)]
pub struct CompiledArtifacts {
    pub network_rules_json: String,
    pub generic_css: String,
    pub domain_selectors_json: String,
    pub generated_at: String,
    pub source_list_version: String,
    pub report: CompileReport,
}

/// Compile list bodies in order; list `i` gets namespace `i`.
pub fn compile_texts(texts: &[String]) -> Result<CompiledArtifacts, String> {
    if texts.is_empty() {
        return Err("No list texts provided".to_string());
    }

    let mut lists = Vec::with_capacity(texts.len());
    for (idx, text) in texts.iter().enumerate() {
        let namespace = u16::try_from(idx).map_err(|_| format!("Too many lists: {}", texts.len()))?;
        let spec = ListSpec::new(format!("list-{idx}"), "", namespace);
        lists.push(ListInput::fetched(spec, text.as_str()));
    }

    let config = CompilerConfig {
        lists: lists.iter().map(|l| l.spec.clone()).collect(),
        ..CompilerConfig::default()
    };
    config.validate().map_err(|e| e.to_string())?;

    let (ruleset, report) = build(&lists, &config);
    Ok(CompiledArtifacts {
        network_rules_json: network_rules_to_json(&ruleset.network_rules).map_err(|e| e.to_string())?,
        domain_selectors_json: domain_map_to_json(&ruleset.domain_selectors).map_err(|e| e.to_string())?,
        generic_css: ruleset.generic_css,
        generated_at: ruleset.generated_at.to_rfc3339(),
        source_list_version: ruleset.source_list_version,
        report,
    })
}

fn parse_json(json: &str) -> Result<JsValue, JsValue> {
    js_sys::JSON::parse(json)
}

#[wasm_bindgen]
pub fn compile_filter_lists(list_texts: JsValue) -> Result<JsValue, JsValue> {
    let list_array = js_sys::Array::from(&list_texts);
    let mut texts = Vec::with_capacity(list_array.length() as usize);
    for value in list_array.iter() {
        let text = value
            .as_string()
            .ok_or_else(|| JsValue::from_str("List text must be a string"))?;
        texts.push(text);
    }

    let artifacts = compile_texts(&texts).map_err(|e| JsValue::from_str(&e))?;

    for list in &artifacts.report.lists {
        if list.capped > 0 {
            web_sys::console::warn_1(&JsValue::from_str(&format!(
                "{}: {} rules dropped by rule caps",
                list.name, list.capped
            )));
        }
    }

    let js_result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&js_result, &"networkRules".into(), &parse_json(&artifacts.network_rules_json)?);
    let _ = js_sys::Reflect::set(&js_result, &"genericCss".into(), &JsValue::from_str(&artifacts.generic_css));
    let _ = js_sys::Reflect::set(
        &js_result,
        &"domainSelectors".into(),
        &parse_json(&artifacts.domain_selectors_json)?,
    );
    let _ = js_sys::Reflect::set(&js_result, &"generatedAt".into(), &JsValue::from_str(&artifacts.generated_at));
    let _ = js_sys::Reflect::set(
        &js_result,
        &"sourceListVersion".into(),
        &JsValue::from_str(&artifacts.source_list_version),
    );

    let list_stats = js_sys::Array::new();
    for list in &artifacts.report.lists {
        let stat = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&stat, &"name".into(), &JsValue::from_str(&list.name));
        let _ = js_sys::Reflect::set(&stat, &"lines".into(), &JsValue::from(list.lines as u32));
        let _ = js_sys::Reflect::set(&stat, &"blockRules".into(), &JsValue::from(list.block_rules as u32));
        let _ = js_sys::Reflect::set(&stat, &"exceptionRules".into(), &JsValue::from(list.exception_rules as u32));
        let _ = js_sys::Reflect::set(&stat, &"dropped".into(), &JsValue::from(list.dropped as u32));
        let _ = js_sys::Reflect::set(&stat, &"capped".into(), &JsValue::from(list.capped as u32));
        list_stats.push(&stat);
    }
    let _ = js_sys::Reflect::set(&js_result, &"listStats".into(), &list_stats);

    Ok(js_result.into())
}

// =============================================================================
// Cosmetic Lookup
// =============================================================================

/// Hiding stylesheet for `host`; empty when no selector applies.
pub fn css_for_host(domain_map_json: &str, host: &str) -> Result<String, String> {
    let artifacts = CosmeticArtifacts::from_json("", domain_map_json).map_err(|e| e.to_string())?;
    Ok(artifacts.css_for_host(host).unwrap_or_default())
}

#[wasm_bindgen]
pub fn cosmetic_css_for_host(domain_map_json: &str, host: &str) -> Result<String, JsValue> {
    css_for_host(domain_map_json, host).map_err(|e| JsValue::from_str(&e))
}

// =============================================================================
// Page Interception
// =============================================================================

/// Per-page decision surface for the wrapped page APIs.
#[wasm_bindgen]
#[derive(Debug, Default)]
pub struct PopupGuard {
    interceptor: Interceptor,
}

#[wasm_bindgen]
impl PopupGuard {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.interceptor.set_enabled(enabled);
    }

    /// True when the `window.open` call may proceed.
    pub fn allow_open(&mut self, url: Option<String>, user_activation: bool) -> bool {
        self.interceptor.window_open(url.as_deref(), user_activation) == OpenDecision::Allow
    }

    /// True when the service worker may register.
    pub fn allow_service_worker(&mut self, script_url: &str) -> bool {
        self.interceptor.register_service_worker(script_url).is_ok()
    }

    /// True when the anchor click must be cancelled.
    pub fn cancel_link(&mut self, href: &str, target: Option<String>) -> bool {
        self.interceptor.link_click(href, target.as_deref())
    }

    pub fn stats(&self) -> JsValue {
        let stats = self.interceptor.stats();
        let result = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&result, &"popupsBlocked".into(), &JsValue::from(stats.popups_blocked as u32));
        let _ = js_sys::Reflect::set(&result, &"workersBlocked".into(), &JsValue::from(stats.workers_blocked as u32));
        let _ = js_sys::Reflect::set(&result, &"linksBlocked".into(), &JsValue::from(stats.links_blocked as u32));
        result.into()
    }
}

// =============================================================================
// Page Runtime
// =============================================================================

/// Clamp a JS timestamp to the runtime clock.
pub fn to_millis(now: f64) -> Millis {
    if now.is_finite() && now > 0.0 {
        now as Millis
    } else {
        0
    }
}

fn outcome_name(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Dismissed => "dismissed",
        Outcome::Hidden => "hidden",
    }
}

fn method_name(method: DetectionMethod) -> &'static str {
    match method {
        DetectionMethod::VendorSelector => "vendorSelector",
        DetectionMethod::TextHeuristic => "textHeuristic",
    }
}

fn tick_to_js(tick: &Tick) -> JsValue {
    let result = js_sys::Object::new();
    if let Some(install) = &tick.install {
        let _ = js_sys::Reflect::set(&result, &"alreadyInstalled".into(), &JsValue::from_bool(install.already_installed));
        let _ = js_sys::Reflect::set(&result, &"replaced".into(), &JsValue::from(install.replaced.len() as u32));
        let _ = js_sys::Reflect::set(&result, &"skipped".into(), &JsValue::from(install.skipped.len() as u32));
    }

    let removed: usize = tick.scans.iter().map(|s| s.removed).sum();
    let hidden: usize = tick.scans.iter().map(|s| s.hidden).sum();
    let _ = js_sys::Reflect::set(&result, &"scans".into(), &JsValue::from(tick.scans.len() as u32));
    let _ = js_sys::Reflect::set(&result, &"removed".into(), &JsValue::from(removed as u32));
    let _ = js_sys::Reflect::set(&result, &"hidden".into(), &JsValue::from(hidden as u32));

    let consent = js_sys::Array::new();
    for event in &tick.consent {
        let entry = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&entry, &"outcome".into(), &JsValue::from_str(outcome_name(event.outcome)));
        let _ = js_sys::Reflect::set(&entry, &"method".into(), &JsValue::from_str(method_name(event.method)));
        let _ = js_sys::Reflect::set(&entry, &"attempts".into(), &JsValue::from(event.attempts));
        consent.push(&entry);
    }
    let _ = js_sys::Reflect::set(&result, &"consent".into(), &consent);
    result.into()
}

/// The runtime bound to the live page. The content script forwards DOM
/// mutations, navigations, settings changes and timer callbacks, and calls
/// `advance` once `nextDeadline` has passed.
#[wasm_bindgen]
pub struct EchoPage {
    runtime: PageRuntime<WebDocument, WebGlobals>,
}

#[wasm_bindgen]
impl EchoPage {
    #[wasm_bindgen(constructor)]
    pub fn new(
        installer: js_sys::Function,
        settings_json: &str,
        config_json: Option<String>,
        generic_css: Option<String>,
        domain_map_json: Option<String>,
    ) -> Result<EchoPage, JsValue> {
        let doc = WebDocument::current().map_err(|e| JsValue::from_str(&e.to_string()))?;
        let settings = Settings::from_json(settings_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let config = match config_json {
            Some(json) => RuntimeConfig::from_json(&json).map_err(|e| JsValue::from_str(&e.to_string()))?,
            None => RuntimeConfig::default(),
        };

        let mut runtime = PageRuntime::new(doc, WebGlobals::new(installer), config, settings);
        if let Some(domain_map_json) = domain_map_json {
            let artifacts = CosmeticArtifacts::from_json(generic_css.unwrap_or_default(), &domain_map_json)
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            runtime = runtime.with_cosmetics(artifacts);
        }
        Ok(Self { runtime })
    }

    pub fn start(&mut self, now: f64) -> JsValue {
        tick_to_js(&self.runtime.start(to_millis(now)))
    }

    pub fn dom_mutated(&mut self, now: f64) -> JsValue {
        tick_to_js(&self.runtime.handle(PageEvent::DomMutated, to_millis(now)))
    }

    pub fn url_changed(&mut self, url: String, now: f64) -> JsValue {
        tick_to_js(&self.runtime.handle(PageEvent::UrlChanged(url), to_millis(now)))
    }

    pub fn settings_changed(&mut self, settings_json: &str, now: f64) -> Result<JsValue, JsValue> {
        let settings = Settings::from_json(settings_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(tick_to_js(
            &self.runtime.handle(PageEvent::SettingsChanged(settings), to_millis(now)),
        ))
    }

    pub fn advance(&mut self, now: f64) -> JsValue {
        tick_to_js(&self.runtime.advance(to_millis(now)))
    }

    /// Next time `advance` has work, or `undefined` when idle.
    pub fn next_deadline(&self) -> Option<f64> {
        self.runtime.next_deadline().map(|at| at as f64)
    }

    pub fn allow_open(&mut self, url: Option<String>, user_activation: bool) -> bool {
        self.runtime.interceptor_mut().window_open(url.as_deref(), user_activation) == OpenDecision::Allow
    }

    pub fn allow_service_worker(&mut self, script_url: &str) -> bool {
        self.runtime.interceptor_mut().register_service_worker(script_url).is_ok()
    }

    pub fn cancel_link(&mut self, href: &str, target: Option<String>) -> bool {
        self.runtime.interceptor_mut().link_click(href, target.as_deref())
    }
}

// =============================================================================
// Domain Helpers
// =============================================================================

#[wasm_bindgen]
pub fn registrable_domain_js(host: &str) -> String {
    registrable_domain(host)
}

#[wasm_bindgen]
pub fn is_same_site_js(host1: &str, host2: &str) -> bool {
    is_same_site(host1, host2)
}

#[wasm_bindgen]
pub fn is_third_party_js(site_host: &str, req_host: &str) -> bool {
    is_third_party(site_host, req_host)
}

#[wasm_bindgen]
pub fn extract_host_js(url: &str) -> Option<String> {
    extract_host(url).map(|h| h.to_string())
}
