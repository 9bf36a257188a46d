//! Page globals
//!
//! Replacements are installed by a JS function the content script passes in,
//! since only page-world script can define accessors and wrap natives. It is
//! called as `installer(path, descriptor)` and returns `false` when the
//! property is not configurable; a throw is reported as a host error.

use ep_runtime::interceptor::{AdTag, DefineError, PageApi, PageGlobals, Replacement, StubValue};
use wasm_bindgen::JsValue;

use crate::dom::js_error;

/// The `kind` field of a replacement descriptor.
pub fn replacement_kind(replacement: Replacement) -> &'static str {
    match replacement {
        Replacement::Value(_) => "value",
        Replacement::AdTag(_) => "adTag",
        Replacement::DetectorClass => "detectorClass",
        Replacement::DetectorInstance => "detectorInstance",
        Replacement::NotDetected => "notDetected",
        Replacement::WindowOpenGuard => "windowOpenGuard",
        Replacement::DeniedNotification => "deniedNotification",
        Replacement::EmptyPushManager => "emptyPushManager",
        Replacement::ServiceWorkerGuard => "serviceWorkerGuard",
        Replacement::LinkClickGuard => "linkClickGuard",
    }
}

fn ad_tag_name(tag: AdTag) -> &'static str {
    match tag {
        AdTag::AdsByGoogle => "adsbygoogle",
        AdTag::GoogleTag => "googletag",
    }
}

fn descriptor(replacement: Replacement) -> js_sys::Object {
    let object = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&object, &"kind".into(), &JsValue::from_str(replacement_kind(replacement)));
    match replacement {
        Replacement::Value(StubValue::Undefined) => {
            let _ = js_sys::Reflect::set(&object, &"value".into(), &JsValue::UNDEFINED);
        }
        Replacement::Value(StubValue::Bool(value)) => {
            let _ = js_sys::Reflect::set(&object, &"value".into(), &JsValue::from_bool(value));
        }
        Replacement::AdTag(tag) => {
            let _ = js_sys::Reflect::set(&object, &"tag".into(), &JsValue::from_str(ad_tag_name(tag)));
        }
        _ => {}
    }
    object
}

#[derive(Debug, Clone)]
pub struct WebGlobals {
    global: js_sys::Object,
    installer: js_sys::Function,
}

impl WebGlobals {
    pub fn new(installer: js_sys::Function) -> Self {
        Self {
            global: js_sys::global(),
            installer,
        }
    }

    fn has_property(&self, target: &JsValue, name: &str) -> bool {
        target.is_object() && js_sys::Reflect::has(target, &JsValue::from_str(name)).unwrap_or(false)
    }
}

impl PageGlobals for WebGlobals {
    fn has_flag(&self, name: &str) -> bool {
        js_sys::Reflect::get(&self.global, &JsValue::from_str(name))
            .map(|value| value.is_truthy())
            .unwrap_or(false)
    }

    fn set_flag(&mut self, name: &str) -> Result<(), DefineError> {
        js_sys::Reflect::set(&self.global, &JsValue::from_str(name), &JsValue::TRUE)
            .map(|_| ())
            .map_err(|e| DefineError::Host {
                path: name.to_string(),
                reason: js_error(&e),
            })
    }

    fn has_api(&self, api: PageApi) -> bool {
        match api {
            PageApi::WindowOpen => js_sys::Reflect::get(&self.global, &"open".into())
                .map(|open| open.is_function())
                .unwrap_or(false),
            PageApi::Notification => self.has_property(&self.global, "Notification"),
            PageApi::PushManager => self.has_property(&self.global, "PushManager"),
            PageApi::ServiceWorker => js_sys::Reflect::get(&self.global, &"navigator".into())
                .map(|navigator| self.has_property(&navigator, "serviceWorker"))
                .unwrap_or(false),
        }
    }

    fn define(&mut self, path: &str, replacement: Replacement) -> Result<(), DefineError> {
        let installed = self
            .installer
            .call2(&JsValue::NULL, &JsValue::from_str(path), &descriptor(replacement))
            .map_err(|e| DefineError::Host {
                path: path.to_string(),
                reason: js_error(&e),
            })?;
        if installed.as_bool() == Some(false) {
            return Err(DefineError::NonConfigurable(path.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ep_runtime::interceptor::ANTI_ADBLOCK_CATALOG;

    #[test]
    fn test_replacement_kinds() {
        assert_eq!(replacement_kind(Replacement::Value(StubValue::Bool(true))), "value");
        assert_eq!(replacement_kind(Replacement::AdTag(AdTag::GoogleTag)), "adTag");
        assert_eq!(replacement_kind(Replacement::WindowOpenGuard), "windowOpenGuard");
        assert_eq!(ad_tag_name(AdTag::AdsByGoogle), "adsbygoogle");

        for (path, replacement) in ANTI_ADBLOCK_CATALOG {
            assert!(!replacement_kind(*replacement).is_empty(), "{path}");
        }
    }
}
