//! Cosmetic stylesheet injection.

use std::collections::BTreeMap;

use ep_core::artifact::{domain_map_from_json, ArtifactError};
use ep_core::cosmetic::{hiding_stylesheet, selectors_for_host, DEFAULT_CHUNK_SIZE};
use ep_core::url::extract_host;

use crate::dom::{find_by_id, Document, DomNode};

pub const GENERIC_STYLE_ID: &str = "echo-cosmetic-generic";
pub const DOMAIN_STYLE_ID: &str = "echo-cosmetic-domain";

/// The cached cosmetic artifacts a page needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CosmeticArtifacts {
    pub generic_css: String,
    pub domain_selectors: BTreeMap<String, Vec<String>>,
}

impl CosmeticArtifacts {
    pub fn from_json(generic_css: impl Into<String>, domain_map_json: &str) -> Result<Self, ArtifactError> {
        Ok(Self {
            generic_css: generic_css.into(),
            domain_selectors: domain_map_from_json(domain_map_json)?,
        })
    }

    /// Hiding stylesheet for the selectors scoped to `host`, if any.
    pub fn css_for_host(&self, host: &str) -> Option<String> {
        let selectors = selectors_for_host(&self.domain_selectors, host);
        if selectors.is_empty() {
            return None;
        }
        Some(hiding_stylesheet(selectors, DEFAULT_CHUNK_SIZE, false))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectReport {
    pub generic: bool,
    pub domain: bool,
}

/// Create or refresh the style element with `id`.
fn upsert_style<D: Document>(doc: &D, id: &str, css: &str) -> bool {
    if let Some(existing) = find_by_id(&doc.document_element(), id) {
        existing.set_text_content(css);
        return true;
    }
    let parent = doc.head().unwrap_or_else(|| doc.document_element());
    let attached = doc.create_element("style").and_then(|style| {
        style.set_text_content(css);
        style.set_attribute("id", id)?;
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

fn remove_style<D: Document>(doc: &D, id: &str) {
    if let Some(style) = find_by_id(&doc.document_element(), id) {
        let _ = style.remove();
    }
}

/// Inject the generic stylesheet and the one for the page's host.
pub fn inject<D: Document>(doc: &D, artifacts: &CosmeticArtifacts) -> InjectReport {
    let mut report = InjectReport::default();
    if !artifacts.generic_css.is_empty() {
        report.generic = upsert_style(doc, GENERIC_STYLE_ID, &artifacts.generic_css);
    }

    let url = doc.url();
    let domain_css = extract_host(&url).and_then(|host| artifacts.css_for_host(host));
    match domain_css {
        Some(css) => report.domain = upsert_style(doc, DOMAIN_STYLE_ID, &css),
        None => remove_style(doc, DOMAIN_STYLE_ID),
    }
    report
}

pub fn teardown<D: Document>(doc: &D) {
    remove_style(doc, GENERIC_STYLE_ID);
    remove_style(doc, DOMAIN_STYLE_ID);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::MemoryDocument;

    fn artifacts() -> CosmeticArtifacts {
        CosmeticArtifacts::from_json(
            ".ad-banner {\n  display: none !important;\n}\n\n",
            r#"{"example.com": [".promo"], "news.example.com": [".sidebar-ad"]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_css_for_host() {
        let artifacts = artifacts();
        let css = artifacts.css_for_host("news.example.com").unwrap();
        assert_eq!(css, ".sidebar-ad,\n.promo {\n  display: none !important;\n}\n\n");
        assert!(artifacts.css_for_host("other.org").is_none());
    }

    #[test]
    fn test_inject_and_teardown() {
        let doc = MemoryDocument::new();
        doc.set_url("https://www.example.com/page");

        let report = inject(&doc, &artifacts());
        assert_eq!(report, InjectReport { generic: true, domain: true });
        let domain = doc.get_element_by_id(DOMAIN_STYLE_ID).unwrap();
        assert!(domain.text_content().contains(".promo"));

        // Reinjection refreshes in place.
        inject(&doc, &artifacts());
        assert_eq!(doc.head_node().children().len(), 2);

        teardown(&doc);
        assert!(doc.get_element_by_id(GENERIC_STYLE_ID).is_none());
        assert!(doc.get_element_by_id(DOMAIN_STYLE_ID).is_none());
    }

    #[test]
    fn test_navigation_to_unscoped_host_drops_domain_css() {
        let doc = MemoryDocument::new();
        doc.set_url("https://example.com/");
        inject(&doc, &artifacts());
        assert!(doc.get_element_by_id(DOMAIN_STYLE_ID).is_some());

        doc.set_url("https://elsewhere.net/");
        let report = inject(&doc, &artifacts());
        assert!(!report.domain);
        assert!(doc.get_element_by_id(DOMAIN_STYLE_ID).is_none());
    }

    #[test]
    fn test_bad_domain_map() {
        assert!(CosmeticArtifacts::from_json("", "[1, 2]").is_err());
    }
}
