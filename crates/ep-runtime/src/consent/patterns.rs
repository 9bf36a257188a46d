//! Consent banner catalogs.
//!
//! Vendor selectors are tried before the keyword search. Control texts are
//! matched against multilingual regex catalogs compiled once.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dom::selector::parse_catalog;
use crate::dom::Selector;

const BANNER_SELECTOR_SOURCES: &[&str] = &[
    // OneTrust
    "#onetrust-banner-sdk",
    "#onetrust-consent-sdk",
    ".onetrust-pc-dark-filter",
    "[class*=\"onetrust\"]",
    // Cookiebot
    "#CybotCookiebotDialog",
    "#CybotCookiebotDialogBodyUnderlay",
    ".CookieConsent",
    // Termly
    "#termly-code-snippet-support",
    "[data-name=\"termly-consent-banner\"]",
    // Osano
    ".osano-cm-dialog",
    ".osano-cm-widget",
    // TrustArc
    "#truste-consent-track",
    "#teconsent",
    "#cookielaw",
    ".cookielaw",
    // Quantcast
    "#qc-cmp2-container",
    ".qc-cmp2-container",
    "#cookie-notice",
    ".cookie-notice-container",
    ".gdpr-cookie-notice",
    ".gdpr-wrapper",
    // Evidon
    "#_evidon_banner",
    "#_evidon-barrier-wrapper",
    // Generic
    "[class*=\"cookie-banner\"]",
    "[class*=\"cookie-consent\"]",
    "[class*=\"cookie-notice\"]",
    "[class*=\"cookie-bar\"]",
    "[class*=\"cookiebar\"]",
    "[id*=\"cookie-banner\"]",
    "[id*=\"cookie-consent\"]",
    "[id*=\"cookie-notice\"]",
    "[id*=\"gdpr\"]",
    "[id*=\"privacy-notice\"]",
    "[aria-label*=\"cookie\" i]",
    "[aria-label*=\"consent\" i]",
    ".cc-window",
    ".cc-banner",
    ".cookie-modal",
    ".consent-modal",
];

const OVERLAY_SELECTOR_SOURCES: &[&str] = &[
    "[class*=\"cookie\"][class*=\"overlay\"]",
    "[class*=\"cookie\"][class*=\"backdrop\"]",
    "[class*=\"consent\"][class*=\"overlay\"]",
    "[class*=\"consent\"][class*=\"backdrop\"]",
    ".modal-backdrop",
    ".cdk-overlay-backdrop",
];

/// Clickable elements, in search order.
const CONTROL_SELECTOR_SOURCES: &[&str] = &[
    "button",
    "a[role=\"button\"]",
    "[role=\"button\"]",
    "input[type=\"button\"]",
    "input[type=\"submit\"]",
    "[onclick]",
    ".button",
    "[class*=\"button\"]",
    "[class*=\"btn\"]",
];

/// Dialog-shaped containers searched when no vendor selector matches.
const TEXT_CONTAINER_SOURCE: &str = "div, section, aside, [role=\"dialog\"], [role=\"banner\"]";

/// Words a banner found by text search must contain.
pub const BANNER_KEYWORDS: &[&str] = &["cookie", "consent", "privacy"];

const NECESSARY_ONLY_SOURCES: &[&str] = &[
    // English
    r"(?i)reject\s+all",
    r"(?i)reject\s+optional",
    r"(?i)decline\s+all",
    r"(?i)decline\s+optional",
    r"(?i)deny\s+all",
    r"(?i)refuse\s+all",
    r"(?i)necessary\s+only",
    r"(?i)essential\s+only",
    r"(?i)required\s+only",
    r"(?i)accept\s+necessary",
    r"(?i)accept\s+essential",
    r"(?i)accept\s+required",
    r"(?i)use\s+necessary",
    r"(?i)use\s+essential",
    r"(?i)reject\s+non-essential",
    r"(?i)decline\s+non-essential",
    r"(?i)essential\s+cookies?\s+only",
    r"(?i)necessary\s+cookies?\s+only",
    r"(?i)minimum",
    r"(?i)continue\s+without\s+accepting",
    r"(?i)no\s+thanks",
    r"(?i)i\s+decline",
    // German
    r"(?i)nur\s+notwendige",
    r"(?i)nur\s+erforderliche",
    r"(?i)ablehnen",
    r"(?i)nicht\s+akzeptieren",
    // French
    r"(?i)seulement\s+nécessaires",
    r"(?i)essentiels\s+seulement",
    r"(?i)refuser\s+tout",
    r"(?i)tout\s+refuser",
    r"(?i)continuer\s+sans\s+accepter",
    // Spanish
    r"(?i)solo\s+necesarias",
    r"(?i)denegar\s+todas",
    r"(?i)rechazar",
    // Italian
    r"(?i)solo\s+necessari",
    r"(?i)rifiuta",
    // Dutch
    r"(?i)alleen\s+noodzakelijk",
    r"(?i)weigeren",
    // Portuguese
    r"(?i)apenas\s+necessários",
    r"(?i)rejeitar",
];

const SETTINGS_SOURCES: &[&str] = &[
    r"(?i)settings",
    r"(?i)customi[sz]e",
    r"(?i)preferences",
    r"(?i)options",
    r"(?i)manage",
    r"(?i)einstellungen",
    r"(?i)anpassen",
    r"(?i)paramètres",
    r"(?i)personalizar",
    r"(?i)impostazioni",
    r"(?i)configurações",
];

const SAVE_SOURCES: &[&str] = &[
    r"(?i)\b(?:save|confirm|continue)\b",
    r"(?i)\b(?:speichern|bestätigen|enregistrer|confirmer|guardar|salva|opslaan|salvar)\b",
];

/// Texts of controls that grant full consent. Single words only count when
/// they are the whole label, so "Continue without accepting" stays eligible.
const ACCEPT_ALL_SOURCES: &[&str] = &[
    r"(?i)\baccept\s+all\b",
    r"(?i)\ballow\s+all\b",
    r"(?i)\baccept\s+cookies\b",
    r"(?i)\b(?:accept|agree|consent)\s+(?:and|&)\s+(?:continue|close|proceed|save)\b",
    r"(?i)\ballow\s+(?:all\s+)?(?:and|&)\s+(?:continue|close|proceed|save)\b",
    r"(?i)\b(?:save|confirm)\s+(?:and|&)\s+(?:accept|allow|agree)\b",
    r"(?i)\b(?:akzeptieren|zustimmen)\s+und\s+(?:weiter|schließen|speichern)\b",
    r"(?i)\baccepter\s+et\s+(?:continuer|fermer)\b",
    r"(?i)\baceptar\s+y\s+(?:continuar|cerrar)\b",
    r"(?i)\baccetta\s+e\s+(?:continua|chiudi)\b",
    r"(?i)\bi\s+agree\b",
    r"(?i)\bi\s+accept\b",
    r"(?i)\bi\s+understand\b",
    r"(?i)\bgot\s+it\b",
    r"(?i)\balle\s+akzeptieren\b",
    r"(?i)\btout\s+accepter\b",
    r"(?i)\baceptar\s+todas?\b",
    r"(?i)\baccetta\s+tutti\b",
    r"(?i)\balles\s+accepteren\b",
    r"(?i)\baceitar\s+todos\b",
    r"(?i)^\s*(?:ok|okay|yes|accept|agree|allow|consent|zustimmen|akzeptieren|accepter|aceptar|accetta|accettare|akkoord|aceitar)\s*[!.]?\s*$",
];

fn compile_patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .filter_map(|source| match Regex::new(source) {
            Ok(regex) => Some(regex),
            Err(err) => {
                log::warn!("Skipping pattern '{source}': {err}");
                None
            }
        })
        .collect()
}

pub static BANNER_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| parse_catalog(BANNER_SELECTOR_SOURCES));
pub static OVERLAY_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| parse_catalog(OVERLAY_SELECTOR_SOURCES));
pub static CONTROL_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| parse_catalog(CONTROL_SELECTOR_SOURCES));
pub static TEXT_CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| parse_catalog(&[TEXT_CONTAINER_SOURCE]));

pub static NECESSARY_ONLY: Lazy<Vec<Regex>> = Lazy::new(|| compile_patterns(NECESSARY_ONLY_SOURCES));
pub static SETTINGS: Lazy<Vec<Regex>> = Lazy::new(|| compile_patterns(SETTINGS_SOURCES));
pub static SAVE: Lazy<Vec<Regex>> = Lazy::new(|| compile_patterns(SAVE_SOURCES));
static ACCEPT_ALL: Lazy<Vec<Regex>> = Lazy::new(|| compile_patterns(ACCEPT_ALL_SOURCES));

pub fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

pub fn is_accept_all(text: &str) -> bool {
    matches_any(&ACCEPT_ALL, text)
}

pub fn has_banner_keyword(text: &str) -> bool {
    let text = text.to_lowercase();
    BANNER_KEYWORDS.iter().any(|k| text.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogs_compile() {
        assert_eq!(BANNER_SELECTORS.len(), BANNER_SELECTOR_SOURCES.len());
        assert_eq!(OVERLAY_SELECTORS.len(), OVERLAY_SELECTOR_SOURCES.len());
        assert_eq!(CONTROL_SELECTORS.len(), CONTROL_SELECTOR_SOURCES.len());
        assert_eq!(TEXT_CONTAINERS.len(), 1);
        assert_eq!(NECESSARY_ONLY.len(), NECESSARY_ONLY_SOURCES.len());
        assert_eq!(SETTINGS.len(), SETTINGS_SOURCES.len());
        assert_eq!(SAVE.len(), SAVE_SOURCES.len());
        assert_eq!(ACCEPT_ALL.len(), ACCEPT_ALL_SOURCES.len());
    }

    #[test]
    fn test_accept_all_gate() {
        for text in [
            "Accept all",
            "ACCEPT ALL COOKIES",
            "Allow all",
            "I agree",
            "Got it!",
            "OK",
            "Agree & continue",
            "Accept and save",
            "Accept & save",
            "Allow and continue",
            "Allow all & close",
            "Consent and continue",
            "Save & accept",
            "Akzeptieren und weiter",
            "Accepter et continuer",
            "Alle akzeptieren",
            "Tout accepter",
            "Accepter",
        ] {
            assert!(is_accept_all(text), "{text}");
        }

        for text in [
            "Reject all",
            "Continue without accepting",
            "Continuer sans accepter",
            "Accept necessary cookies",
            "Cookies",
            "Book now",
            "Manage preferences",
        ] {
            assert!(!is_accept_all(text), "{text}");
        }
    }

    #[test]
    fn test_multilingual_necessary_only() {
        for text in [
            "Reject All",
            "Necessary only",
            "Necessary cookies only",
            "Nur notwendige Cookies",
            "Alle ablehnen",
            "Tout refuser",
            "Rechazar todas",
            "Rifiuta tutti",
            "Alles weigeren",
            "Rejeitar todos",
        ] {
            assert!(matches_any(&NECESSARY_ONLY, text), "{text}");
        }
        assert!(!matches_any(&NECESSARY_ONLY, "Accept all"));
    }

    #[test]
    fn test_settings_and_save() {
        assert!(matches_any(&SETTINGS, "Cookie Settings"));
        assert!(matches_any(&SETTINGS, "Customise"));
        assert!(matches_any(&SAVE, "Save my choices"));
        assert!(matches_any(&SAVE, "Confirm"));
        assert!(!matches_any(&SAVE, "Saved articles"));

        // Save wording that also grants consent is caught by the gate.
        assert!(matches_any(&SAVE, "Accept and save"));
        assert!(is_accept_all("Accept and save"));
        assert!(!is_accept_all("Save my choices"));
        assert!(!is_accept_all("Confirm my choices"));
    }

    #[test]
    fn test_banner_keywords() {
        assert!(has_banner_keyword("This site uses COOKIES"));
        assert!(has_banner_keyword("Read our privacy policy"));
        assert!(!has_banner_keyword("Subscribe to our newsletter"));
    }
}
