//! Element-hiding stylesheets and host lookup
//!
//! Shared between the compiler, which writes the generic stylesheet, and the
//! page runtime, which builds per-host stylesheets from the domain map.

use std::collections::{BTreeMap, HashSet};

use crate::psl::{normalize_host, walk_host_suffixes};

/// Selectors per generated rule block.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

pub const STYLESHEET_HEADER: &str = "/* Echo Privacy - Generated Cosmetic Rules */\n\
/* Auto-generated from EasyList - do not edit manually */\n\n";

const HIDE_DECLARATION: &str = " {\n  display: none !important;\n}\n\n";

/// Build a hiding stylesheet, `chunk_size` selectors per rule block.
///
/// A zero `chunk_size` is treated as one selector per block.
pub fn hiding_stylesheet<'a, I>(selectors: I, chunk_size: usize, with_header: bool) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let selectors: Vec<&str> = selectors.into_iter().collect();
    let mut css = String::new();
    if with_header {
        css.push_str(STYLESHEET_HEADER);
    }

    for chunk in selectors.chunks(chunk_size.max(1)) {
        css.push_str(&chunk.join(",\n"));
        css.push_str(HIDE_DECLARATION);
    }

    css
}

/// Selectors that apply to `host`: the union over its suffixes, most
/// specific first, down to the registrable domain.
pub fn selectors_for_host<'a>(map: &'a BTreeMap<String, Vec<String>>, host: &str) -> Vec<&'a str> {
    let host = normalize_host(host);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for suffix in walk_host_suffixes(&host) {
        if let Some(selectors) = map.get(suffix) {
            for selector in selectors {
                if seen.insert(selector.as_str()) {
                    out.push(selector.as_str());
                }
            }
        }
    }

    out
}
