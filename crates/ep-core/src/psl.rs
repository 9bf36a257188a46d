//! Registrable-domain (eTLD+1) utilities
//!
//! No public suffix data is shipped with the artifacts, so the registrable
//! domain is derived from a compact table of common multi-part suffixes.
//!
//! # Examples
//!
//! ```
//! use ep_core::psl::registrable_domain;
//!
//! assert_eq!(registrable_domain("sub.example.com"), "example.com");
//! assert_eq!(registrable_domain("sub.example.co.uk"), "example.co.uk");
//! ```

/// Common two-part public suffixes.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "com.tr", "com.ar", "com.sg",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Normalize a hostname for comparisons: lowercase, no trailing dot.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Get the registrable domain (eTLD+1) for a hostname.
pub fn registrable_domain(host: &str) -> String {
    let host = normalize_host(host);
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    registrable_from_labels(&labels)
}

fn registrable_from_labels(labels: &[&str]) -> String {
    let n = labels.len();
    if n <= 2 {
        return labels.join(".");
    }

    let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
    if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
        return labels[n - 3..].join(".");
    }

    labels[n - 2..].join(".")
}

/// Check if two hosts share the same registrable domain.
pub fn is_same_site(host1: &str, host2: &str) -> bool {
    registrable_domain(host1) == registrable_domain(host2)
}

/// Check if a request is third-party relative to the page host.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    !is_same_site(site_host, req_host)
}

/// Check whether `host` equals `domain` or is one of its subdomains.
pub fn is_subdomain_of(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').as_bytes();
    let domain = domain.trim_end_matches('.').as_bytes();
    if domain.is_empty() || host.len() < domain.len() {
        return false;
    }
    let split = host.len() - domain.len();
    if !host[split..].eq_ignore_ascii_case(domain) {
        return false;
    }
    split == 0 || host[split - 1] == b'.'
}

/// Suffixes of a host, most specific first, ending at its registrable domain.
#[derive(Debug, Clone)]
pub struct HostSuffixIter<'a> {
    rest: Option<&'a str>,
    floor: usize,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let current = self.rest.take()?;
        if current.len() > self.floor {
            self.rest = current.split_once('.').map(|(_, parent)| parent);
        }
        Some(current)
    }
}

/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`, `example.com`.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    let host = host.trim_end_matches('.');
    HostSuffixIter {
        rest: (!host.is_empty()).then_some(host),
        floor: registrable_domain(host).len(),
    }
}
