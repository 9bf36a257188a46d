//! URL slicing helpers
//!
//! Borrowing accessors over raw URL strings; nothing here allocates.

/// Byte offset just past `scheme://`, if the URL has one.
pub fn authority_start(url: &str) -> Option<usize> {
    let (scheme, rest) = url.split_once(':')?;
    let valid_scheme = !scheme.is_empty()
        && scheme
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'));
    (valid_scheme && rest.starts_with("//")).then_some(scheme.len() + 3)
}

/// Byte range of the host inside `url`, without userinfo or port.
pub fn host_span(url: &str) -> Option<(usize, usize)> {
    let start = authority_start(url)?;
    let authority_end = url[start..]
        .find(|c| matches!(c, '/' | '?' | '#'))
        .map_or(url.len(), |len| start + len);
    let host_start = url[start..authority_end]
        .rfind('@')
        .map_or(start, |at| start + at + 1);
    let host_end = url[host_start..authority_end]
        .find(':')
        .map_or(authority_end, |len| host_start + len);
    Some((host_start, host_end))
}

/// The host of `url` as written, borrowed from it.
pub fn extract_host(url: &str) -> Option<&str> {
    let (start, end) = host_span(url)?;
    (start < end).then(|| &url[start..end])
}

/// Whether `c` matches the `^` placeholder: anything but letters, digits
/// and `_ - . %`.
#[inline]
pub fn is_separator_char(c: u8) -> bool {
    !(c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'.' | b'%'))
}
