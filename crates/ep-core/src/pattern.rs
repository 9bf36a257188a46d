//! URL filter programs
//!
//! Compiles a declarative `urlFilter` string into a short op program and
//! evaluates it against request URLs. The browser does its own matching at
//! runtime; this evaluator exists so tooling can answer "would this rule
//! fire for that URL" without a browser.
//!
//! Supported syntax:
//! - `||` - anchor at a domain label boundary within the host
//! - `|` - anchor at start (leading) or end (trailing) of the URL
//! - `^` - separator character or end of URL
//! - `*` - any run of characters
//!
//! Matching is ASCII case-insensitive.

use crate::url::{host_span, is_separator_char};

/// Pattern program operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternOp {
    /// Next op must match at the start of a host label (`||`)
    HostAnchor,
    /// Must be at URL start (`|` prefix)
    AssertStart,
    /// Must be at URL end (`|` suffix)
    AssertEnd,
    /// Literal text at the current position
    Lit(String),
    /// Separator character or end of URL (`^`)
    Separator,
    /// Skip any run of characters (`*`)
    SkipAny,
}

/// A compiled `urlFilter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFilter {
    ops: Vec<PatternOp>,
}

impl UrlFilter {
    /// Compile a `urlFilter` string.
    pub fn compile(filter: &str) -> Self {
        let mut ops = Vec::new();
        let mut rest = filter;

        if let Some(stripped) = rest.strip_prefix("||") {
            ops.push(PatternOp::HostAnchor);
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('|') {
            ops.push(PatternOp::AssertStart);
            rest = stripped;
        }

        let anchored_end = rest.ends_with('|');
        if anchored_end {
            rest = &rest[..rest.len() - 1];
        }

        let mut literal = String::new();
        for c in rest.chars() {
            match c {
                '*' | '^' => {
                    if !literal.is_empty() {
                        ops.push(PatternOp::Lit(std::mem::take(&mut literal)));
                    }
                    if c == '^' {
                        ops.push(PatternOp::Separator);
                    } else if ops.last() != Some(&PatternOp::SkipAny) {
                        ops.push(PatternOp::SkipAny);
                    }
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            ops.push(PatternOp::Lit(literal));
        }

        if anchored_end {
            ops.push(PatternOp::AssertEnd);
        }

        Self { ops }
    }

    pub fn ops(&self) -> &[PatternOp] {
        &self.ops
    }

    /// Whether the filter matches `url`.
    pub fn matches(&self, url: &str) -> bool {
        let bytes = url.as_bytes();

        match self.ops.first() {
            Some(PatternOp::AssertStart) => match_from(&self.ops[1..], bytes, 0),
            Some(PatternOp::HostAnchor) => {
                let (host_start, host_end) = match host_span(url) {
                    Some(pos) => pos,
                    None => return false,
                };
                (host_start..host_end)
                    .filter(|&pos| pos == host_start || bytes[pos - 1] == b'.')
                    .any(|pos| match_from(&self.ops[1..], bytes, pos))
            }
            _ => (0..=bytes.len()).any(|pos| match_from(&self.ops, bytes, pos)),
        }
    }
}

fn match_from(ops: &[PatternOp], url: &[u8], pos: usize) -> bool {
    let Some((op, rest)) = ops.split_first() else {
        return true;
    };

    match op {
        PatternOp::Lit(lit) => {
            let lit = lit.as_bytes();
            let end = pos + lit.len();
            end <= url.len()
                && url[pos..end].eq_ignore_ascii_case(lit)
                && match_from(rest, url, end)
        }
        PatternOp::Separator => {
            if pos == url.len() {
                match_from(rest, url, pos)
            } else {
                is_separator_char(url[pos]) && match_from(rest, url, pos + 1)
            }
        }
        PatternOp::SkipAny => (pos..=url.len()).any(|p| match_from(rest, url, p)),
        PatternOp::AssertEnd => pos == url.len(),
        // Anchors only lead a program
        PatternOp::AssertStart | PatternOp::HostAnchor => false,
    }
}
