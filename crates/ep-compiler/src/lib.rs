//! Echo Privacy Filter List Compiler
//!
//! This crate compiles EasyList-syntax filter lists into declarative network
//! rules, a generic element-hiding stylesheet, and a domain -> selectors map.

pub mod cache;
pub mod compiler;
pub mod config;
pub mod cosmetic;
pub mod parser;

pub use cache::{CacheError, CacheMetadata, RuleCache};
pub use compiler::{build, build_at, CompileReport, FetchError, ListInput, ListReport};
pub use config::{CompilerConfig, ConfigError, ListSpec};
pub use cosmetic::{CosmeticExtractor, ExtractReport};
pub use parser::{parse_line, UrlPattern};
