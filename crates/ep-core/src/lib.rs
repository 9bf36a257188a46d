//! Echo Privacy Core Library
//!
//! Shared types for the Echo Privacy filter compiler and page runtime.
//!
//! # Modules
//!
//! - `types`: Compiled rule and ruleset definitions
//! - `artifact`: JSON wire shapes for the compiled artifacts
//! - `cosmetic`: Hiding stylesheets and per-host selector lookup
//! - `pattern`: `urlFilter` evaluation for tooling and tests
//! - `psl`: Registrable-domain helpers and host suffix walking
//! - `url`: Fast URL parsing without allocations
//! - `fingerprint`: Murmur3 content fingerprints

pub mod artifact;
pub mod cosmetic;
pub mod fingerprint;
pub mod pattern;
pub mod psl;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use artifact::{ArtifactError, DeclarativeRule};
pub use fingerprint::Fingerprint;
pub use pattern::UrlFilter;
pub use psl::{is_third_party, registrable_domain, walk_host_suffixes};
pub use types::{
    CompiledRuleset, CosmeticScope, CosmeticSelector, Disposition, DomainScope, NetworkRule,
    PartyScope, ResourceType,
};
