//! Rule cache
//!
//! Persists a compiled ruleset as the artifacts the extension loads, plus a
//! metadata file used for TTL freshness checks. Every store writes a complete
//! generation directory first; the metadata names the live generation and is
//! swapped in with a single rename, so an interrupted refresh leaves the
//! previous generation authoritative.
//!
//! ```text
//! <dir>/.cache.json              metadata, points at the live generation
//! <dir>/gen-<ms>/adblock_rules.json
//! <dir>/gen-<ms>/cosmetic-generic.css
//! <dir>/gen-<ms>/cosmetic-domains.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ep_core::artifact::{
    domain_map_from_json, domain_map_to_json, network_rules_from_json, network_rules_to_json,
    ArtifactError,
};
use ep_core::types::{generic_selector_count, CompiledRuleset};

pub const NETWORK_RULES_FILE: &str = "adblock_rules.json";
pub const GENERIC_CSS_FILE: &str = "cosmetic-generic.css";
pub const DOMAIN_MAP_FILE: &str = "cosmetic-domains.json";
pub const METADATA_FILE: &str = ".cache.json";

const GENERATION_PREFIX: &str = "gen-";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("Invalid artifact: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("Missing artifact '{0}'")]
    Missing(PathBuf),
    #[error("Generation '{generation}' holds {found} {what}, metadata says {expected}")]
    Mismatch {
        generation: String,
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Contents of `.cache.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Unix time of the write, in milliseconds
    pub timestamp: i64,
    /// Directory holding the artifacts of this write
    pub generation: String,
    pub generated_at: DateTime<Utc>,
    pub source_list_version: String,
    pub network_rule_count: usize,
    pub generic_count: usize,
    pub domain_count: usize,
}

impl CacheMetadata {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age_ms = now.timestamp_millis() - self.timestamp;
        age_ms >= 0 && (age_ms as u128) < ttl.as_millis()
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_atomic(dir: &Path, file: &str, bytes: &[u8]) -> Result<(), CacheError> {
    let target = dir.join(file);
    let tmp = dir.join(format!("{file}.tmp"));
    fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
    fs::rename(&tmp, &target).map_err(io_error(&target))
}

fn check_count(generation: &str, what: &'static str, expected: usize, found: usize) -> Result<(), CacheError> {
    if expected == found {
        return Ok(());
    }
    Err(CacheError::Mismatch {
        generation: generation.to_string(),
        what,
        expected,
        found,
    })
}

/// A directory of cached artifacts.
#[derive(Debug, Clone)]
pub struct RuleCache {
    dir: PathBuf,
}

impl RuleCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory of the live generation's artifacts.
    pub fn artifact_dir(&self) -> Result<PathBuf, CacheError> {
        Ok(self.dir.join(self.metadata()?.generation))
    }

    /// Write a new generation, then switch the metadata over to it.
    pub fn store(&self, ruleset: &CompiledRuleset, now: DateTime<Utc>) -> Result<CacheMetadata, CacheError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let generation = self.create_generation(now)?;
        let gen_dir = self.dir.join(&generation);

        let rules_json = network_rules_to_json(&ruleset.network_rules)?;
        let domains_json = domain_map_to_json(&ruleset.domain_selectors)?;
        write_atomic(&gen_dir, NETWORK_RULES_FILE, rules_json.as_bytes())?;
        write_atomic(&gen_dir, GENERIC_CSS_FILE, ruleset.generic_css.as_bytes())?;
        write_atomic(&gen_dir, DOMAIN_MAP_FILE, domains_json.as_bytes())?;

        let metadata = CacheMetadata {
            timestamp: now.timestamp_millis(),
            generation,
            generated_at: ruleset.generated_at,
            source_list_version: ruleset.source_list_version.clone(),
            network_rule_count: ruleset.network_rules.len(),
            generic_count: ruleset.generic_selector_count(),
            domain_count: ruleset.domain_selectors.len(),
        };
        let metadata_json = serde_json::to_string(&metadata)?;
        write_atomic(&self.dir, METADATA_FILE, metadata_json.as_bytes())?;

        log::info!(
            "Cached {} network rules, {} generic selectors, {} domains in '{}'",
            metadata.network_rule_count,
            metadata.generic_count,
            metadata.domain_count,
            gen_dir.display()
        );
        self.prune(&metadata.generation);

        Ok(metadata)
    }

    /// Create an empty, unused generation directory and return its name.
    fn create_generation(&self, now: DateTime<Utc>) -> Result<String, CacheError> {
        let base = format!("{GENERATION_PREFIX}{}", now.timestamp_millis());
        let mut name = base.clone();
        let mut suffix = 1;
        loop {
            let path = self.dir.join(&name);
            match fs::create_dir(&path) {
                Ok(()) => return Ok(name),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    name = format!("{base}-{suffix}");
                    suffix += 1;
                }
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }
    }

    /// Remove every generation other than `live`. Failures only leave garbage.
    fn prune(&self, live: &str) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("Could not list '{}': {err}", self.dir.display());
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(GENERATION_PREFIX) || name == live {
                continue;
            }
            if let Err(err) = fs::remove_dir_all(entry.path()) {
                log::warn!("Could not remove stale generation '{name}': {err}");
            }
        }
    }

    fn read(&self, dir: &Path, file: &str) -> Result<String, CacheError> {
        let path = dir.join(file);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(CacheError::Missing(path)),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    /// Read the metadata file.
    pub fn metadata(&self) -> Result<CacheMetadata, CacheError> {
        let text = self.read(&self.dir, METADATA_FILE)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Missing or corrupt metadata counts as stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.metadata() {
            Ok(metadata) => metadata.is_fresh(now, ttl),
            Err(err) => {
                log::debug!("Cache in '{}' is stale: {err}", self.dir.display());
                false
            }
        }
    }

    /// Reassemble the live generation, checking it against the metadata.
    pub fn load(&self) -> Result<CompiledRuleset, CacheError> {
        let metadata = self.metadata()?;
        let gen_dir = self.dir.join(&metadata.generation);
        let network_rules = network_rules_from_json(&self.read(&gen_dir, NETWORK_RULES_FILE)?)?;
        let generic_css = self.read(&gen_dir, GENERIC_CSS_FILE)?;
        let domain_selectors = domain_map_from_json(&self.read(&gen_dir, DOMAIN_MAP_FILE)?)?;

        let generation = metadata.generation.as_str();
        check_count(generation, "network rules", metadata.network_rule_count, network_rules.len())?;
        check_count(generation, "generic selectors", metadata.generic_count, generic_selector_count(&generic_css))?;
        check_count(generation, "domains", metadata.domain_count, domain_selectors.len())?;

        Ok(CompiledRuleset {
            network_rules,
            generic_css,
            domain_selectors,
            generated_at: metadata.generated_at,
            source_list_version: metadata.source_list_version,
        })
    }
}
