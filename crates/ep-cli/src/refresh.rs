use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ep_compiler::{build_at, CacheMetadata, CompileReport, CompilerConfig, ListInput, ListSpec, RuleCache};

#[derive(Debug)]
pub enum RefreshOutcome {
    /// The cache was younger than its TTL and left alone
    Fresh(CacheMetadata),
    Rebuilt {
        metadata: CacheMetadata,
        report: CompileReport,
        total_ms: f64,
    },
}

/// Read local list files; list `i` gets namespace `i`.
pub fn read_inputs(paths: &[String]) -> Result<Vec<ListInput>, String> {
    if paths.is_empty() {
        return Err("No input files specified".to_string());
    }

    let mut inputs = Vec::with_capacity(paths.len());
    for (idx, path) in paths.iter().enumerate() {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let name = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let namespace = u16::try_from(idx).map_err(|_| format!("Too many input files: {}", paths.len()))?;
        inputs.push(ListInput::fetched(ListSpec::new(name, path.as_str(), namespace), content));
    }
    Ok(inputs)
}

/// Rebuild the cache unless it is still fresh.
///
/// `inputs` is only called when a rebuild is due. When every list failed the
/// previous cache is kept.
pub fn refresh<F>(
    cache: &RuleCache,
    config: &CompilerConfig,
    force: bool,
    now: DateTime<Utc>,
    inputs: F,
) -> Result<RefreshOutcome, String>
where
    F: FnOnce() -> Result<Vec<ListInput>, String>,
{
    let ttl = Duration::from_secs(config.cache_ttl_secs);
    if !force && cache.is_fresh(now, ttl) {
        let metadata = cache.metadata().map_err(|e| e.to_string())?;
        return Ok(RefreshOutcome::Fresh(metadata));
    }

    let start = Instant::now();
    let inputs = inputs()?;
    if !inputs.is_empty() && inputs.iter().all(|i| i.body.is_err()) {
        return Err("Every filter list failed to load; keeping the previous cache".to_string());
    }

    let (ruleset, report) = build_at(&inputs, config, now);
    let metadata = cache
        .store(&ruleset, now)
        .map_err(|e| format!("Failed to write cache to '{}': {}", cache.dir().display(), e))?;

    Ok(RefreshOutcome::Rebuilt {
        metadata,
        report,
        total_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LIST: &str = "||ads.example.com^\n@@||ads.example.com/ok^\n##.ad-banner\nexample.com##.promo\n";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn lists() -> Result<Vec<ListInput>, String> {
        Ok(vec![ListInput::fetched(ListSpec::new("easylist", "https://lists.test/a", 0), LIST)])
    }

    #[test]
    fn test_read_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("easylist.txt");
        fs::write(&path, LIST).unwrap();

        let inputs = read_inputs(&[path.to_string_lossy().into_owned()]).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].spec.name, "easylist");
        assert_eq!(inputs[0].spec.namespace, 0);
        assert!(read_inputs(&[]).is_err());
        assert!(read_inputs(&["/nonexistent/list.txt".to_string()]).is_err());
    }

    #[test]
    fn test_refresh_honors_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RuleCache::new(dir.path());
        let config = CompilerConfig::default();

        let outcome = refresh(&cache, &config, false, now(), lists).unwrap();
        match outcome {
            RefreshOutcome::Rebuilt { metadata, report, .. } => {
                assert_eq!(metadata.network_rule_count, 2);
                assert_eq!(report.lists.len(), 1);
            }
            other => panic!("expected rebuild, got {other:?}"),
        }

        // A day later the cache is still fresh and the lists are not consulted.
        let later = now() + chrono::Duration::days(1);
        let outcome = refresh(&cache, &config, false, later, || panic!("fetched a fresh cache")).unwrap();
        assert!(matches!(outcome, RefreshOutcome::Fresh(_)));

        let outcome = refresh(&cache, &config, true, later, lists).unwrap();
        assert!(matches!(outcome, RefreshOutcome::Rebuilt { .. }));

        let expired = now() + chrono::Duration::days(8);
        let outcome = refresh(&cache, &config, false, expired, lists).unwrap();
        assert!(matches!(outcome, RefreshOutcome::Rebuilt { .. }));
    }

    #[test]
    fn test_total_fetch_failure_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RuleCache::new(dir.path());
        let config = CompilerConfig::default();
        refresh(&cache, &config, false, now(), lists).unwrap();

        let failed = || {
            Ok(vec![ListInput::failed(
                ListSpec::new("easylist", "https://lists.test/a", 0),
                "timeout",
            )])
        };
        assert!(refresh(&cache, &config, true, now(), failed).is_err());
        assert_eq!(cache.metadata().unwrap().network_rule_count, 2);
    }

    #[test]
    fn test_partial_failure_still_builds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RuleCache::new(dir.path());
        let config = CompilerConfig::default();

        let mixed = || {
            Ok(vec![
                ListInput::failed(ListSpec::new("down", "https://lists.test/down", 0), "HTTP 503"),
                ListInput::fetched(ListSpec::new("up", "https://lists.test/up", 1), LIST),
            ])
        };
        match refresh(&cache, &config, false, now(), mixed).unwrap() {
            RefreshOutcome::Rebuilt { report, .. } => assert_eq!(report.failed_lists(), 1),
            other => panic!("expected rebuild, got {other:?}"),
        }
    }
}
