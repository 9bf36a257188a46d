//! Echo Privacy CLI
//!
//! Builds and inspects the cached filter artifacts the extension ships with.

mod fetch;
mod refresh;
mod validate;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};

use ep_compiler::{CompilerConfig, RuleCache};
use ep_core::cosmetic::selectors_for_host;
use ep_core::pattern::UrlFilter;
use ep_core::psl::is_subdomain_of;
use ep_core::types::NetworkRule;

use crate::refresh::RefreshOutcome;

#[derive(Parser)]
#[command(name = "ep-cli")]
#[command(about = "Echo Privacy filter list compiler and tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and compile filter lists into the rule cache
    Compile {
        /// JSON compiler configuration
        #[arg(short, long)]
        config: Option<String>,

        /// Local filter list files, used instead of fetching
        #[arg(short, long)]
        input: Vec<String>,

        /// Cache directory
        #[arg(short, long, default_value = "public/rules")]
        out_dir: String,

        /// Rebuild even if the cache is fresh
        #[arg(short, long)]
        force: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show cache metadata and freshness
    Info {
        /// Cache directory
        #[arg(short, long, default_value = "public/rules")]
        dir: String,

        /// JSON compiler configuration, for the TTL
        #[arg(short, long)]
        config: Option<String>,

        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the cosmetic selectors that apply to a host
    Lookup {
        /// Cache directory
        #[arg(short, long, default_value = "public/rules")]
        dir: String,

        /// Page host, e.g. news.example.com
        #[arg(long)]
        host: String,

        /// Also list the network rules whose urlFilter matches this URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Reload the cached artifacts and check them
    Validate {
        /// Cache directory
        #[arg(short, long, default_value = "public/rules")]
        dir: String,

        /// JSON compiler configuration, for the caps
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let verbose = matches!(cli.command, Commands::Compile { verbose: true, .. });
    init_logging(verbose);

    let result = match cli.command {
        Commands::Compile {
            config,
            input,
            out_dir,
            force,
            verbose,
        } => cmd_compile(config.as_deref(), &input, &out_dir, force, verbose),
        Commands::Info { dir, config, json } => cmd_info(&dir, config.as_deref(), json),
        Commands::Lookup { dir, host, url } => cmd_lookup(&dir, &host, url.as_deref()),
        Commands::Validate { dir, config } => cmd_validate(&dir, config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<CompilerConfig, String> {
    match path {
        Some(path) => CompilerConfig::from_json_file(path)
            .map_err(|e| format!("Failed to load config '{}': {}", path, e)),
        None => Ok(CompilerConfig::default()),
    }
}

fn cmd_compile(
    config_path: Option<&str>,
    inputs: &[String],
    out_dir: &str,
    force: bool,
    verbose: bool,
) -> Result<(), String> {
    let config = load_config(config_path)?;
    let cache = RuleCache::new(out_dir);

    let outcome = refresh::refresh(&cache, &config, force, Utc::now(), || {
        if inputs.is_empty() {
            let timeout = Duration::from_secs(config.fetch_timeout_secs);
            fetch::fetch_lists_blocking(&config.lists, timeout)
        } else {
            refresh::read_inputs(inputs)
        }
    })?;

    match outcome {
        RefreshOutcome::Fresh(metadata) => {
            println!("Using cached rules in '{}' (generated {})", out_dir, metadata.generated_at);
            println!("Use --force to regenerate");
        }
        RefreshOutcome::Rebuilt {
            metadata,
            report,
            total_ms,
        } => {
            if verbose {
                for (idx, list) in report.lists.iter().enumerate() {
                    match &list.fetch_error {
                        Some(reason) => println!("  [{}] {} - failed: {}", idx, list.name, reason),
                        None => println!(
                            "  [{}] {} - {} lines, {} block, {} exception, {} dropped, {} capped",
                            idx,
                            list.name,
                            list.lines,
                            list.block_rules,
                            list.exception_rules,
                            list.dropped,
                            list.capped
                        ),
                    }
                }
            }

            println!(
                "Compiled {} filter lists to '{}'",
                report.lists.len(),
                Path::new(out_dir).join(&metadata.generation).display()
            );
            println!("  Network rules:  {}", metadata.network_rule_count);
            println!("  Dropped lines:  {}", report.dropped_lines());
            println!("  Failed lists:   {}", report.failed_lists());
            println!("  Generic:        {} selectors", metadata.generic_count);
            println!("  Domains:        {}", metadata.domain_count);
            println!(
                "  Cosmetic:       {} rejected, {} unsupported",
                report.cosmetic.rejected, report.cosmetic.unsupported
            );
            println!("  Version:        {}", metadata.source_list_version);
            println!("  Time:           {:.1}ms", total_ms);
        }
    }

    Ok(())
}

fn cmd_info(dir: &str, config_path: Option<&str>, json: bool) -> Result<(), String> {
    let config = load_config(config_path)?;
    let cache = RuleCache::new(dir);
    let metadata = cache
        .metadata()
        .map_err(|e| format!("Failed to read cache in '{}': {}", dir, e))?;

    if json {
        let text = serde_json::to_string_pretty(&metadata).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }

    let ttl = Duration::from_secs(config.cache_ttl_secs);
    let now = Utc::now();
    let age_hours = (now.timestamp_millis() - metadata.timestamp) as f64 / 3_600_000.0;

    println!("Cache: {}", Path::new(dir).display());
    println!("  Generation:    {}", metadata.generation);
    println!("  Generated:     {}", metadata.generated_at);
    println!("  Age:           {:.1} hours", age_hours);
    println!("  Fresh:         {}", metadata.is_fresh(now, ttl));
    println!("  Version:       {}", metadata.source_list_version);
    println!("  Network rules: {}", metadata.network_rule_count);
    println!("  Generic:       {} selectors", metadata.generic_count);
    println!("  Domains:       {}", metadata.domain_count);

    Ok(())
}

/// Whether the rule's initiator domains admit a page on `host`.
fn applies_on(rule: &NetworkRule, host: &str) -> bool {
    let scope = &rule.domain_scope;
    let included = scope.included.is_empty() || scope.included.iter().any(|d| is_subdomain_of(host, d));
    included && !scope.excluded.iter().any(|d| is_subdomain_of(host, d))
}

fn cmd_lookup(dir: &str, host: &str, url: Option<&str>) -> Result<(), String> {
    let ruleset = RuleCache::new(dir)
        .load()
        .map_err(|e| format!("Failed to load cache in '{}': {}", dir, e))?;

    let host = host.trim().to_ascii_lowercase();
    let selectors = selectors_for_host(&ruleset.domain_selectors, &host);
    if selectors.is_empty() {
        println!("No domain selectors for '{}'", host);
    } else {
        println!("{} selectors for '{}':", selectors.len(), host);
        for selector in selectors {
            println!("  {selector}");
        }
    }

    if let Some(url) = url {
        let matching: Vec<_> = ruleset
            .network_rules
            .iter()
            .filter(|rule| applies_on(rule, &host) && UrlFilter::compile(&rule.url_pattern).matches(url))
            .collect();
        println!("{} network rules match '{}' on '{}':", matching.len(), url, host);
        for rule in matching {
            println!("  [{}] {} {}", rule.id, rule.disposition.as_str(), rule.url_pattern);
        }
    }
    Ok(())
}

fn cmd_validate(dir: &str, config_path: Option<&str>) -> Result<(), String> {
    let config = load_config(config_path)?;
    let ruleset = RuleCache::new(dir)
        .load()
        .map_err(|e| format!("Invalid cache in '{}': {}", dir, e))?;

    let problems = validate::check_ruleset(&ruleset, &config);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  {problem}");
        }
        return Err(format!("{} problems found in '{}'", problems.len(), dir));
    }

    println!("Cache '{}' is valid", dir);
    println!("  Network rules: {}", ruleset.network_rules.len());
    println!("  Generic:       {} selectors", ruleset.generic_selector_count());
    println!("  Domains:       {}", ruleset.domain_selectors.len());
    Ok(())
}
