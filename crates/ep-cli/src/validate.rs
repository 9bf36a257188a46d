use std::collections::HashSet;

use ep_compiler::CompilerConfig;
use ep_core::types::CompiledRuleset;

/// Problems that would make the browser reject or misorder the ruleset.
pub fn check_ruleset(ruleset: &CompiledRuleset, config: &CompilerConfig) -> Vec<String> {
    let mut problems = Vec::new();
    let mut ids = HashSet::new();

    for rule in &ruleset.network_rules {
        if rule.id == 0 {
            problems.push("rule id 0 is reserved".to_string());
        }
        if !ids.insert(rule.id) {
            problems.push(format!("duplicate rule id {}", rule.id));
        }
        if rule.priority != rule.disposition.priority() {
            problems.push(format!(
                "rule {}: priority {} does not match {}",
                rule.id,
                rule.priority,
                rule.disposition.as_str()
            ));
        }
        if rule.url_pattern.len() > config.max_url_filter_len {
            problems.push(format!(
                "rule {}: urlFilter is {} characters (limit {})",
                rule.id,
                rule.url_pattern.len(),
                config.max_url_filter_len
            ));
        }
        if rule.resource_types.is_empty() {
            problems.push(format!("rule {}: no resource types", rule.id));
        }
    }

    if ruleset.network_rules.len() > config.max_total_rules {
        problems.push(format!(
            "{} rules exceed the total cap of {}",
            ruleset.network_rules.len(),
            config.max_total_rules
        ));
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use ep_compiler::{build, ListInput, ListSpec};

    fn ruleset() -> CompiledRuleset {
        let lists = vec![ListInput::fetched(
            ListSpec::new("easylist", "https://lists.test/a", 0),
            "||ads.example.com^\n@@||ads.example.com/ok^\n",
        )];
        build(&lists, &CompilerConfig::default()).0
    }

    #[test]
    fn test_compiled_ruleset_is_clean() {
        assert!(check_ruleset(&ruleset(), &CompilerConfig::default()).is_empty());
    }

    #[test]
    fn test_detects_duplicates_and_priorities() {
        let mut ruleset = ruleset();
        let mut copy = ruleset.network_rules[0].clone();
        copy.priority = 2;
        ruleset.network_rules.push(copy);

        let problems = check_ruleset(&ruleset, &CompilerConfig::default());
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("duplicate rule id 1"));
        assert!(problems[1].contains("priority 2"));
    }

    #[test]
    fn test_detects_caps() {
        let config = CompilerConfig {
            max_total_rules: 1,
            max_url_filter_len: 5,
            ..CompilerConfig::default()
        };
        let problems = check_ruleset(&ruleset(), &config);
        assert!(problems.iter().any(|p| p.contains("total cap of 1")));
        assert!(problems.iter().any(|p| p.contains("urlFilter")));
    }
}
