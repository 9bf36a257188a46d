//! Wire shapes for compiled artifacts
//!
//! The network artifact is an ordered JSON array in the shape the browser's
//! declarative request matcher accepts:
//!
//! ```json
//! {"id": 1, "priority": 1, "action": {"type": "block"},
//!  "condition": {"urlFilter": "||ads.example^", "resourceTypes": ["script"]}}
//! ```
//!
//! The cosmetic domain map is a JSON object of domain -> selector array.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{Disposition, DomainScope, NetworkRule, PartyScope, ResourceType};

/// Error type for artifact (de)serialization.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Rule {id}: unknown action type '{action}'")]
    UnknownAction { id: u32, action: String },
    #[error("Rule {id}: unknown resource type '{name}'")]
    UnknownResourceType { id: u32, name: String },
    #[error("Rule {id}: unknown domain type '{value}'")]
    UnknownDomainType { id: u32, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_initiator_domains: Option<Vec<String>>,
}

/// One entry of the network rule artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarativeRule {
    pub id: u32,
    pub priority: u8,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl From<&NetworkRule> for DeclarativeRule {
    fn from(rule: &NetworkRule) -> Self {
        let non_empty = |set: &BTreeSet<String>| {
            if set.is_empty() {
                None
            } else {
                Some(set.iter().cloned().collect())
            }
        };

        Self {
            id: rule.id,
            priority: rule.priority,
            action: RuleAction {
                kind: rule.disposition.as_str().to_string(),
            },
            condition: RuleCondition {
                url_filter: rule.url_pattern.clone(),
                resource_types: rule
                    .resource_types
                    .names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                domain_type: rule.party_scope.domain_type().map(str::to_string),
                initiator_domains: non_empty(&rule.domain_scope.included),
                excluded_initiator_domains: non_empty(&rule.domain_scope.excluded),
            },
        }
    }
}

impl TryFrom<&DeclarativeRule> for NetworkRule {
    type Error = ArtifactError;

    fn try_from(rule: &DeclarativeRule) -> Result<Self, Self::Error> {
        let disposition = Disposition::from_name(&rule.action.kind).ok_or_else(|| {
            ArtifactError::UnknownAction {
                id: rule.id,
                action: rule.action.kind.clone(),
            }
        })?;

        let mut resource_types = ResourceType::empty();
        for name in &rule.condition.resource_types {
            let ty = ResourceType::from_name(name).ok_or_else(|| {
                ArtifactError::UnknownResourceType {
                    id: rule.id,
                    name: name.clone(),
                }
            })?;
            resource_types |= ty;
        }

        let party_scope = PartyScope::from_domain_type(rule.condition.domain_type.as_deref())
            .ok_or_else(|| ArtifactError::UnknownDomainType {
                id: rule.id,
                value: rule.condition.domain_type.clone().unwrap_or_default(),
            })?;

        let to_set = |domains: &Option<Vec<String>>| -> BTreeSet<String> {
            domains.iter().flatten().cloned().collect()
        };

        Ok(NetworkRule {
            id: rule.id,
            priority: rule.priority,
            disposition,
            url_pattern: rule.condition.url_filter.clone(),
            resource_types,
            domain_scope: DomainScope {
                included: to_set(&rule.condition.initiator_domains),
                excluded: to_set(&rule.condition.excluded_initiator_domains),
            },
            party_scope,
        })
    }
}

/// Serialize network rules to the artifact JSON array.
pub fn network_rules_to_json(rules: &[NetworkRule]) -> Result<String, ArtifactError> {
    let wire: Vec<DeclarativeRule> = rules.iter().map(DeclarativeRule::from).collect();
    Ok(serde_json::to_string_pretty(&wire)?)
}

/// Parse the artifact JSON array back into network rules.
pub fn network_rules_from_json(json: &str) -> Result<Vec<NetworkRule>, ArtifactError> {
    let wire: Vec<DeclarativeRule> = serde_json::from_str(json)?;
    wire.iter().map(NetworkRule::try_from).collect()
}

pub fn domain_map_to_json(map: &BTreeMap<String, Vec<String>>) -> Result<String, ArtifactError> {
    Ok(serde_json::to_string(map)?)
}

pub fn domain_map_from_json(json: &str) -> Result<BTreeMap<String, Vec<String>>, ArtifactError> {
    Ok(serde_json::from_str(json)?)
}
