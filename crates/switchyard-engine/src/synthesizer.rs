use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use switchyard_core::config::SynthesisConfig;
use switchyard_core::schema::AgentOutput;
use switchyard_core::types::ValidatedOutcome;

/// One agent's contribution to a synthesized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSection {
    pub agent_name: String,
    pub data: AgentOutput,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub agent_count: usize,
    pub has_location: bool,
    pub has_temporal: bool,
    pub has_entities: bool,
    pub has_sentiment: bool,
    pub synthesized_at: DateTime<Utc>,
}

/// Validated outputs merged into one record.
///
/// Serializes as a flat object: one key per sanitized agent id, plus the
/// derived `_location`, `_temporal`, `_entities` and `_sentiment` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedDocument {
    #[serde(flatten)]
    pub agents: BTreeMap<String, AgentSection>,
    #[serde(rename = "_location", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<AgentOutput>,
    #[serde(rename = "_temporal", default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<AgentOutput>,
    #[serde(rename = "_entities", default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Value>,
    #[serde(rename = "_sentiment", default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Value>,
    pub processing_summary: ProcessingSummary,
}

/// Merges validated outputs, resolving cross-cutting fields by agent role.
///
/// Roles come from keywords matched against the agent's id and name, never
/// from output content.
pub struct Synthesizer {
    location: Option<Regex>,
    temporal: Option<Regex>,
    sentiment: Option<Regex>,
    non_word: Regex,
}

impl Synthesizer {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            location: keyword_pattern(&config.location_keywords),
            temporal: keyword_pattern(&config.temporal_keywords),
            sentiment: keyword_pattern(&config.sentiment_keywords),
            non_word: Regex::new(r"[^a-z0-9]+").unwrap(),
        }
    }

    /// Lowercase the id and collapse every run of other characters to `_`.
    pub fn sanitize_id(&self, agent_id: &str) -> String {
        let lowered = agent_id.to_lowercase();
        self.non_word
            .replace_all(&lowered, "_")
            .trim_matches('_')
            .to_string()
    }

    pub fn synthesize(&self, outcomes: &[ValidatedOutcome]) -> SynthesizedDocument {
        let passed: Vec<(&ValidatedOutcome, &AgentOutput)> = outcomes
            .iter()
            .filter(|o| o.passed())
            .filter_map(|o| o.outcome.output.as_ref().map(|out| (o, out)))
            .collect();

        let mut agents = BTreeMap::new();
        for (outcome, output) in &passed {
            agents.insert(
                self.sanitize_id(&outcome.agent_id),
                AgentSection {
                    agent_name: outcome.agent_name.clone(),
                    data: (*output).clone(),
                    execution_time_ms: outcome.outcome.execution_time_ms,
                },
            );
        }

        let location = passed
            .iter()
            .find(|(o, _)| has_role(&self.location, o))
            .map(|(_, out)| (*out).clone());
        let temporal = passed
            .iter()
            .find(|(o, _)| has_role(&self.temporal, o))
            .map(|(_, out)| (*out).clone());

        let mut entities = Vec::new();
        let mut seen = HashSet::new();
        for (_, output) in &passed {
            let Some(Value::Array(items)) = output.get("entities") else {
                continue;
            };
            for item in items {
                if seen.insert(entity_key(item)) {
                    entities.push(item.clone());
                }
            }
        }

        let sentiment = passed
            .iter()
            .filter(|(o, _)| has_role(&self.sentiment, o))
            .chain(passed.iter())
            .find_map(|(_, out)| out.get("sentiment").filter(|v| !v.is_null()).cloned());

        let processing_summary = ProcessingSummary {
            agent_count: agents.len(),
            has_location: location.is_some(),
            has_temporal: temporal.is_some(),
            has_entities: !entities.is_empty(),
            has_sentiment: sentiment.is_some(),
            synthesized_at: Utc::now(),
        };
        debug!(
            agents = processing_summary.agent_count,
            location = processing_summary.has_location,
            temporal = processing_summary.has_temporal,
            entities = entities.len(),
            "Outputs synthesized"
        );

        SynthesizedDocument {
            agents,
            location,
            temporal,
            entities,
            sentiment,
            processing_summary,
        }
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(&SynthesisConfig::default())
    }
}

/// Case-insensitive alternation of the escaped keywords; `None` matches nothing.
fn keyword_pattern(keywords: &[String]) -> Option<Regex> {
    if keywords.is_empty() {
        return None;
    }
    let alternation: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
    Regex::new(&format!("(?i){}", alternation.join("|"))).ok()
}

fn has_role(pattern: &Option<Regex>, outcome: &ValidatedOutcome) -> bool {
    pattern
        .as_ref()
        .is_some_and(|re| re.is_match(&outcome.agent_id) || re.is_match(&outcome.agent_name))
}

/// Dedup key: the entity's text, case-folded.
fn entity_key(entity: &Value) -> String {
    let text = match entity {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("text")
            .or_else(|| map.get("name"))
            .and_then(Value::as_str),
        _ => None,
    };
    match text {
        Some(t) => t.trim().to_lowercase(),
        None => entity.to_string(),
    }
}
