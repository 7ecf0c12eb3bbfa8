use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use switchyard_core::config::ValidationConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::schema::{value_type_name, AgentOutput, OutputSchema, MAX_OUTPUT_KEYS};
use switchyard_core::types::{AgentOutcome, ValidatedOutcome, ValidationStatus};

use crate::catalog::AgentCatalog;

const COORDINATE_KEYS: &[&str] = &["lat", "lng", "latitude", "longitude", "coordinates"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "datetime", "date", "time"];

/// Checks successful agent outputs against their declared schemas.
pub struct OutputValidator {
    config: ValidationConfig,
}

/// Result of validating one job's outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// One entry per successful or cached outcome, in input order.
    pub outcomes: Vec<ValidatedOutcome>,
    /// Every schema violation, prefixed with its agent id.
    pub errors: Vec<String>,
    /// Cross-agent consistency warnings. Never fail anything.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> impl Iterator<Item = &ValidatedOutcome> {
        self.outcomes.iter().filter(|o| o.passed())
    }
}

impl OutputValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single output. Returns the list of violations.
    ///
    /// The key ceiling applies with or without a schema. A `null` value
    /// satisfies an optional key but not a required one.
    pub fn validate(&self, output: &AgentOutput, schema: Option<&OutputSchema>) -> Vec<String> {
        let mut errors = Vec::new();

        if output.len() > MAX_OUTPUT_KEYS {
            errors.push(format!(
                "output has {} keys (max {})",
                output.len(),
                MAX_OUTPUT_KEYS
            ));
        }

        let Some(schema) = schema else {
            return errors;
        };

        for key in schema.required_keys() {
            match output.get(key) {
                None => errors.push(format!("missing required key '{}'", key)),
                Some(Value::Null) => errors.push(format!("required key '{}' is null", key)),
                Some(_) => {}
            }
        }

        for (key, value) in output.iter() {
            let Some(field) = schema.get(key) else {
                if self.config.reject_unknown_keys {
                    errors.push(format!("unexpected key '{}'", key));
                }
                continue;
            };
            let Some(expected) = field.field_type else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if !expected.matches(value) {
                errors.push(format!(
                    "key '{}' expected {}, got {}",
                    key,
                    expected,
                    value_type_name(value)
                ));
            }
        }

        errors
    }

    /// Validate every successful outcome against the schema its agent
    /// declares in `agents`.
    ///
    /// Error and skipped outcomes are not part of the report. Outcomes whose
    /// agent is missing from the catalog get the ceiling check only.
    pub fn validate_all<'a, I>(&self, outcomes: I, agents: &AgentCatalog) -> ValidationReport
    where
        I: IntoIterator<Item = (&'a str, &'a AgentOutcome)>,
    {
        let mut report = ValidationReport::default();

        for (agent_id, outcome) in outcomes {
            if !outcome.is_success() {
                continue;
            }
            let agent = agents.get(agent_id);
            let schema = agent.and_then(|a| a.output_schema.as_ref());
            let empty = AgentOutput::new();
            let output = outcome.output.as_ref().unwrap_or(&empty);

            let errors = self.validate(output, schema);
            let validation_status = if errors.is_empty() {
                ValidationStatus::Passed
            } else {
                debug!(agent_id, errors = errors.len(), "Output rejected");
                report
                    .errors
                    .extend(errors.iter().map(|e| format!("{}: {}", agent_id, e)));
                ValidationStatus::Failed
            };

            report.outcomes.push(ValidatedOutcome {
                agent_id: agent_id.to_string(),
                agent_name: agent.map_or_else(|| agent_id.to_string(), |a| a.name.clone()),
                outcome: outcome.clone(),
                validation_status,
                errors,
            });
        }

        if self.config.cross_validate {
            report.warnings = Self::cross_validate_consistency(&report.outcomes);
        }
        report
    }

    /// Look for plausible conflicts across passed outputs: more than one agent
    /// reporting coordinates or timestamps. The warning says whether the
    /// reported values agree.
    pub fn cross_validate_consistency(outcomes: &[ValidatedOutcome]) -> Vec<String> {
        let mut warnings = Vec::new();
        for (label, keys) in [("coordinates", COORDINATE_KEYS), ("timestamps", TIMESTAMP_KEYS)] {
            let emitters: Vec<(&str, Vec<(&str, &Value)>)> = outcomes
                .iter()
                .filter(|o| o.passed())
                .filter_map(|o| {
                    let output = o.outcome.output.as_ref()?;
                    let values: Vec<(&str, &Value)> = keys
                        .iter()
                        .filter_map(|k| output.get(k).map(|v| (*k, v)))
                        .collect();
                    (!values.is_empty()).then_some((o.agent_id.as_str(), values))
                })
                .collect();

            if emitters.len() < 2 {
                continue;
            }
            let differ = emitters.windows(2).any(|w| w[0].1 != w[1].1);
            let ids: Vec<&str> = emitters.iter().map(|(id, _)| *id).collect();
            warn!(agents = %ids.join(","), differ, "Several agents report {}", label);
            warnings.push(format!(
                "{} reported by several agents ({}): {}",
                label,
                if differ { "values differ" } else { "values agree" },
                ids.join(", ")
            ));
        }
        warnings
    }
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

/// Turns raw model text into structured output.
pub struct OutputCleaner;

impl OutputCleaner {
    /// Heuristic repairs: strip markdown code fences, trim, close unbalanced
    /// braces and brackets.
    pub fn heuristic_repair(output: &str) -> String {
        let result = strip_code_fences(output);
        let result = result.trim();
        if result.starts_with('{') || result.starts_with('[') {
            balance_braces(result)
        } else {
            result.to_string()
        }
    }

    /// Parse raw text into an ordered [`AgentOutput`] after heuristic repair.
    ///
    /// Anything that is not a JSON object afterwards is malformed.
    pub fn parse_output(text: &str) -> Result<AgentOutput> {
        let repaired = Self::heuristic_repair(text);
        let value: Value = serde_json::from_str(&repaired)
            .map_err(|e| SwitchyardError::MalformedOutput(e.to_string()))?;
        AgentOutput::from_value(value)
    }
}

/// The body of the first fenced block, minus its info string.
///
/// An opening fence with no closer (truncated output) yields everything after
/// it. Text without fences comes back trimmed.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some((_, rest)) = trimmed.split_once("```") else {
        return trimmed.to_string();
    };
    let body = match rest.split_once('\n') {
        Some((info, body)) if !info.contains('{') && !info.contains('[') => body,
        _ => rest,
    };
    let inner = body.split_once("```").map_or(body, |(inner, _)| inner);
    inner.trim().to_string()
}

/// Append the closers missing from truncated JSON, innermost first.
fn balance_braces(text: &str) -> String {
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for ch in text.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }

    let mut result = text.to_string();
    if in_string {
        result.push('"');
    }
    while let Some(closer) = open.pop() {
        result.push(closer);
    }
    result
}
