//! Validator: inspects generated artifacts against the transcript and
//! emits a per-channel verdict report.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::EngineError;
use crate::generator::CHANNEL_CATALOG;
use crate::llm::LlmClient;
use crate::tokenizer::Tokenizer;
use crate::{CheckResult, ChannelReport, VMAX};

const STORYBOARD_KEY: &str = "banana_video_prompt";

pub const VALIDATOR_SYSTEM_PROMPT: &str = "You are a content compliance reviewer. You are given a source transcript \
followed by one or more candidate artifacts, each delimited by a \
`=== <platform> ===` header. For each platform present, evaluate three \
checks: `policy-risk` (does the artifact contain content that would violate \
a mainstream platform's content policy?), `hallucination` (does the \
artifact state facts, figures, or quotes not supported by the source \
transcript?), and `tone-mismatch` (is the artifact's tone inappropriate for \
its named platform?). Respond with a JSON object keyed by platform name, \
each value an object `{\"checks\": [{\"name\": ..., \"passed\": ..., \"details\": ...}]}` \
covering exactly the three check names above.";

#[derive(Debug, serde::Deserialize)]
struct RawCheck {
    name: String,
    passed: bool,
    #[serde(default)]
    details: String,
}

#[derive(Debug, serde::Deserialize)]
struct RawChannelReport {
    #[serde(default)]
    checks: Vec<RawCheck>,
}

pub struct Validator {
    llm: Arc<dyn LlmClient>,
    tokenizer: Arc<Tokenizer>,
    model: String,
}

impl Validator {
    pub fn new(llm: Arc<dyn LlmClient>, tokenizer: Arc<Tokenizer>, model: String) -> Self {
        Self {
            llm,
            tokenizer,
            model,
        }
    }

    /// Validate the generated content against `source_text`, restricted to
    /// `channels` when given. Returns the per-channel report; the
    /// caller recomputes the overall verdict via `Validation::verdict_of`.
    #[tracing::instrument(skip(self, content, source_text, channels))]
    pub async fn validate(
        &self,
        content: &HashMap<String, serde_json::Value>,
        source_text: &str,
        channels: Option<&HashSet<String>>,
    ) -> Result<HashMap<String, ChannelReport>, EngineError> {
        let (truncated_source, was_truncated) =
            self.tokenizer.truncate(source_text, VMAX).map_err(|e| {
                EngineError::Internal(format!("validation input tokenization failed: {e}"))
            })?;
        if was_truncated {
            tracing::warn!(
                original_tokens = self.tokenizer.count(source_text),
                "truncated validation source text to VMAX tokens"
            );
        }

        let in_scope: Vec<_> = CHANNEL_CATALOG
            .iter()
            .filter(|c| channels.map(|set| set.contains(c.payload_key)).unwrap_or(true))
            .filter(|c| content.contains_key(c.payload_key))
            .collect();

        let mut report = HashMap::new();

        let storyboard = in_scope.iter().find(|c| c.payload_key == STORYBOARD_KEY);
        if let Some(spec) = storyboard {
            let value = &content[spec.payload_key];
            report.insert(spec.payload_key.to_string(), validate_storyboard_schema(value));
        }

        let textual: Vec<_> = in_scope
            .iter()
            .filter(|c| c.payload_key != STORYBOARD_KEY)
            .collect();

        if !textual.is_empty() {
            let mut prompt = truncated_source.clone();
            for spec in &textual {
                let text = content[spec.payload_key].as_str().unwrap_or_default();
                prompt.push_str(&format!("\n\n=== {} ===\n{}", spec.platform, text));
            }

            let raw: HashMap<String, RawChannelReport> = serde_json::from_value(
                self.llm
                    .complete_json(&self.model, VALIDATOR_SYSTEM_PROMPT, &prompt)
                    .await?,
            )
            .map_err(|e| EngineError::LlmError(format!("validator response decode failed: {e}")))?;

            for spec in &textual {
                let checks = raw
                    .get(spec.platform)
                    .map(|r| {
                        r.checks
                            .iter()
                            .map(|c| CheckResult {
                                name: c.name.clone(),
                                passed: c.passed,
                                details: c.details.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                report.insert(spec.platform.to_string(), ChannelReport::Checked { checks });
            }
        }

        Ok(report)
    }

    /// Merge a partial (channel-restricted) report into a prior one,
    /// `old ∪ new` with `new` taking precedence per key.
    pub fn merge_reports(
        old: HashMap<String, ChannelReport>,
        new: HashMap<String, ChannelReport>,
    ) -> HashMap<String, ChannelReport> {
        let mut merged = old;
        merged.extend(new);
        merged
    }
}

/// Schema-only validation for the storyboard channel: required keys
/// `style_summary` (string), `scenes` (non-empty
/// list of objects each containing `scene_number`, `visual_prompt`,
/// `voiceover_text`).
fn validate_storyboard_schema(value: &serde_json::Value) -> ChannelReport {
    let mut failures = Vec::new();

    let style_ok = value.get("style_summary").map(|v| v.is_string()).unwrap_or(false);
    if !style_ok {
        failures.push("missing or non-string `style_summary`".to_string());
    }

    match value.get("scenes").and_then(|v| v.as_array()) {
        None => failures.push("missing or non-array `scenes`".to_string()),
        Some(scenes) if scenes.is_empty() => failures.push("`scenes` must be non-empty".to_string()),
        Some(scenes) => {
            for (i, scene) in scenes.iter().enumerate() {
                for key in ["scene_number", "visual_prompt", "voiceover_text"] {
                    if scene.get(key).is_none() {
                        failures.push(format!("scene {i} missing `{key}`"));
                    }
                }
            }
        }
    }

    if failures.is_empty() {
        ChannelReport::Schema {
            passed: true,
            details: String::new(),
        }
    } else {
        ChannelReport::Schema {
            passed: false,
            details: failures.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storyboard_schema_passes_well_formed_payload() {
        let value = serde_json::json!({
            "style_summary": "noir",
            "scenes": [{"scene_number": 1, "visual_prompt": "p", "voiceover_text": "v"}]
        });
        let report = validate_storyboard_schema(&value);
        assert!(!report.is_failed());
    }

    #[test]
    fn storyboard_schema_fails_empty_scenes() {
        let value = serde_json::json!({"style_summary": "noir", "scenes": []});
        let report = validate_storyboard_schema(&value);
        assert!(report.is_failed());
    }

    #[test]
    fn storyboard_schema_fails_missing_scene_fields() {
        let value = serde_json::json!({
            "style_summary": "noir",
            "scenes": [{"scene_number": 1}]
        });
        let report = validate_storyboard_schema(&value);
        assert!(report.is_failed());
    }

    #[test]
    fn merge_reports_prefers_new_per_key() {
        let mut old = HashMap::new();
        old.insert(
            "medium".to_string(),
            ChannelReport::Schema {
                passed: false,
                details: "stale".into(),
            },
        );
        old.insert(
            "habr".to_string(),
            ChannelReport::Schema {
                passed: true,
                details: String::new(),
            },
        );
        let mut new = HashMap::new();
        new.insert(
            "medium".to_string(),
            ChannelReport::Schema {
                passed: true,
                details: String::new(),
            },
        );
        let merged = Validator::merge_reports(old, new);
        assert!(!merged["medium"].is_failed());
        assert!(!merged["habr"].is_failed());
    }
}
