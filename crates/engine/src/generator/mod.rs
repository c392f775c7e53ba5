//! Generator: map (chunk → summary) and reduce (summaries → channel
//! artifacts), parallel within each phase.

pub mod prompts;

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::chunker::Chunk;
use crate::error::EngineError;
use crate::llm::LlmClient;
use crate::{ChannelReport, REDUCE_SUMMARY_KEY, WMAP, WRED};

/// The fixed separator joining map-phase summaries before reduce.
pub const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// One entry of the fixed five-channel reduce catalog.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSpec {
    pub payload_key: &'static str,
    pub platform: &'static str,
    pub system_prompt: &'static str,
    pub emits_json: bool,
}

/// The fixed channel catalog: one entry per output platform.
pub const CHANNEL_CATALOG: [ChannelSpec; 5] = [
    ChannelSpec {
        payload_key: "medium_text",
        platform: "medium",
        system_prompt: prompts::MEDIUM_SYSTEM_PROMPT,
        emits_json: false,
    },
    ChannelSpec {
        payload_key: "habr_text",
        platform: "habr",
        system_prompt: prompts::HABR_SYSTEM_PROMPT,
        emits_json: false,
    },
    ChannelSpec {
        payload_key: "linkedin_text",
        platform: "linkedin",
        system_prompt: prompts::LINKEDIN_SYSTEM_PROMPT,
        emits_json: false,
    },
    ChannelSpec {
        payload_key: "research_article",
        platform: "research_article",
        system_prompt: prompts::RESEARCH_ARTICLE_SYSTEM_PROMPT,
        emits_json: false,
    },
    ChannelSpec {
        payload_key: "banana_video_prompt",
        platform: "banana_video_prompt",
        system_prompt: prompts::BANANA_VIDEO_PROMPT_SYSTEM_PROMPT,
        emits_json: true,
    },
];

/// Map/reduce generation driven by an injected [`LlmClient`] and the
/// model-tier names resolved by `EngineConfig`.
pub struct Generator {
    llm: Arc<dyn LlmClient>,
    map_model: String,
    reduce_model: String,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmClient>, map_model: String, reduce_model: String) -> Self {
        Self {
            llm,
            map_model,
            reduce_model,
        }
    }

    /// Map phase: one text completion per chunk, fanned out up to
    /// `min(WMAP, chunk_count)` concurrent workers, re-sorted by input
    /// index before return.
    #[tracing::instrument(skip(self, chunks), fields(chunk_count = chunks.len()))]
    pub async fn map_chunks(&self, chunks: &[Chunk]) -> Result<Vec<String>, EngineError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let concurrency = WMAP.min(chunks.len());

        let results: Vec<Result<(usize, String), EngineError>> = stream::iter(chunks.iter().cloned())
            .map(|chunk| {
                let llm = self.llm.clone();
                let model = self.map_model.clone();
                async move {
                    let summary = llm
                        .complete_text(&model, prompts::MAP_SYSTEM_PROMPT, &chunk.text)
                        .await?;
                    Ok((chunk.index, summary))
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut ordered: Vec<Option<String>> = vec![None; chunks.len()];
        for result in results {
            let (index, summary) = result?;
            ordered[index] = Some(summary);
        }
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.ok_or_else(|| EngineError::Internal(format!("map phase missing result for chunk {i}"))))
            .collect()
    }

    /// Reduce phase: one completion per in-scope channel, fanned out up to
    /// `min(WRED, task_count)` concurrent workers. When a validation report
    /// and previous texts are both supplied, a revision addendum is
    /// appended to the channel's system prompt.
    #[tracing::instrument(skip(self, summaries, validation_report, previous_texts, channels))]
    pub async fn reduce(
        &self,
        summaries: &[String],
        validation_report: Option<&HashMap<String, ChannelReport>>,
        previous_texts: Option<&HashMap<String, serde_json::Value>>,
        channels: Option<&HashSet<String>>,
    ) -> Result<HashMap<String, serde_json::Value>, EngineError> {
        let joined = summaries.join(SUMMARY_SEPARATOR);

        let in_scope: Vec<&ChannelSpec> = CHANNEL_CATALOG
            .iter()
            .filter(|c| channels.map(|set| set.contains(c.payload_key)).unwrap_or(true))
            .collect();

        if in_scope.is_empty() {
            let mut out = HashMap::new();
            out.insert(
                REDUCE_SUMMARY_KEY.to_string(),
                serde_json::Value::String(joined),
            );
            return Ok(out);
        }

        let concurrency = WRED.min(in_scope.len());

        let results: Vec<Result<(&'static str, serde_json::Value), EngineError>> =
            stream::iter(in_scope.into_iter())
                .map(|spec| {
                    let llm = self.llm.clone();
                    let model = self.reduce_model.clone();
                    let joined = joined.clone();
                    let system_prompt = build_system_prompt(spec, validation_report, previous_texts);
                    async move {
                        let value = if spec.emits_json {
                            llm.complete_json(&model, &system_prompt, &joined).await?
                        } else {
                            serde_json::Value::String(
                                llm.complete_text(&model, &system_prompt, &joined).await?,
                            )
                        };
                        Ok((spec.payload_key, value))
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut payload = HashMap::new();
        for result in results {
            let (key, value) = result?;
            payload.insert(key.to_string(), value);
        }
        payload.insert(
            REDUCE_SUMMARY_KEY.to_string(),
            serde_json::Value::String(joined),
        );
        Ok(payload)
    }
}

fn build_system_prompt(
    spec: &ChannelSpec,
    validation_report: Option<&HashMap<String, ChannelReport>>,
    previous_texts: Option<&HashMap<String, serde_json::Value>>,
) -> String {
    let mut prompt = format!("{}{}", spec.system_prompt, prompts::ANTI_HALLUCINATION_GUARD);

    if let (Some(report), Some(previous)) = (validation_report, previous_texts) {
        let entry = report
            .get(spec.platform)
            .or_else(|| report.get(spec.payload_key));
        let previous_text = previous
            .get(spec.payload_key)
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        if let Some(entry) = entry {
            let report_json = serde_json::to_string_pretty(entry).unwrap_or_default();
            prompt.push_str(&prompts::revision_addendum(&report_json, &previous_text));
        }
    }

    prompt
}

/// Extract the set of failed channels from a validation report. Lookup
/// tries the platform name first, then the payload key, matching the
/// merge rule's key space.
pub fn failed_channels(report: &HashMap<String, ChannelReport>) -> HashSet<String> {
    CHANNEL_CATALOG
        .iter()
        .filter_map(|spec| {
            let entry = report.get(spec.platform).or_else(|| report.get(spec.payload_key))?;
            entry.is_failed().then(|| spec.payload_key.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoLlm {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl EchoLlm {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn complete_text(
            &self,
            _model: &str,
            system_prompt: &str,
            user_input: &str,
        ) -> Result<String, EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_input.to_string()));
            Ok(format!("summary:{user_input}"))
        }

        async fn complete_json(
            &self,
            _model: &str,
            _system_prompt: &str,
            _user_input: &str,
        ) -> Result<serde_json::Value, EngineError> {
            Ok(serde_json::json!({
                "style_summary": "noir",
                "scenes": [{"scene_number": 1, "visual_prompt": "p", "voiceover_text": "v"}]
            }))
        }
    }

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn map_chunks_reorders_by_index_regardless_of_fanout() {
        let llm = Arc::new(EchoLlm::new());
        let gen = Generator::new(llm, "mini".into(), "mini".into());
        let chunks = vec![chunk(0, "a"), chunk(1, "b"), chunk(2, "c")];
        let summaries = gen.map_chunks(&chunks).await.unwrap();
        assert_eq!(summaries, vec!["summary:a", "summary:b", "summary:c"]);
    }

    #[tokio::test]
    async fn reduce_restricted_to_channels_only_calls_those() {
        let llm = Arc::new(EchoLlm::new());
        let gen = Generator::new(llm, "mini".into(), "mini".into());
        let mut only = HashSet::new();
        only.insert("medium_text".to_string());
        let payload = gen
            .reduce(&["s1".into()], None, None, Some(&only))
            .await
            .unwrap();
        assert!(payload.contains_key("medium_text"));
        assert!(!payload.contains_key("habr_text"));
        assert!(payload.contains_key(REDUCE_SUMMARY_KEY));
    }

    #[tokio::test]
    async fn reduce_full_catalog_emits_all_five_plus_summary() {
        let llm = Arc::new(EchoLlm::new());
        let gen = Generator::new(llm, "mini".into(), "mini".into());
        let payload = gen.reduce(&["s1".into(), "s2".into()], None, None, None).await.unwrap();
        assert_eq!(payload.len(), 6);
        assert!(payload["banana_video_prompt"]["scenes"].is_array());
    }

    #[test]
    fn failed_channels_looks_up_by_platform_then_key() {
        let mut report = HashMap::new();
        report.insert(
            "medium".to_string(),
            ChannelReport::Checked {
                checks: vec![crate::CheckResult {
                    name: "hallucination".into(),
                    passed: false,
                    details: "x".into(),
                }],
            },
        );
        let failed = failed_channels(&report);
        assert!(failed.contains("medium_text"));
        assert_eq!(failed.len(), 1);
    }
}
