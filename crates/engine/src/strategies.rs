//! Research strategies — one prompting technique each
//!
//! The chain tries them in order of decreasing ambition: agentic multi-call
//! reasoning, then a single structured-schema extraction, then free text with
//! heuristic parsing. Each strategy returns a tagged failure instead of
//! panicking so the chain can advance.

use crate::api::chat::{ChatClient, ChatMessage};
use crate::normalize::{extract_json, normalize, normalize_text};
use crate::research::ResearchProgress;
use crate::types::{ResearchRequest, ResearchResult};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("provider call failed: {0}")]
    Provider(String),

    #[error("unusable output: {0}")]
    Unusable(String),

    #[error("research cancelled")]
    Cancelled,
}

/// One complete technique for producing a ResearchResult
#[async_trait]
pub trait ResearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        client: &ChatClient,
        request: &ResearchRequest,
        progress: &ResearchProgress,
    ) -> Result<ResearchResult, StrategyError>;
}

/// The default chain, most capable first
pub fn default_strategies() -> Vec<Box<dyn ResearchStrategy>> {
    vec![
        Box::new(AgenticStrategy),
        Box::new(StructuredSchemaStrategy),
        Box::new(SimpleTextStrategy),
    ]
}

fn subject_block(request: &ResearchRequest) -> String {
    let mut block = format!("dApp: {}", request.subject_name);
    if let Some(category) = &request.category {
        block.push_str(&format!("\nCategory: {category}"));
    }
    if !request.chains.is_empty() {
        block.push_str(&format!("\nChains: {}", request.chains.join(", ")));
    }
    if let Some(description) = &request.subject_description {
        block.push_str(&format!("\nKnown description: {description}"));
    }
    block
}

const SCHEMA_SKELETON: &str = r#"{
  "overview": "2-3 sentence summary",
  "features": ["..."],
  "developments": [{"date": "YYYY-MM", "description": "..."}],
  "sentiment": {"positive": 0-100},
  "competitors": ["..."],
  "strengths": ["..."],
  "weaknesses": ["..."],
  "futureOutlook": "...",
  "riskFactors": ["..."]
}"#;

async fn complete(
    client: &ChatClient,
    messages: &[ChatMessage],
    temperature: f64,
) -> Result<String, StrategyError> {
    client
        .complete(messages, temperature)
        .await
        .map_err(|e| StrategyError::Provider(e.to_string()))
}

/// Parse a completion expected to be JSON; requires a real overview so a
/// hallucinated-empty object fails the strategy rather than degrading it.
fn parse_structured(text: &str) -> Result<ResearchResult, StrategyError> {
    let value: Value = extract_json(text)
        .ok_or_else(|| StrategyError::Unusable("no JSON object in completion".into()))?;
    let has_overview = value
        .get("overview")
        .and_then(Value::as_str)
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if !has_overview {
        return Err(StrategyError::Unusable("JSON missing overview".into()));
    }
    Ok(normalize(&value))
}

fn check_cancelled(progress: &ResearchProgress) -> Result<(), StrategyError> {
    if progress.is_cancelled() {
        return Err(StrategyError::Cancelled);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Agentic: analyze -> evaluate -> synthesize
// ---------------------------------------------------------------------------

/// Three sequential provider calls building up to a final JSON synthesis.
/// Any sub-call failing fails the whole strategy; the chain never retries
/// individual sub-calls.
pub struct AgenticStrategy;

#[async_trait]
impl ResearchStrategy for AgenticStrategy {
    fn name(&self) -> &'static str {
        "agentic"
    }

    async fn run(
        &self,
        client: &ChatClient,
        request: &ResearchRequest,
        progress: &ResearchProgress,
    ) -> Result<ResearchResult, StrategyError> {
        let system = ChatMessage::system(
            "You are a thorough crypto dApp research analyst. Be factual and concise.",
        );

        check_cancelled(progress)?;
        progress.report(10, "Analyzing the dApp");
        let analysis = complete(
            client,
            &[
                system.clone(),
                ChatMessage::user(format!(
                    "Analyze this decentralized application: what it does, who uses it, \
                     and how it fits its market.\n\n{}",
                    subject_block(request)
                )),
            ],
            0.4,
        )
        .await?;

        check_cancelled(progress)?;
        progress.report(22, "Evaluating features and competitors");
        let evaluation = complete(
            client,
            &[
                system.clone(),
                ChatMessage::user(format!(
                    "Based on the analysis below, evaluate the dApp's key features, main \
                     competitors, strengths, weaknesses, notable risks, and recent \
                     developments. Estimate community sentiment as a positive percentage.\n\n\
                     Analysis:\n{analysis}"
                )),
            ],
            0.4,
        )
        .await?;

        check_cancelled(progress)?;
        progress.report(34, "Synthesizing research report");
        let synthesis = complete(
            client,
            &[
                system,
                ChatMessage::user(format!(
                    "Combine the analysis and evaluation below into a single research \
                     report. Respond with ONLY a JSON object in this shape:\n{SCHEMA_SKELETON}\n\n\
                     Analysis:\n{analysis}\n\nEvaluation:\n{evaluation}"
                )),
            ],
            0.2,
        )
        .await?;

        parse_structured(&synthesis)
    }
}

// ---------------------------------------------------------------------------
// Structured schema: one strict-JSON call
// ---------------------------------------------------------------------------

pub struct StructuredSchemaStrategy;

#[async_trait]
impl ResearchStrategy for StructuredSchemaStrategy {
    fn name(&self) -> &'static str {
        "structured_schema"
    }

    async fn run(
        &self,
        client: &ChatClient,
        request: &ResearchRequest,
        progress: &ResearchProgress,
    ) -> Result<ResearchResult, StrategyError> {
        check_cancelled(progress)?;
        progress.report(50, "Requesting structured research data");

        let completion = complete(
            client,
            &[
                ChatMessage::system(
                    "You are a crypto dApp research analyst. You respond with valid JSON \
                     only — no prose, no code fences.",
                ),
                ChatMessage::user(format!(
                    "Research this dApp and fill in the JSON schema below. Omit fields \
                     you have no information for.\n\nSchema:\n{SCHEMA_SKELETON}\n\n{}",
                    subject_block(request)
                )),
            ],
            0.2,
        )
        .await?;

        parse_structured(&completion)
    }
}

// ---------------------------------------------------------------------------
// Simple text: free prose, heuristically parsed
// ---------------------------------------------------------------------------

pub struct SimpleTextStrategy;

#[async_trait]
impl ResearchStrategy for SimpleTextStrategy {
    fn name(&self) -> &'static str {
        "simple_text"
    }

    async fn run(
        &self,
        client: &ChatClient,
        request: &ResearchRequest,
        progress: &ResearchProgress,
    ) -> Result<ResearchResult, StrategyError> {
        check_cancelled(progress)?;
        progress.report(75, "Gathering a plain-text briefing");

        let completion = complete(
            client,
            &[ChatMessage::user(format!(
                "Write a short research briefing about the dApp below. Use headed \
                 sections: Overview, Features, Competitors, Strengths, Weaknesses, \
                 Future Outlook. Include an estimated community sentiment as a \
                 percentage, e.g. \"70% positive\".\n\n{}",
                subject_block(request)
            ))],
            0.5,
        )
        .await?;

        if completion.trim().is_empty() {
            return Err(StrategyError::Unusable("empty completion".into()));
        }
        Ok(normalize_text(&completion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::chat::{ChatTransport, ProviderConfig};
    use anyhow::Result;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Transport that replays a scripted sequence of completions
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value, String>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Value, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(
            &self,
            _config: &ProviderConfig,
            _messages: &[ChatMessage],
            _temperature: f64,
        ) -> Result<Value> {
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more times than scripted");
            next.map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn completion(text: &str) -> Result<Value, String> {
        Ok(json!({"choices": [{"message": {"content": text}}]}))
    }

    fn client(responses: Vec<Result<Value, String>>) -> ChatClient {
        ChatClient::with_transport(
            ProviderConfig {
                base_url: "http://fake".into(),
                api_key: "test".into(),
                model: "test-model".into(),
            },
            Arc::new(ScriptedTransport::new(responses)),
        )
    }

    fn request() -> ResearchRequest {
        ResearchRequest {
            subject_name: "Uniswap".into(),
            category: Some("DeFi".into()),
            chains: vec!["ethereum".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_agentic_three_calls_then_json() {
        let chat = client(vec![
            completion("Uniswap is the leading AMM."),
            completion("Features: swaps. Competitors: Curve. Sentiment about 80% positive."),
            completion(
                r#"{"overview": "Uniswap is the leading AMM DEX.",
                    "features": ["token swaps"],
                    "competitors": ["Curve"],
                    "sentiment": {"positive": 80}}"#,
            ),
        ]);
        let progress = ResearchProgress::new();

        let result = AgenticStrategy
            .run(&chat, &request(), &progress)
            .await
            .unwrap();
        assert_eq!(result.overview, "Uniswap is the leading AMM DEX.");
        assert_eq!(result.competitors, vec!["Curve"]);
        assert_eq!(result.sentiment.unwrap().positive, 80.0);
    }

    #[tokio::test]
    async fn test_agentic_sub_call_failure_fails_whole_strategy() {
        let chat = client(vec![
            completion("Analysis ok."),
            Err("provider 500".into()),
        ]);
        let progress = ResearchProgress::new();

        let err = AgenticStrategy
            .run(&chat, &request(), &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Provider(_)));
    }

    #[tokio::test]
    async fn test_structured_schema_accepts_fenced_json() {
        let chat = client(vec![completion(
            "```json\n{\"overview\": \"Aave lends assets.\", \"strengths\": [\"battle-tested\"]}\n```",
        )]);
        let progress = ResearchProgress::new();

        let result = StructuredSchemaStrategy
            .run(&chat, &request(), &progress)
            .await
            .unwrap();
        assert_eq!(result.overview, "Aave lends assets.");
        assert_eq!(result.strengths, vec!["battle-tested"]);
    }

    #[tokio::test]
    async fn test_structured_schema_rejects_overview_free_output() {
        let chat = client(vec![completion("{\"features\": [\"something\"]}")]);
        let progress = ResearchProgress::new();

        let err = StructuredSchemaStrategy
            .run(&chat, &request(), &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Unusable(_)));
    }

    #[tokio::test]
    async fn test_simple_text_parses_prose() {
        let chat = client(vec![completion(
            "# Overview\nGMX is a perps DEX.\n\n# Strengths\n- deep liquidity\n\n# Sentiment\nAround 64% positive",
        )]);
        let progress = ResearchProgress::new();

        let result = SimpleTextStrategy
            .run(&chat, &request(), &progress)
            .await
            .unwrap();
        assert_eq!(result.overview, "GMX is a perps DEX.");
        assert_eq!(result.strengths, vec!["deep liquidity"]);
        assert_eq!(result.sentiment.unwrap().positive, 64.0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_short_circuits() {
        let chat = client(vec![]);
        let progress = ResearchProgress::new();
        progress.cancel();

        let err = AgenticStrategy
            .run(&chat, &request(), &progress)
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Cancelled));
    }
}
