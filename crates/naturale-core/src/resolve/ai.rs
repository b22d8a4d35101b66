//! Optional AI collaborator: prompt assembly, the Azure OpenAI
//! chat-completions client and reply parsing.

use std::sync::LazyLock;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AiConfig;
use crate::errors::{NaturaleError, NaturaleResult};
use crate::models::{MetadataSnapshot, TranslationContext};
use crate::query::guards::{
    MAX_PROMPT_ALLOWED_VALUES, MAX_PROMPT_FIELDS_PER_TYPE, MAX_PROMPT_ITERATIONS, MAX_PROMPT_TEAM_MEMBERS,
};
use crate::query::{analyzer, compiler, hosting};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).unwrap());

/// Worked examples embedded in each prompt.
const PROMPT_EXAMPLES: usize = 3;

const SYSTEM_PROMPT: &str = "You are an expert Azure DevOps Work Item Query Language (WIQL) generator.
Your task is to convert natural language queries into valid Azure DevOps query URLs.

IMPORTANT RULES:
1. Return ONLY a valid Azure DevOps query URL
2. Use the exact field names and values provided in the metadata
3. Ensure proper URL encoding
4. Use appropriate WIQL operators and syntax
5. Include proper SELECT, FROM, WHERE, and ORDER BY clauses

RESPONSE FORMAT:
Return a JSON object with:
{
  \"url\": \"the complete Azure DevOps query URL\",
  \"reasoning\": \"brief explanation of the query logic\"
}";

/// What the collaborator proposes. The URL is validated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiSuggestion {
    pub url: String,
    pub reasoning: Option<String>,
}

#[async_trait]
pub trait AiCollaborator: Send + Sync {
    async fn suggest(
        &self,
        text: &str,
        snapshot: &MetadataSnapshot,
        context: &TranslationContext,
    ) -> NaturaleResult<AiSuggestion>;
}

// ---------------------------------------------------------------------------
// Prompt assembly
// ---------------------------------------------------------------------------

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

fn bounded_values(values: &[String]) -> String {
    let shown: Vec<&str> = values
        .iter()
        .take(MAX_PROMPT_ALLOWED_VALUES)
        .map(String::as_str)
        .collect();
    let more = if values.len() > MAX_PROMPT_ALLOWED_VALUES { "..." } else { "" };
    format!(" [{}{more}]", shown.join(", "))
}

/// Schema section: types with a bounded field list, phrase mappings, team
/// members, iterations and operators.
pub fn metadata_prompt(snapshot: &MetadataSnapshot) -> String {
    let types: Vec<String> = snapshot
        .work_item_types
        .iter()
        .map(|(name, info)| {
            let field_lines: Vec<String> = info
                .fields
                .iter()
                .filter(|(_, f)| f.queryable)
                .take(MAX_PROMPT_FIELDS_PER_TYPE)
                .map(|(reference, f)| {
                    let mut line = format!("  - {} ({reference}): {}", f.name, f.field_type);
                    if !f.allowed_values.is_empty() {
                        line.push_str(&bounded_values(&f.allowed_values));
                    }
                    line
                })
                .collect();
            format!("{name}:\n{}", field_lines.join("\n"))
        })
        .collect();

    let common: Vec<String> = snapshot
        .common_fields
        .iter()
        .map(|(phrase, field)| format!("  \"{phrase}\" -> {field}"))
        .collect();
    let members: Vec<String> = snapshot
        .team_members
        .iter()
        .take(MAX_PROMPT_TEAM_MEMBERS)
        .map(|m| format!("  - {} ({})", m.display_name, m.unique_name))
        .collect();
    let iterations: Vec<String> = snapshot
        .iterations
        .iter()
        .take(MAX_PROMPT_ITERATIONS)
        .map(|it| format!("  - {} ({})", it.name, it.path))
        .collect();
    let ops = &snapshot.query_operators;

    format!(
        "METADATA:\nOrganization: {}\nProject: {}\n\nWork Item Types and Fields:\n{}\n\n\
         Common Field Mappings:\n{}\n\nTeam Members:\n{}\n\nIterations/Sprints:\n{}\n\n\
         Query Operators:\n  Equality: {}\n  Comparison: {}\n  Text: {}\n  Special Values: {}",
        snapshot.organization,
        snapshot.project,
        types.join("\n\n"),
        common.join("\n"),
        members.join("\n"),
        iterations.join("\n"),
        ops.equality.join(", "),
        ops.comparison.join(", "),
        ops.text.join(", "),
        ops.special.iter().chain(ops.date.iter()).cloned().collect::<Vec<_>>().join(", "),
    )
}

pub fn context_prompt(snapshot: &MetadataSnapshot, context: &TranslationContext, now: DateTime<Utc>) -> String {
    let base = hosting::query_base(context).unwrap_or_else(|| "https://dev.azure.com/{org}/{project}/_queries/query/".to_string());
    let user = context.current_user.as_deref().unwrap_or("@Me");
    let iteration = context
        .current_iteration
        .clone()
        .or_else(|| snapshot.current_iteration(now).map(|it| it.path.clone()))
        .unwrap_or_else(|| "@CurrentIteration".to_string());
    format!(
        "CONTEXT:\nBase URL: {base}\nCurrent User: {user}\nCurrent Iteration: {iteration}\n\
         Current Date: {}\nURL Format: {{baseUrl}}?wiql={{encoded_wiql_query}}",
        now.format("%Y-%m-%d")
    )
}

/// Worked examples produced by the local compiler, so the model sees URLs
/// in exactly the shape the validator accepts.
pub fn examples_prompt(snapshot: &MetadataSnapshot, context: &TranslationContext) -> String {
    let mut lines = vec!["EXAMPLES:".to_string()];
    for example in analyzer::EXAMPLE_QUERIES.iter().take(PROMPT_EXAMPLES) {
        let query = analyzer::analyze(example, snapshot, context);
        match compiler::compile(&query, snapshot, context) {
            Ok(compiled) => {
                lines.push(format!("Query: \"{example}\""));
                lines.push(format!("URL: {}", compiled.url));
            }
            Err(_) => break,
        }
    }
    lines.join("\n")
}

/// The user message: metadata, context, examples, then the request.
pub fn user_prompt(text: &str, snapshot: &MetadataSnapshot, context: &TranslationContext, now: DateTime<Utc>) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\nUser Query: \"{}\"\n\nGenerate the appropriate Azure DevOps query URL for this request.",
        metadata_prompt(snapshot),
        context_prompt(snapshot, context, now),
        examples_prompt(snapshot, context),
        text.trim()
    )
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

const URL_KEYS: &[&str] = &["url", "query_url", "queryUrl", "adoUrl", "result"];

/// Read a reply as a JSON object first, otherwise scan it for a URL.
pub fn parse_reply(content: &str) -> NaturaleResult<AiSuggestion> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(content) {
        let url = URL_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string);
        if let Some(url) = url {
            let reasoning = map
                .get("reasoning")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return Ok(AiSuggestion { url, reasoning });
        }
    }
    match URL_RE.find(content) {
        Some(found) => Ok(AiSuggestion {
            url: found.as_str().trim_end_matches(['.', ',', ')']).to_string(),
            reasoning: Some("Extracted URL from text response".to_string()),
        }),
        None => Err(NaturaleError::AiStrategy("Could not parse AI response".to_string())),
    }
}

// ---------------------------------------------------------------------------
// Azure OpenAI client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

pub struct AzureOpenAiCollaborator {
    client: Client,
    config: AiConfig,
}

impl AzureOpenAiCollaborator {
    pub fn new(config: &AiConfig) -> NaturaleResult<Self> {
        if !config.is_configured() {
            return Err(NaturaleError::Config("AI endpoint and api key are required".to_string()));
        }
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.config.deployment)
        )
    }
}

#[async_trait]
impl AiCollaborator for AzureOpenAiCollaborator {
    async fn suggest(
        &self,
        text: &str,
        snapshot: &MetadataSnapshot,
        context: &TranslationContext,
    ) -> NaturaleResult<AiSuggestion> {
        let request = ChatCompletionRequest {
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt(text, snapshot, context, Utc::now()),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let start = Instant::now();
        let response = self
            .client
            .post(self.completions_url())
            .query(&[("api-version", self.config.api_version.as_str())])
            .header("api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "AI completion request failed");
            return Err(NaturaleError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let completion: ChatCompletionResponse = response.json().await?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "AI completion received");

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| NaturaleError::AiStrategy("No response from AI service".to_string()))?;
        parse_reply(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fallback::fallback_snapshot;
    use crate::models::{Iteration, TeamMember};

    #[test]
    fn test_parse_reply_json_keys() {
        let reply = parse_reply(r#"{"queryUrl": "https://dev.azure.com/a/b/_queries/query/?wiql=x", "reasoning": "bugs"}"#)
            .unwrap();
        assert_eq!(reply.url, "https://dev.azure.com/a/b/_queries/query/?wiql=x");
        assert_eq!(reply.reasoning.as_deref(), Some("bugs"));
    }

    #[test]
    fn test_parse_reply_scans_text() {
        let reply = parse_reply("Here you go: https://dev.azure.com/a/b/_queries/query/?wiql=x.").unwrap();
        assert_eq!(reply.url, "https://dev.azure.com/a/b/_queries/query/?wiql=x");
        assert!(parse_reply("no link here").is_err());
    }

    #[test]
    fn test_metadata_prompt_is_bounded() {
        let mut snapshot = fallback_snapshot("acme", "web");
        snapshot.team_members = (0..25)
            .map(|i| TeamMember {
                display_name: format!("Person {i}"),
                unique_name: format!("p{i}@acme.com"),
                teams: vec![],
            })
            .collect();
        let prompt = metadata_prompt(&snapshot);
        assert!(prompt.contains("Person 9"));
        assert!(!prompt.contains("Person 10"));
        assert!(prompt.contains("Organization: acme"));
        assert!(prompt.contains("\"assigned to\" -> System.AssignedTo"));
    }

    #[test]
    fn test_context_prompt_uses_current_iteration() {
        let mut snapshot = fallback_snapshot("acme", "web");
        snapshot.iterations.push(Iteration {
            name: "Sprint 7".into(),
            path: "web\\Sprint 7".into(),
            time_frame: Some("current".into()),
            ..Iteration::default()
        });
        let context = TranslationContext::new("acme", "web").with_current_user("ana@acme.com");
        let prompt = context_prompt(&snapshot, &context, Utc::now());
        assert!(prompt.contains("Base URL: https://dev.azure.com/acme/web/_queries/query/"));
        assert!(prompt.contains("Current User: ana@acme.com"));
        assert!(prompt.contains("Current Iteration: web\\Sprint 7"));
    }

    #[test]
    fn test_examples_are_compiled_locally() {
        let snapshot = fallback_snapshot("acme", "web");
        let prompt = examples_prompt(&snapshot, &TranslationContext::new("acme", "web"));
        assert!(prompt.contains("Query: \"Show me my bugs\""));
        assert!(prompt.contains("URL: https://dev.azure.com/acme/web/_queries/query/?wiql="));
        assert_eq!(prompt.matches("URL: ").count(), PROMPT_EXAMPLES);
    }

    #[test]
    fn test_unconfigured_client_is_rejected() {
        assert!(AzureOpenAiCollaborator::new(&AiConfig::default()).is_err());
    }
}
