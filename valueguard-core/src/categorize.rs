use crate::error::CategorizeError;
use rig::client::{completion::CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::openai;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.2,
        }
    }
}

/// What the model is asked to send back.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct CategorizeReply {
    /// Category names separated by commas.
    pub categories: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    pub categories: Vec<String>,
}

pub async fn categorize(config: &LlmConfig, report: &str) -> Result<Categories, CategorizeError> {
    let schema = serde_json::to_string(&schemars::schema_for!(CategorizeReply))?;
    let prompt = format!(
        "Given the following incident report, suggest the top 3 most relevant categories. \
         Respond with only the category names, each separated by a comma.\n\
         Return JSON only, matching this schema: {schema}\n\
         Incident Report: {report}"
    );

    let raw = run_prompt(
        config,
        "You are an AI assistant that categorizes incident reports into relevant categories.",
        &prompt,
    )
    .await?;
    let categories = parse_reply(&raw)?;
    tracing::debug!(?categories, "categorized report");
    Ok(Categories { categories })
}

async fn run_prompt(
    config: &LlmConfig,
    preamble: &str,
    prompt: &str,
) -> Result<String, CategorizeError> {
    if config.provider.to_lowercase() != "openai" {
        return Err(CategorizeError::UnsupportedProvider(config.provider.clone()));
    }

    let client = if config.api_key_env == "OPENAI_API_KEY" {
        openai::Client::from_env()
    } else {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| CategorizeError::MissingApiKey(config.api_key_env.clone()))?;
        openai::Client::new(&api_key).map_err(|e| CategorizeError::Client(e.to_string()))?
    };

    let agent = client
        .agent(&config.model)
        .preamble(preamble)
        .temperature(config.temperature)
        .build();

    agent
        .prompt(prompt)
        .await
        .map_err(|e| CategorizeError::Prompt(e.to_string()))
}

/// Accepts either the JSON reply or a bare comma-separated line.
pub fn parse_reply(raw: &str) -> Result<Vec<String>, CategorizeError> {
    let trimmed = strip_fence(raw);
    let reply: CategorizeReply = if trimmed.starts_with('{') {
        serde_json::from_str(trimmed)?
    } else {
        CategorizeReply {
            categories: Some(trimmed.to_string()).filter(|s| !s.is_empty()),
        }
    };

    let line = reply.categories.ok_or(CategorizeError::MissingCategories)?;
    Ok(split_categories(&line))
}

pub fn split_categories(line: &str) -> Vec<String> {
    line.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
