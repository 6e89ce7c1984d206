//! Recipe suggestions from a chat-completion API.
//!
//! [`ChatRecipes`] sends the current item names to an OpenAI-compatible
//! `POST /v1/chat/completions` endpoint and returns every completion as a
//! suggestion. The bearer token is read from the environment variable named
//! by `recipes.api_key_env` at call time.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RecipesConfig;
use crate::upstream::{self, UpstreamError};

const SERVICE: &str = "recipes";
const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[async_trait]
pub trait RecipeSource: Send + Sync {
    /// Suggest recipes that use the given ingredient names.
    async fn suggest(&self, ingredients: &[String]) -> Result<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// The user prompt for a list of ingredients.
pub fn recipe_prompt(ingredients: &[String]) -> String {
    format!(
        "Suggest a recipe using the following ingredients: {}",
        ingredients.join(", ")
    )
}

pub struct ChatRecipes {
    config: RecipesConfig,
    client: reqwest::Client,
}

impl ChatRecipes {
    pub fn new(config: &RecipesConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: upstream::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl RecipeSource for ChatRecipes {
    async fn suggest(&self, ingredients: &[String]) -> Result<Vec<String>> {
        let api_key = upstream::api_key(&self.config.api_key_env)?;
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: recipe_prompt(ingredients),
                },
            ],
            max_tokens: self.config.max_tokens,
        };

        let response = upstream::send_with_retry(SERVICE, self.config.max_retries, || {
            Ok(self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(&api_key)
                .json(&body))
        })
        .await?;

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| UpstreamError::InvalidResponse {
                    service: SERVICE,
                    reason: e.to_string(),
                })?;

        Ok(parsed
            .choices
            .into_iter()
            .map(|c| c.message.content.trim().to_string())
            .collect())
    }
}
