//! Google Gemini backend (Generative Language API `generateContent`)
//!
//! # Configuration
//!
//! Environment variables:
//! - `GEMINI_API_KEY`: API key (required)
//! - `GEMINI_MODEL`: Model name (default: gemini-2.5-flash)
//! - `GEMINI_HOST`: API base URL (default: https://generativelanguage.googleapis.com)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::prompts::RenderedPrompt;

use super::PlanProvider;

pub const DEFAULT_GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Create from environment variables
    ///
    /// Required: `GEMINI_API_KEY`
    /// Optional: `GEMINI_MODEL`, `GEMINI_HOST`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").ok()?;
        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
        let host = std::env::var("GEMINI_HOST").unwrap_or_else(|_| DEFAULT_GEMINI_HOST.to_string());
        Some(Self::new(&host, &model, &api_key))
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/v1beta/models/{}{}", self.base_url, self.model, action)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_content(text: String) -> Content {
    Content {
        parts: vec![Part { text }],
    }
}

#[async_trait]
impl PlanProvider for GeminiBackend {
    async fn complete(&self, prompt: &RenderedPrompt, temperature: f32) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![text_content(prompt.user.clone())],
            system_instruction: prompt.system.clone().map(text_content),
            generation_config: GenerationConfig { temperature },
        };

        let response = self
            .http_client
            .post(self.endpoint(":generateContent"))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(Error::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_provider_status(
                status.as_u16(),
                format!("Gemini API error: {}", body),
            ));
        }

        let body: GenerateContentResponse = response.json().await?;
        debug!(model = %self.model, candidates = body.candidates.len(), "Gemini response received");

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::InvalidPlanFormat("Gemini returned no candidate text".into()))
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(self.endpoint(""))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let request = GenerateContentRequest {
            contents: vec![text_content("user text".into())],
            system_instruction: Some(text_content("system text".into())),
            generation_config: GenerationConfig { temperature: 0.3 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "user text");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "system text");
        assert!(json["generationConfig"]["temperature"].as_f64().unwrap() > 0.29);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let backend = GeminiBackend::new("http://localhost:9999/", "gemini-test", "k");
        assert_eq!(
            backend.endpoint(":generateContent"),
            "http://localhost:9999/v1beta/models/gemini-test:generateContent"
        );
        assert_eq!(backend.with_model("other").model(), "other");
    }
}
