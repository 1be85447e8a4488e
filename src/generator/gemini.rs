//! Generative text service client
//!
//! Speaks the Gemini `generateContent` REST API in JSON mode.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::GenerateError;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One structured-output request
#[derive(Debug, Clone)]
pub struct JsonRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub schema: Value,
}

/// A service that answers a prompt with JSON text matching a schema
pub trait TextModel: Send + Sync + 'static {
    fn generate_json(
        &self,
        request: JsonRequest,
    ) -> impl Future<Output = Result<String, GenerateError>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini-backed text model
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiModel {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GenerateError::Request(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", API_BASE, self.model)
    }
}

fn request_body(request: &JsonRequest) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: &request.system_instruction,
            }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part {
                text: &request.prompt,
            }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: &request.schema,
        },
    }
}

/// Pull the text of the first candidate part out of a response body
fn extract_text(body: &str) -> Result<String, GenerateError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| GenerateError::Malformed(e.to_string()))?;

    response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .ok_or_else(|| GenerateError::Malformed("response contained no text".to_string()))
}

impl TextModel for GeminiModel {
    fn generate_json(
        &self,
        request: JsonRequest,
    ) -> impl Future<Output = Result<String, GenerateError>> + Send {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let endpoint = self.endpoint();

        async move {
            let api_key = api_key.ok_or(GenerateError::MissingApiKey)?;

            log::debug!("POST {}", endpoint);
            let response = client
                .post(&endpoint)
                .header("x-goog-api-key", api_key)
                .json(&request_body(&request))
                .send()
                .await
                .map_err(|e| GenerateError::Request(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| GenerateError::Request(e.to_string()))?;

            if !status.is_success() {
                return Err(GenerateError::Service {
                    status: status.as_u16(),
                    body,
                });
            }

            extract_text(&body)
        }
    }
}
