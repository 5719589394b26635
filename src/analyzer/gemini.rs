//! Gemini API連携
//!
//! generateContent を reqwest で呼び出す。
//! - リクエスト: 文書（inline_data）→ テキストの順に parts を並べる
//! - レスポンス: 先頭候補のテキスト部分を連結、groundingChunks を引用として返す

use super::backend::{AiBackend, GenerateRequest, GenerateResponse};
use crate::config::Config;
use crate::error::{MediMindError, Result};
use async_trait::async_trait;
use medimind_common::GroundingChunk;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini APIリクエスト
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

/// Gemini APIレスポンス
#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediMindError::Config(format!("HTTPクライアント初期化エラー: {}", e)))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }

    /// 設定からクライアントを作成（APIキーが無ければ MissingApiKey）
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.get_api_key()?;
        Self::new(api_key, Duration::from_secs(config.timeout_seconds))
    }
}

#[async_trait]
impl AiBackend for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, request.options.model);
        let body = build_request(request);

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MediMindError::ApiCall(format!("通信エラー: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(MediMindError::ApiCall(format!("API error {}: {}", status, text)));
        }

        let payload: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| MediMindError::ApiParse(e.to_string()))?;

        let response = into_generate_response(payload);
        debug!(chars = response.text.len(), citations = response.grounding_chunks.len(), "Gemini応答");
        Ok(response)
    }
}

fn build_request(request: GenerateRequest) -> GeminiRequest {
    let mut parts: Vec<Part> = request
        .documents
        .into_iter()
        .map(|doc| Part::InlineData {
            inline_data: InlineData {
                mime_type: doc.mime_type,
                data: doc.data,
            },
        })
        .collect();
    parts.push(Part::Text { text: request.prompt });

    let options = request.options;

    GeminiRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        system_instruction: request.system_instruction.map(|text| Content {
            role: None,
            parts: vec![Part::Text { text }],
        }),
        tools: if options.google_search {
            vec![Tool { google_search: GoogleSearch {} }]
        } else {
            Vec::new()
        },
        generation_config: GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
            thinking_config: options
                .thinking_budget
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            response_mime_type: options.response_mime_type,
        },
    }
}

/// 先頭候補のテキスト（思考部分を除く）と引用を取り出す。候補が無ければ空
fn into_generate_response(payload: GeminiResponse) -> GenerateResponse {
    let Some(candidate) = payload.candidates.into_iter().next() else {
        return GenerateResponse::default();
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    let grounding_chunks = candidate
        .grounding_metadata
        .map(|m| m.grounding_chunks)
        .unwrap_or_default();

    GenerateResponse {
        text,
        grounding_chunks,
    }
}
