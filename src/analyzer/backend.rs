//! AIバックエンドの境界
//!
//! オーケストレータはこのトレイトだけに依存する。
//! 実装は Gemini（gemini.rs）とテスト用のモック。

use crate::config::Config;
use crate::error::Result;
use crate::scanner::DocumentCategory;
use async_trait::async_trait;
use medimind_common::GroundingChunk;

/// 送信用に変換済みの文書（Base64）
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedDocument {
    pub file_name: String,
    pub mime_type: String,
    pub category: DocumentCategory,
    pub data: String,
}

/// 生成オプション
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub thinking_budget: Option<u32>,
    /// Google検索によるグラウンディング
    pub google_search: bool,
    pub response_mime_type: Option<String>,
}

impl GenerationOptions {
    /// 本解析（レポート生成）用
    pub fn report(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: Some(config.max_output_tokens),
            thinking_budget: Some(config.thinking_budget),
            google_search: true,
            response_mime_type: None,
        }
    }

    /// 補助機能（チャット等）用: 検索あり、温度0.2
    pub fn assistant(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: 0.2,
            max_output_tokens: None,
            thinking_budget: None,
            google_search: true,
            response_mime_type: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub documents: Vec<EncodedDocument>,
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    pub grounding_chunks: Vec<GroundingChunk>,
}

/// 生成AIの呼び出し（遅い・失敗しうる・非構造テキストを返す）
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;
}
