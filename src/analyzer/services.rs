//! 補助AI機能
//!
//! 保存済みレポートを文脈にした単発の呼び出し群（調査・要約・シミュレーション・チャット・スクライブ）。

use super::backend::{AiBackend, GenerateRequest, GenerationOptions};
use super::{now_millis, CaseSession};
use crate::config::Config;
use crate::error::{MediMindError, Result};
use medimind_common::prompts::{
    build_chat_prompt, build_research_prompt, build_scribe_prompt, build_simulation_prompt,
    build_summary_prompt, SYSTEM_INSTRUCTION,
};
use medimind_common::{
    extract_tag, parse_json_block, strip_code_fence, ChatMessage, ResponseTag, ScribeOutput,
    SimulationResult,
};
use tracing::debug;

/// モデルが何も返さなかった場合の調査結果
pub const RESEARCH_FALLBACK: &str = "Ricerca online non disponibile.";

/// モデルが何も返さなかった場合のチャット応答
pub const CHAT_FALLBACK: &str = "Errore.";

/// 最新エビデンスの調査（Google検索あり）
pub async fn deep_research<B: AiBackend + ?Sized>(
    backend: &B,
    config: &Config,
    report: &str,
) -> Result<String> {
    let response = backend
        .generate(GenerateRequest {
            documents: Vec::new(),
            prompt: build_research_prompt(report),
            system_instruction: Some(SYSTEM_INSTRUCTION.to_string()),
            options: GenerationOptions {
                max_output_tokens: Some(10_000),
                ..GenerationOptions::assistant(config)
            },
        })
        .await?;

    if response.text.trim().is_empty() {
        return Ok(RESEARCH_FALLBACK.to_string());
    }
    Ok(response.text)
}

/// エグゼクティブサマリー（軽量モデル）
pub async fn generate_short_summary<B: AiBackend + ?Sized>(
    backend: &B,
    config: &Config,
    report: &str,
) -> Result<String> {
    let response = backend
        .generate(GenerateRequest {
            documents: Vec::new(),
            prompt: build_summary_prompt(report),
            system_instruction: None,
            options: GenerationOptions {
                model: config.summary_model.clone(),
                google_search: false,
                ..GenerationOptions::assistant(config)
            },
        })
        .await?;

    Ok(response.text)
}

/// 治療介入の what-if シミュレーション（JSON応答）
pub async fn run_what_if_simulation<B: AiBackend + ?Sized>(
    backend: &B,
    config: &Config,
    intervention: &str,
    report: &str,
) -> Result<SimulationResult> {
    let response = backend
        .generate(GenerateRequest {
            documents: Vec::new(),
            prompt: build_simulation_prompt(intervention, report),
            system_instruction: None,
            options: GenerationOptions {
                google_search: false,
                response_mime_type: Some("application/json".to_string()),
                ..GenerationOptions::assistant(config)
            },
        })
        .await?;

    let body = strip_code_fence(&response.text);
    let body = if body.is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|e| MediMindError::ApiParse(e.to_string()))
}

/// 症例についてのチャット
///
/// ユーザー発言をセッションに追加してから問い合わせる。
/// 失敗時はエラーメッセージをモデル発言として残し、エラーを返す。
pub async fn chat<B: AiBackend + ?Sized>(
    backend: &B,
    config: &Config,
    session: &mut CaseSession,
    message: &str,
) -> Result<ChatMessage> {
    session.chat_history.push(ChatMessage::user(message, now_millis()));

    let request = GenerateRequest {
        documents: Vec::new(),
        prompt: build_chat_prompt(message, session.current_report()),
        system_instruction: None,
        options: GenerationOptions::assistant(config),
    };

    match backend.generate(request).await {
        Ok(response) => {
            let text = if response.text.trim().is_empty() {
                CHAT_FALLBACK.to_string()
            } else {
                response.text
            };
            let reply = ChatMessage {
                grounding_chunks: Some(response.grounding_chunks),
                ..ChatMessage::model(text, now_millis())
            };
            session.chat_history.push(reply.clone());
            Ok(reply)
        }
        Err(e) => {
            session.chat_history.push(ChatMessage::model(
                format!("Errore durante la consultazione: {}", e),
                now_millis(),
            ));
            Err(e)
        }
    }
}

/// 診察の書き起こしから構造化記録を作る（ブロックが無い・壊れている場合は None）
pub async fn process_scribe_session<B: AiBackend + ?Sized>(
    backend: &B,
    config: &Config,
    transcript: &str,
) -> Result<Option<ScribeOutput>> {
    let response = backend
        .generate(GenerateRequest {
            documents: Vec::new(),
            prompt: build_scribe_prompt(transcript),
            system_instruction: Some(SYSTEM_INSTRUCTION.to_string()),
            options: GenerationOptions {
                google_search: false,
                ..GenerationOptions::assistant(config)
            },
        })
        .await?;

    let scribe: Option<ScribeOutput> = extract_tag(&response.text, ResponseTag::Scribe)
        .and_then(|body| parse_json_block(body, ResponseTag::Scribe));
    debug!(found = scribe.is_some(), "スクライブ結果");
    Ok(scribe)
}
