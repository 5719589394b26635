//! チャンク分割解析
//!
//! 文書キューを `chunk_size` 件ずつAIに送り、チャンクごとにレポートを更新する。
//! 前のチャンクのレポートが次のプロンプトの文脈になるため、処理は逐次。
//! すべて成功した場合のみ症例を履歴に保存する。

mod backend;
mod encode;
pub mod gemini;
pub mod services;
mod session;

pub use backend::{
    AiBackend, EncodedDocument, GenerateRequest, GenerateResponse, GenerationOptions,
};
pub use encode::{encode_chunk, encode_document};
pub use gemini::GeminiClient;
pub use session::CaseSession;

use crate::error::{MediMindError, Result};
use crate::history::HistoryStore;
use crate::scanner::Document;
use medimind_common::prompts::{MAX_HISTORY_RECORDS, SYSTEM_INSTRUCTION};
use medimind_common::{
    build_history_context, build_report_prompt, decode_response, AnalysisResult, Checkpoint,
    HistoricalReport,
};
use tracing::{debug, info};

/// 1回のAI呼び出しで送る文書数
pub const CHUNK_SIZE: usize = 15;

/// 症例に保存するチェックポイントの上限
pub const MAX_CHECKPOINTS: usize = 30;

/// 経時比較コンテキストを送るタイミング
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryContextPolicy {
    /// レポートがまだ空のとき（通常は最初のチャンク）のみ
    #[default]
    FirstChunkOnly,
    /// すべてのチャンクで送る
    EveryChunk,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub documents: Vec<Document>,
    /// 統合対象の既存レポート（追加解析時）
    pub prior_context: Option<String>,
    pub chunk_size: usize,
    pub history_policy: HistoryContextPolicy,
    pub options: GenerationOptions,
}

impl AnalysisRequest {
    pub fn new(documents: Vec<Document>, options: GenerationOptions) -> Self {
        Self {
            documents,
            prior_context: None,
            chunk_size: CHUNK_SIZE,
            history_policy: HistoryContextPolicy::default(),
            options,
        }
    }
}

/// 進捗イベント（index は 0 始まり）
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisProgress {
    ChunkStarted {
        index: usize,
        total: usize,
        files: Vec<String>,
    },
    ChunkCompleted {
        index: usize,
        total: usize,
        checkpoint: Checkpoint,
    },
}

/// 現在時刻（UNIXエポックミリ秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// ミリ秒タイムスタンプを dd/mm/yyyy に整形
pub fn format_date(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp)
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

/// 同一患者の過去症例から経時比較コンテキストを作る
pub fn patient_history_context(store: &HistoryStore, patient_name: &str) -> Option<String> {
    let reports: Vec<HistoricalReport> = store
        .find_by_patient(patient_name, MAX_HISTORY_RECORDS)
        .into_iter()
        .map(|r| HistoricalReport {
            date: format_date(r.timestamp),
            markdown: r.result.markdown.clone(),
        })
        .collect();

    build_history_context(&reports)
}

/// チャンク分割解析を実行
///
/// # Arguments
/// * `backend` - AIバックエンド
/// * `store` - 履歴ストア（経時比較の参照と、成功時の保存先）
/// * `session` - 作業中の症例。チェックポイントはチャンクごとに追加される
/// * `request` - 文書キューと解析条件
/// * `on_progress` - 進捗通知
///
/// チャンク k で失敗した場合、それ以前のチェックポイントはセッションに残るが、
/// 結果の更新と履歴への保存は行わない。
pub async fn run_analysis<B, F>(
    backend: &B,
    store: &mut HistoryStore,
    session: &mut CaseSession,
    request: AnalysisRequest,
    mut on_progress: F,
) -> Result<AnalysisResult>
where
    B: AiBackend + ?Sized,
    F: FnMut(AnalysisProgress),
{
    if request.documents.is_empty() {
        return Err(MediMindError::NoDocuments);
    }
    if request.chunk_size == 0 {
        return Err(MediMindError::Config("chunk_size は1以上を指定してください".into()));
    }
    if session.patient_name.trim().is_empty() {
        return Err(MediMindError::MissingPatientName);
    }

    let chunks: Vec<&[Document]> = request.documents.chunks(request.chunk_size).collect();
    let total = chunks.len();

    let mut running_report = request
        .prior_context
        .filter(|c| !c.trim().is_empty());
    let history_context = patient_history_context(store, &session.patient_name);
    let mut all_names = session.file_names.clone();
    let mut last_result: Option<AnalysisResult> = None;
    let mut last_timestamp = i64::MIN;

    info!(
        patient = %session.patient_name,
        documents = request.documents.len(),
        chunks = total,
        "解析開始"
    );

    for (index, chunk) in chunks.into_iter().enumerate() {
        let files: Vec<String> = chunk.iter().map(|d| d.file_name.clone()).collect();
        on_progress(AnalysisProgress::ChunkStarted {
            index,
            total,
            files: files.clone(),
        });

        let include_history = match request.history_policy {
            HistoryContextPolicy::EveryChunk => true,
            HistoryContextPolicy::FirstChunkOnly => running_report.is_none(),
        };
        let names: Vec<&str> = files.iter().map(String::as_str).collect();
        let prompt = build_report_prompt(
            &names,
            running_report.as_deref(),
            history_context.as_deref().filter(|_| include_history),
        );

        debug!(chunk = index + 1, total, files = files.len(), include_history, "チャンク送信");

        let chunk_failed = |e: MediMindError| MediMindError::ChunkFailed {
            chunk: index + 1,
            total,
            source: Box::new(e),
        };
        let documents = encode::encode_chunk_blocking(chunk)
            .await
            .map_err(chunk_failed)?;
        let response = backend
            .generate(GenerateRequest {
                documents,
                prompt,
                system_instruction: Some(SYSTEM_INSTRUCTION.to_string()),
                options: request.options.clone(),
            })
            .await
            .map_err(chunk_failed)?;

        // チェックポイントの時刻は単調増加
        let timestamp = now_millis().max(last_timestamp);
        last_timestamp = timestamp;

        let result = decode_response(&response.text, response.grounding_chunks, timestamp);
        running_report = Some(result.markdown.clone()).filter(|m| !m.trim().is_empty());

        for name in &files {
            if !all_names.contains(name) {
                all_names.push(name.clone());
            }
        }

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            markdown: result.markdown.clone(),
            files_analysed: files,
            is_red_code: result.is_red_code,
        };
        session.checkpoints.push(checkpoint.clone());
        on_progress(AnalysisProgress::ChunkCompleted {
            index,
            total,
            checkpoint,
        });

        last_result = Some(result);
    }

    let Some(result) = last_result else {
        return Err(MediMindError::NoDocuments);
    };

    session.result = Some(result.clone());
    session.file_names = all_names;
    session.save(store)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medimind_common::CaseRecord;
    use std::fs::File;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct EchoBackend {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AiBackend for EchoBackend {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.prompt);
            Ok(GenerateResponse {
                text: format!("Referto {}", prompts.len()),
                grounding_chunks: vec![],
            })
        }
    }

    fn options() -> GenerationOptions {
        GenerationOptions::report(&crate::config::Config::default())
    }

    fn documents(dir: &std::path::Path, count: usize) -> Vec<Document> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("doc{:02}.pdf", i));
                File::create(&path).unwrap();
                Document::from_path(&path).unwrap().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_format_date() {
        // 2024-03-05T12:00:00Z
        assert_eq!(format_date(1_709_640_000_000), "05/03/2024");
    }

    #[test]
    fn test_patient_history_context() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path().join("history.json"));
        let mut record = CaseRecord {
            id: "old".into(),
            timestamp: 1_709_640_000_000,
            patient_name: "Mario Rossi".into(),
            ..Default::default()
        };
        record.result.markdown = "Anemia lieve".into();
        store.save_or_replace(record).unwrap();

        let context = patient_history_context(&store, " MARIO ROSSI ").unwrap();
        assert_eq!(context, "[Data: 05/03/2024] Referto: Anemia lieve");
        assert!(patient_history_context(&store, "Anna Bianchi").is_none());
    }

    #[tokio::test]
    async fn test_rejects_zero_chunk_size() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path().join("history.json"));
        let mut session = CaseSession::new("Mario Rossi");
        let backend = EchoBackend { prompts: Mutex::new(vec![]) };
        let mut request = AnalysisRequest::new(documents(dir.path(), 1), options());
        request.chunk_size = 0;

        let result = run_analysis(&backend, &mut store, &mut session, request, |_| {}).await;
        assert!(matches!(result, Err(MediMindError::Config(_))));
    }

    #[tokio::test]
    async fn test_running_report_feeds_next_chunk() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path().join("history.json"));
        let mut session = CaseSession::new("Mario Rossi");
        let backend = EchoBackend { prompts: Mutex::new(vec![]) };
        let mut request = AnalysisRequest::new(documents(dir.path(), 4), options());
        request.chunk_size = 2;

        let result = run_analysis(&backend, &mut store, &mut session, request, |_| {})
            .await
            .unwrap();

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("INTEGRAZIONE CON CONTESTO PRECEDENTE"));
        assert!(prompts[1].contains("INTEGRAZIONE CON CONTESTO PRECEDENTE"));
        assert!(prompts[1].contains("Referto 1"));
        assert_eq!(result.markdown, "Referto 2");
        assert!(session.checkpoints[0].timestamp <= session.checkpoints[1].timestamp);
    }
}
