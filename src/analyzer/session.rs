//! 作業中の症例（セッション）
//!
//! 解析結果・チェックポイント・チャット・長期要約を持ち、
//! 結果がある場合のみ履歴へ保存できる。

use super::{now_millis, MAX_CHECKPOINTS};
use crate::error::Result;
use crate::history::HistoryStore;
use medimind_common::{AnalysisResult, CaseRecord, ChatMessage, Checkpoint};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseSession {
    /// 保存済みならそのID
    pub case_id: Option<String>,
    pub patient_name: String,
    pub result: Option<AnalysisResult>,
    pub file_names: Vec<String>,
    pub checkpoints: Vec<Checkpoint>,
    pub chat_history: Vec<ChatMessage>,
    pub extended_history: Option<String>,
}

impl CaseSession {
    pub fn new(patient_name: impl Into<String>) -> Self {
        Self {
            patient_name: patient_name.into(),
            ..Default::default()
        }
    }

    /// 保存済み症例を開く
    pub fn from_record(record: &CaseRecord) -> Self {
        Self {
            case_id: Some(record.id.clone()),
            patient_name: record.patient_name.clone(),
            result: Some(record.result.clone()),
            file_names: record.file_names.clone(),
            checkpoints: record.checkpoints.clone(),
            chat_history: record.chat_history.clone(),
            extended_history: record.extended_history.clone(),
        }
    }

    /// 現在のレポート本文（空なら None）
    pub fn current_report(&self) -> Option<&str> {
        self.result
            .as_ref()
            .map(|r| r.markdown.as_str())
            .filter(|m| !m.trim().is_empty())
    }

    /// 保存用レコードに変換（結果が無ければ None）
    ///
    /// チェックポイントは新しい方から MAX_CHECKPOINTS 件のみ残す。
    pub fn to_record(&self, id: &str, timestamp: i64) -> Option<CaseRecord> {
        let result = self.result.clone()?;
        let skip = self.checkpoints.len().saturating_sub(MAX_CHECKPOINTS);

        Some(CaseRecord {
            id: id.to_string(),
            timestamp,
            result,
            file_names: self.file_names.clone(),
            patient_name: self.patient_name.clone(),
            chat_history: self.chat_history.clone(),
            checkpoints: self.checkpoints[skip..].to_vec(),
            extended_history: self.extended_history.clone(),
        })
    }

    /// 履歴へ保存（未保存なら新しいIDを採番）。結果が無ければ何もしない
    pub fn save(&mut self, store: &mut HistoryStore) -> Result<Option<String>> {
        let id = self
            .case_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let Some(record) = self.to_record(&id, now_millis()) else {
            return Ok(None);
        };

        store.save_or_replace(record)?;
        self.case_id = Some(id.clone());
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn checkpoint(i: usize) -> Checkpoint {
        Checkpoint {
            id: format!("cp{}", i),
            timestamp: i as i64,
            ..Default::default()
        }
    }

    #[test]
    fn test_save_without_result_is_noop() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path().join("history.json"));
        let mut session = CaseSession::new("Mario Rossi");

        assert_eq!(session.save(&mut store).unwrap(), None);
        assert!(store.is_empty());
        assert!(session.case_id.is_none());
    }

    #[test]
    fn test_save_assigns_and_reuses_id() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::open(dir.path().join("history.json"));
        let mut session = CaseSession::new("Mario Rossi");
        session.result = Some(AnalysisResult {
            markdown: "Referto".into(),
            ..Default::default()
        });

        let first = session.save(&mut store).unwrap().unwrap();
        let second = session.save(&mut store).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_record_keeps_latest_checkpoints() {
        let mut session = CaseSession::new("X");
        session.result = Some(AnalysisResult::default());
        session.checkpoints = (0..35).map(checkpoint).collect();

        let record = session.to_record("id", 0).unwrap();
        assert_eq!(record.checkpoints.len(), MAX_CHECKPOINTS);
        assert_eq!(record.checkpoints[0].id, "cp5");
        assert_eq!(record.checkpoints.last().unwrap().id, "cp34");
    }

    #[test]
    fn test_from_record_round_trip() {
        let record = CaseRecord {
            id: "case-1".into(),
            patient_name: "Anna Bianchi".into(),
            file_names: vec!["a.pdf".into()],
            extended_history: Some("Sintesi".into()),
            ..Default::default()
        };
        let session = CaseSession::from_record(&record);
        assert_eq!(session.case_id.as_deref(), Some("case-1"));
        assert_eq!(session.to_record("case-1", 0).unwrap(), record);
    }

    #[test]
    fn test_current_report_ignores_blank() {
        let mut session = CaseSession::new("X");
        assert!(session.current_report().is_none());
        session.result = Some(AnalysisResult {
            markdown: "  \n".into(),
            ..Default::default()
        });
        assert!(session.current_report().is_none());
    }
}
