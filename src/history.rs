//! 症例履歴ストア
//!
//! 症例（CaseRecord）のJSON配列を1ファイルに保存する。
//! - 新しい順に並べ、最大 MAX_RECORDS 件（超過分は古いものから黙って削除）
//! - 同じIDの保存は置き換え（重複しない）
//! - エクスポート／インポートは配列全体の入れ替え

use crate::error::{MediMindError, Result};
use medimind_common::CaseRecord;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MAX_RECORDS: usize = 100;

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    records: Vec<CaseRecord>,
}

impl HistoryStore {
    /// 履歴ファイルを読み込み
    ///
    /// ファイルが無い場合は空。壊れている場合も空として扱う。
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = Self::read_records(&path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "履歴ファイルを読み込めません。空の履歴で開始します");
            Vec::new()
        });
        Self { path, records }
    }

    fn read_records(path: &Path) -> Result<Vec<CaseRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// 同じディレクトリの一時ファイルに書き出してから置き換える
    ///
    /// 書き込み途中で失敗しても既存の履歴ファイルは壊れない。
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.temp_path();
        let written = File::create(&tmp_path).map_err(MediMindError::from).and_then(|file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &self.records)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "history.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 全症例（新しい順）
    pub fn load_all(&self) -> &[CaseRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CaseRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// 同一患者の症例（新しい順、最大 `limit` 件）
    pub fn find_by_patient(&self, patient_name: &str, limit: usize) -> Vec<&CaseRecord> {
        self.records
            .iter()
            .filter(|r| r.matches_patient(patient_name))
            .take(limit)
            .collect()
    }

    /// 保存（同じIDは置き換えて先頭へ）
    pub fn save_or_replace(&mut self, record: CaseRecord) -> Result<()> {
        self.records.retain(|r| r.id != record.id);
        info!(case_id = %record.id, patient = %record.patient_name, "症例を保存");
        self.records.insert(0, record);
        self.records.truncate(MAX_RECORDS);
        self.persist()
    }

    /// 削除（存在しなければ false）
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        if self.records.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// 履歴を全削除（ファイルも削除）
    pub fn clear(&mut self) -> Result<()> {
        self.records.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// 整形済みJSON配列としてエクスポート
    pub fn export_all(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.records)?)
    }

    /// バックアップを読み込んで履歴全体を置き換える
    ///
    /// 配列でない・形式が不正な場合はエラーで、既存の履歴は変更しない。
    pub fn import_all(&mut self, bytes: &[u8]) -> Result<usize> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| MediMindError::ImportValidation(format!("JSONではありません: {}", e)))?;

        if !value.is_array() {
            return Err(MediMindError::ImportValidation("配列ではありません".into()));
        }

        let records: Vec<CaseRecord> = serde_json::from_value(value)
            .map_err(|e| MediMindError::ImportValidation(format!("症例の形式が不正です: {}", e)))?;

        self.records = records;
        self.persist()?;
        Ok(self.records.len())
    }
}

/// エクスポートファイル名（MediMind_Backup_yyyy-mm-dd.json）
pub fn backup_file_name(date: chrono::NaiveDate) -> String {
    format!("MediMind_Backup_{}.json", date.format("%Y-%m-%d"))
}
