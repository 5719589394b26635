//! 症例履歴ストアの結合テスト
//!
//! 永続化・上限・エクスポート／インポートを実ファイルで検証

use medimind_common::{AnalysisResult, CaseRecord, ChatMessage, Checkpoint};
use medimind_rust::error::MediMindError;
use medimind_rust::history::{HistoryStore, MAX_RECORDS};
use std::path::Path;
use tempfile::tempdir;

fn record(id: &str, patient: &str, markdown: &str) -> CaseRecord {
    CaseRecord {
        id: id.to_string(),
        timestamp: 1_700_000_000_000,
        result: AnalysisResult {
            markdown: markdown.to_string(),
            raw_text: markdown.to_string(),
            ..Default::default()
        },
        file_names: vec!["emocromo.pdf".to_string()],
        patient_name: patient.to_string(),
        chat_history: vec![ChatMessage::user("Domanda", 1_700_000_000_100)],
        checkpoints: vec![Checkpoint {
            id: format!("{}-cp1", id),
            timestamp: 1_700_000_000_000,
            markdown: markdown.to_string(),
            files_analysed: vec!["emocromo.pdf".to_string()],
            is_red_code: false,
        }],
        extended_history: None,
    }
}

fn open(dir: &Path) -> HistoryStore {
    HistoryStore::open(dir.join("history.json"))
}

/// 保存した症例は再読み込み後も同じ
#[test]
fn test_save_persists_across_reopen() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());
    store.save_or_replace(record("a", "Mario Rossi", "Referto A")).unwrap();
    store.save_or_replace(record("b", "Anna Bianchi", "Referto B")).unwrap();

    let reopened = open(dir.path());
    assert_eq!(reopened.load_all(), store.load_all());
    assert_eq!(reopened.load_all()[0].id, "b"); // 新しい順
}

/// 同じIDの保存は1件のみ（最新の内容）
#[test]
fn test_save_same_id_is_idempotent() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());
    store.save_or_replace(record("a", "Mario Rossi", "v1")).unwrap();
    store.save_or_replace(record("b", "Mario Rossi", "altro")).unwrap();
    store.save_or_replace(record("a", "Mario Rossi", "v2")).unwrap();

    let reopened = open(dir.path());
    let matching: Vec<_> = reopened.load_all().iter().filter(|r| r.id == "a").collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].result.markdown, "v2");
    assert_eq!(reopened.load_all()[0].id, "a");
    assert_eq!(reopened.len(), 2);
}

/// 101件目の保存で最も古い症例が削除される
#[test]
fn test_capacity_drops_oldest() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());
    for i in 0..=MAX_RECORDS {
        store
            .save_or_replace(record(&format!("case-{}", i), "P", "R"))
            .unwrap();
    }

    let reopened = open(dir.path());
    assert_eq!(reopened.len(), MAX_RECORDS);
    assert!(reopened.get("case-0").is_none());
    assert!(reopened.get("case-1").is_some());
    assert_eq!(reopened.load_all()[0].id, format!("case-{}", MAX_RECORDS));
}

/// エクスポート→インポートで同じ配列に戻る（マージではなく置き換え）
#[test]
fn test_export_import_round_trip_replaces() {
    let source_dir = tempdir().expect("Failed to create temp dir");
    let mut source = open(source_dir.path());
    source.save_or_replace(record("a", "Mario Rossi", "Referto A")).unwrap();
    source.save_or_replace(record("b", "Anna Bianchi", "Referto B")).unwrap();
    let exported = source.export_all().unwrap();

    let target_dir = tempdir().expect("Failed to create temp dir");
    let mut target = open(target_dir.path());
    target.save_or_replace(record("z", "Luca Verdi", "Da sostituire")).unwrap();

    let count = target.import_all(&exported).unwrap();
    assert_eq!(count, 2);
    assert_eq!(target.load_all(), source.load_all());
    assert!(target.get("z").is_none());

    // 永続化もされている
    assert_eq!(open(target_dir.path()).load_all(), source.load_all());
}

/// エクスポートは整形済みのJSON配列（camelCase）
#[test]
fn test_export_format() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());
    store.save_or_replace(record("a", "Mario Rossi", "Referto")).unwrap();

    let text = String::from_utf8(store.export_all().unwrap()).unwrap();
    assert!(text.starts_with("[\n  {"));
    assert!(text.contains("\"patientName\": \"Mario Rossi\""));
    assert!(text.contains("\"filesAnalysed\""));
}

/// 配列でないバックアップは拒否され、既存の履歴は変わらない
#[test]
fn test_import_non_array_rejected() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());
    store.save_or_replace(record("a", "Mario Rossi", "Referto")).unwrap();
    let before = store.load_all().to_vec();

    let bad_inputs: [&[u8]; 3] = [br#"{"id": "x"}"#, b"42", b"\"text\""];
    for bad in bad_inputs {
        let result = store.import_all(bad);
        assert!(matches!(result, Err(MediMindError::ImportValidation(_))));
    }

    assert_eq!(store.load_all(), before.as_slice());
    assert_eq!(open(dir.path()).load_all(), before.as_slice());
}

/// 要素の形式が不正なバックアップも拒否される（症例でない要素、result 欠落）
#[test]
fn test_import_malformed_records_rejected() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());

    for backup in [&br#"[5]"#[..], &br#"[{"id": "a", "timestamp": 1}]"#[..]] {
        let result = store.import_all(backup);
        assert!(matches!(result, Err(MediMindError::ImportValidation(_))));
        assert!(store.is_empty());
    }
}

/// ブラウザ版のバックアップ（null・文字列の数値を含む）もインポートできる
const BROWSER_BACKUP: &str = r##"[
  {
    "id": "k3j9x",
    "timestamp": 1700000000000,
    "result": {
      "markdown": "# Referto",
      "isRedCode": false,
      "redCodeReason": null,
      "rawText": "# Referto",
      "timestamp": 1700000000000,
      "vitals": {"bpm": "80", "pressure": "120/80", "temp": null},
      "cdssSuggestions": [{"path": "ACE-inibitore", "evidenceLevel": null, "rationale": "ipertensione"}]
    },
    "fileNames": ["esami.pdf"],
    "patientName": "Mario Rossi",
    "chatHistory": [{"role": "model", "text": "Risposta", "timestamp": 1700000000100, "groundingChunks": null}],
    "checkpoints": [],
    "extendedHistory": null
  }
]"##;

#[test]
fn test_import_browser_backup_with_nulls() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());

    store.import_all(BROWSER_BACKUP.as_bytes()).unwrap();
    assert_eq!(store.len(), 1);

    let case = store.get("k3j9x").unwrap();
    let vitals = case.result.vitals.as_ref().unwrap();
    assert_eq!(vitals.bpm, Some(80.0));
    assert_eq!(vitals.temp, None);
    assert_eq!(vitals.pressure.as_deref(), Some("120/80"));
    let cdss = case.result.cdss_suggestions.as_ref().unwrap();
    assert_eq!(cdss[0].evidence_level, "");
    assert!(case.chat_history[0].grounding_chunks.is_none());
}

/// 同じ内容の履歴ファイルは壊れたファイル扱いにならず、保存しても既存症例は残る
#[test]
fn test_open_file_with_nulls_keeps_cases() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("history.json"), BROWSER_BACKUP).unwrap();

    let mut store = open(dir.path());
    assert_eq!(store.len(), 1);

    store.save_or_replace(record("nuovo", "Anna Bianchi", "Referto")).unwrap();
    let reopened = open(dir.path());
    assert_eq!(reopened.len(), 2);
    assert!(reopened.get("k3j9x").is_some());
}

/// 壊れた履歴ファイルは空として開く
#[test]
fn test_corrupt_file_opens_empty() {
    let dir = tempdir().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("history.json"), "{{{ rotto").unwrap();

    let mut store = open(dir.path());
    assert!(store.is_empty());

    // 保存すれば正常なファイルに戻る
    store.save_or_replace(record("a", "Mario Rossi", "Referto")).unwrap();
    assert_eq!(open(dir.path()).len(), 1);
}

/// 全削除
#[test]
fn test_clear_removes_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());
    store.save_or_replace(record("a", "Mario Rossi", "Referto")).unwrap();

    store.clear().unwrap();
    assert!(store.is_empty());
    assert!(!dir.path().join("history.json").exists());
}

/// 保存は一時ファイル経由で置き換えられ、一時ファイルは残らない
#[test]
fn test_save_leaves_no_temp_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut store = open(dir.path());
    store.save_or_replace(record("a", "Mario Rossi", "Referto v1")).unwrap();
    store.save_or_replace(record("a", "Mario Rossi", "Referto v2")).unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, vec!["history.json"]);

    let reopened = open(dir.path());
    assert_eq!(reopened.get("a").unwrap().result.markdown, "Referto v2");
}
