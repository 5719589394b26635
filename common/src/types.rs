//! 解析結果の型定義
//!
//! CLIと各バックエンドで共有される型:
//! - AnalysisResult: AI応答1回分のデコード結果（ナラティブ＋構造化ブロック）
//! - Checkpoint: チャンク1回分の処理後スナップショット
//! - CaseRecord: 履歴に保存される症例単位のデータ
//!
//! 保存形式は camelCase のJSON。構造化ブロックの各型は
//! モデルがメンバーを省略しても読めるよう `default` 付きでデシリアライズする。
//! `null` や型の揺れ（数値の文字列など）は `lenient` で既定値に倒す。

use crate::lenient;
use serde::{Deserialize, Serialize};

/// 引用元（Google検索グラウンディング）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<GroundingWeb>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingWeb {
    #[serde(deserialize_with = "lenient::string")]
    pub uri: String,
    #[serde(deserialize_with = "lenient::string")]
    pub title: String,
}

/// 経時比較の1項目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LongitudinalPoint {
    #[serde(deserialize_with = "lenient::string")]
    pub date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub parameter: String,
    #[serde(deserialize_with = "lenient::string")]
    pub value: String,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,           // stable / improved / worsened / new
    #[serde(deserialize_with = "lenient::string")]
    pub note: String,
}

/// 画像検査（インストゥルメンタル）所見
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentalImage {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub category: String,
    #[serde(deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(deserialize_with = "lenient::string")]
    pub findings: String,
    #[serde(deserialize_with = "lenient::string")]
    pub clinical_significance: String,
}

/// バイタル
///
/// 数値は `"80"` のような文字列でも受け付ける。血圧は `"120/80"` 形式の文字列。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VitalParams {
    #[serde(deserialize_with = "lenient::opt_number", skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub pressure: Option<String>,
    #[serde(deserialize_with = "lenient::opt_number", skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_number", skip_serializing_if = "Option::is_none")]
    pub oxygen: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_number", skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpatialMarker {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::number")]
    pub x: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub y: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub z: f64,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,           // normal / pathological / warning
    #[serde(deserialize_with = "lenient::string")]
    pub notes: String,
    #[serde(deserialize_with = "lenient::string")]
    pub organ_system: String,
}

/// What-if シミュレーション結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationResult {
    #[serde(deserialize_with = "lenient::string")]
    pub treatment_name: String,
    #[serde(deserialize_with = "lenient::number")]
    pub efficacy_rate: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub side_effect_risk: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub confidence_rate: f64,
    #[serde(deserialize_with = "lenient::string")]
    pub predicted_outcome: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialPoint {
    #[serde(deserialize_with = "lenient::number")]
    pub x: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub y: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub z: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictionModel {
    #[serde(deserialize_with = "lenient::string")]
    pub growth_rate: String,
    #[serde(deserialize_with = "lenient::string_vec")]
    pub affected_regions: Vec<String>,
}

/// 3Dデジタルツイン用の空間データ（JSON_SPATIAL）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DigitalTwinData {
    #[serde(deserialize_with = "lenient::vec")]
    pub markers: Vec<SpatialMarker>,
    #[serde(deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub surgical_path: Option<Vec<SpatialPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_model: Option<PredictionModel>,
    #[serde(deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub simulations: Option<Vec<SimulationResult>>,
}

/// CDSS 治療提案
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TherapeuticSuggestion {
    #[serde(deserialize_with = "lenient::string")]
    pub path: String,
    #[serde(deserialize_with = "lenient::string")]
    pub evidence_level: String,   // A / B / C / D
    #[serde(deserialize_with = "lenient::string")]
    pub rationale: String,
    #[serde(deserialize_with = "lenient::string_vec")]
    pub contraindications: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProactiveCareStep {
    #[serde(deserialize_with = "lenient::string")]
    pub phase: String,
    #[serde(deserialize_with = "lenient::string")]
    pub action: String,
    #[serde(deserialize_with = "lenient::string")]
    pub timeline: String,
    #[serde(deserialize_with = "lenient::string")]
    pub priority: String,         // high / medium / low
    #[serde(deserialize_with = "lenient::string")]
    pub triggered_by: String,
}

/// 薬物相互作用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DrugInteraction {
    #[serde(deserialize_with = "lenient::string")]
    pub drug_a: String,
    #[serde(deserialize_with = "lenient::string")]
    pub drug_b: String,
    #[serde(deserialize_with = "lenient::string")]
    pub severity: String,         // high / moderate / low
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientActionTask {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub task: String,
    #[serde(deserialize_with = "lenient::string")]
    pub deadline: String,
    #[serde(deserialize_with = "lenient::boolean")]
    pub completed: bool,
    #[serde(rename = "type", deserialize_with = "lenient::string")]
    pub task_type: String,        // medication / booking / lifestyle
}

/// スクリーニングアラート
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreeningAlert {
    #[serde(deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(deserialize_with = "lenient::string")]
    pub due_date: String,
    #[serde(deserialize_with = "lenient::string")]
    pub reason: String,
    #[serde(deserialize_with = "lenient::string")]
    pub urgency: String,          // routine / urgent
}

/// 診察記録（Scribe）の構造化出力
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScribeOutput {
    #[serde(deserialize_with = "lenient::string")]
    pub anamnesis: String,
    #[serde(deserialize_with = "lenient::string")]
    pub symptoms: String,
    #[serde(deserialize_with = "lenient::string")]
    pub plan: String,
}

/// AI解析結果（応答1回分のデコード結果）
///
/// 構造化フィールドはすべて独立した Option。
/// `None` は「モデルがそのブロックを出力しなかった（または壊れていた）」を意味する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// タグブロックを除去したレポート本文
    #[serde(default, deserialize_with = "lenient::string")]
    pub markdown: String,

    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub plain_language_markdown: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub deep_research_markdown: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_data: Option<serde_json::Value>,

    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub cdss_suggestions: Option<Vec<TherapeuticSuggestion>>,

    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub care_plan: Option<Vec<ProactiveCareStep>>,

    #[serde(default, deserialize_with = "lenient::boolean")]
    pub is_red_code: bool,

    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub red_code_reason: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub grounding_chunks: Option<Vec<GroundingChunk>>,

    /// モデルの生テキスト
    #[serde(default, deserialize_with = "lenient::string")]
    pub raw_text: String,

    /// 作成時刻（UNIXエポックミリ秒）
    #[serde(default, deserialize_with = "lenient::integer")]
    pub timestamp: i64,

    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_twin: Option<DigitalTwinData>,

    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub drug_interactions: Option<Vec<DrugInteraction>>,

    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub patient_action_plan: Option<Vec<PatientActionTask>>,

    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub screening_alerts: Option<Vec<ScreeningAlert>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scribe: Option<ScribeOutput>,

    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub instrumental_images: Option<Vec<InstrumentalImage>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<VitalParams>,

    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub longitudinal_comparison: Option<Vec<LongitudinalPoint>>,
}

/// チャンク処理後のスナップショット（不変）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub markdown: String,
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub files_analysed: Vec<String>,
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub is_red_code: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// チャット1メッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default, deserialize_with = "lenient::string")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "lenient::opt_vec", skip_serializing_if = "Option::is_none")]
    pub grounding_chunks: Option<Vec<GroundingChunk>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            timestamp,
            grounding_chunks: None,
        }
    }

    pub fn model(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
            timestamp,
            grounding_chunks: None,
        }
    }
}

/// 履歴に保存される症例
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub timestamp: i64,
    pub result: AnalysisResult,
    /// 解析済みファイル名（重複なし、追加のみ）
    #[serde(default, deserialize_with = "lenient::string_vec")]
    pub file_names: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub patient_name: String,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default, deserialize_with = "lenient::vec")]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub extended_history: Option<String>,
}

impl CaseRecord {
    /// 患者名の一致判定（前後空白を除き大文字小文字を区別しない）
    pub fn matches_patient(&self, patient_name: &str) -> bool {
        self.patient_name.trim().to_lowercase() == patient_name.trim().to_lowercase()
    }
}
