//! AI応答パーサー（タグブロック・デコーダ）
//!
//! モデルの生テキスト1つから以下を取り出す:
//! 1. ナラティブ: `[XXX_START]...[XXX_END]` をすべて除去した本文
//! 2. 構造化ブロック: 登録済みタグごとに最初の1組だけを抽出し、個別にJSON解析
//!
//! 解析に失敗したブロックはそのフィールドだけが `None` になる。
//! 他のフィールドやナラティブには影響しない（エラーは返さない）。

use crate::types::{
    AnalysisResult, DigitalTwinData, DrugInteraction, GroundingChunk, InstrumentalImage,
    LongitudinalPoint, PatientActionTask, ScreeningAlert, ScribeOutput, TherapeuticSuggestion,
    VitalParams,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::warn;

lazy_static! {
    // 任意のタグ名、非貪欲、改行をまたぐ、大文字小文字を区別しない。
    // ブロック直後の改行1つも一緒に除去する
    static ref TAGGED_BLOCK_RE: Regex =
        Regex::new(r"(?is)\[[A-Z_]+_START\].*?\[[A-Z_]+_END\]\r?\n?").unwrap();
    static ref RED_CODE_RE: Regex =
        Regex::new(r"(?m)^!!! RED CODE: (.*?) !!!\r?$").unwrap();
}

/// 応答中のタグ語彙
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseTag {
    PlainLanguage,
    Cdss,
    Drugs,
    Vitals,
    InstrumentalImages,
    Screening,
    Comparison,
    Scribe,
    PatientPlan,
    Fhir,
    Spatial,
}

impl ResponseTag {
    pub const ALL: [ResponseTag; 11] = [
        ResponseTag::PlainLanguage,
        ResponseTag::Cdss,
        ResponseTag::Drugs,
        ResponseTag::Vitals,
        ResponseTag::InstrumentalImages,
        ResponseTag::Screening,
        ResponseTag::Comparison,
        ResponseTag::Scribe,
        ResponseTag::PatientPlan,
        ResponseTag::Fhir,
        ResponseTag::Spatial,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResponseTag::PlainLanguage => "PLAIN_LANGUAGE",
            ResponseTag::Cdss => "CDSS_JSON",
            ResponseTag::Drugs => "DRUGS_JSON",
            ResponseTag::Vitals => "VITALS_JSON",
            ResponseTag::InstrumentalImages => "INSTRUMENTAL_IMAGES_JSON",
            ResponseTag::Screening => "SCREENING_JSON",
            ResponseTag::Comparison => "COMPARISON_JSON",
            ResponseTag::Scribe => "SCRIBE_JSON",
            ResponseTag::PatientPlan => "PATIENT_PLAN_JSON",
            ResponseTag::Fhir => "FHIR_JSON",
            ResponseTag::Spatial => "JSON_SPATIAL",
        }
    }

    pub fn start_marker(&self) -> String {
        format!("[{}_START]", self.name())
    }

    pub fn end_marker(&self) -> String {
        format!("[{}_END]", self.name())
    }

    /// PLAIN_LANGUAGE 以外はJSONブロック
    pub fn is_json(&self) -> bool {
        !matches!(self, ResponseTag::PlainLanguage)
    }

    /// 本文がJSON配列のタグ（それ以外のJSONタグはオブジェクト）
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ResponseTag::Cdss
                | ResponseTag::Drugs
                | ResponseTag::InstrumentalImages
                | ResponseTag::Screening
                | ResponseTag::Comparison
                | ResponseTag::PatientPlan
        )
    }

    /// 本文が空のときに使う値
    fn empty_body(&self) -> &'static str {
        if self.is_array() {
            "[]"
        } else {
            "{}"
        }
    }
}

impl std::fmt::Display for ResponseTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 構造化ブロックのデコード結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedBlocks {
    pub plain_language: Option<String>,
    pub cdss_suggestions: Option<Vec<TherapeuticSuggestion>>,
    pub drug_interactions: Option<Vec<DrugInteraction>>,
    pub vitals: Option<VitalParams>,
    pub instrumental_images: Option<Vec<InstrumentalImage>>,
    pub screening_alerts: Option<Vec<ScreeningAlert>>,
    pub longitudinal_comparison: Option<Vec<LongitudinalPoint>>,
    pub scribe: Option<ScribeOutput>,
    pub patient_action_plan: Option<Vec<PatientActionTask>>,
    pub fhir_data: Option<serde_json::Value>,
    pub digital_twin: Option<DigitalTwinData>,
}

/// すべてのタグブロックを除去してトリム
///
/// # Examples
/// ```
/// use medimind_common::strip_tagged_blocks;
///
/// let text = "Referto.\n[CDSS_JSON_START][][CDSS_JSON_END]\n";
/// assert_eq!(strip_tagged_blocks(text), "Referto.");
/// ```
pub fn strip_tagged_blocks(text: &str) -> String {
    TAGGED_BLOCK_RE.replace_all(text, "").trim().to_string()
}

/// 指定タグの最初のブロックの中身を取り出す
///
/// 開始マーカーの後に終了マーカーが無い場合は `None`（文字列末尾までとはみなさない）。
pub fn extract_tag<'a>(text: &'a str, tag: ResponseTag) -> Option<&'a str> {
    let start_marker = tag.start_marker();
    let end_marker = tag.end_marker();

    let start = find_ignore_ascii_case(text, &start_marker)? + start_marker.len();
    let end = start + find_ignore_ascii_case(&text[start..], &end_marker)?;

    Some(text[start..end].trim())
}

/// 前後のコードフェンス（```json ... ```）を外す
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        // 言語ヒント（json等）を読み飛ばす
        let hint_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        body = rest[hint_len..].trim_start();
    }

    if let Some(rest) = body.strip_suffix("```") {
        body = rest.trim_end();
    }

    body
}

/// ブロック本文をJSONとして解析
///
/// 空の本文はタグに応じた空の構造（配列タグは `[]`、それ以外は `{}`）として扱う。
/// 解析失敗はログに残して `None` を返す。
pub fn parse_json_block<T: DeserializeOwned>(body: &str, tag: ResponseTag) -> Option<T> {
    let cleaned = strip_code_fence(body);
    let cleaned = if cleaned.is_empty() { tag.empty_body() } else { cleaned };

    match serde_json::from_str(cleaned) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(tag = tag.name(), error = %e, "タグブロックのJSON解析に失敗");
            None
        }
    }
}

/// `!!! RED CODE: <理由> !!!` 行を探し、理由を返す
pub fn detect_red_code(text: &str) -> Option<String> {
    RED_CODE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 登録済みタグをすべて個別にデコード
pub fn decode_blocks(raw: &str) -> DecodedBlocks {
    DecodedBlocks {
        plain_language: extract_tag(raw, ResponseTag::PlainLanguage).map(str::to_string),
        cdss_suggestions: parse_tag(raw, ResponseTag::Cdss),
        drug_interactions: parse_tag(raw, ResponseTag::Drugs),
        vitals: parse_tag(raw, ResponseTag::Vitals),
        instrumental_images: parse_tag(raw, ResponseTag::InstrumentalImages),
        screening_alerts: parse_tag(raw, ResponseTag::Screening),
        longitudinal_comparison: parse_tag(raw, ResponseTag::Comparison),
        scribe: parse_tag(raw, ResponseTag::Scribe),
        patient_action_plan: parse_tag(raw, ResponseTag::PatientPlan),
        fhir_data: parse_tag(raw, ResponseTag::Fhir),
        digital_twin: parse_tag(raw, ResponseTag::Spatial),
    }
}

/// 生の応答テキストを AnalysisResult にデコード
///
/// レッドコード判定はタグ除去後のナラティブに対して行う
/// （タグブロック内のマーカーでは発報しない）。
pub fn decode_response(
    raw: &str,
    grounding_chunks: Vec<GroundingChunk>,
    timestamp: i64,
) -> AnalysisResult {
    let markdown = strip_tagged_blocks(raw);
    let red_code_reason = detect_red_code(&markdown);
    let blocks = decode_blocks(raw);

    AnalysisResult {
        is_red_code: red_code_reason.is_some(),
        red_code_reason,
        markdown,
        plain_language_markdown: blocks.plain_language,
        fhir_data: blocks.fhir_data,
        cdss_suggestions: blocks.cdss_suggestions,
        drug_interactions: blocks.drug_interactions,
        scribe: blocks.scribe,
        patient_action_plan: blocks.patient_action_plan,
        screening_alerts: blocks.screening_alerts,
        instrumental_images: blocks.instrumental_images,
        vitals: blocks.vitals,
        longitudinal_comparison: blocks.longitudinal_comparison,
        digital_twin: blocks.digital_twin,
        grounding_chunks: Some(grounding_chunks),
        raw_text: raw.to_string(),
        timestamp,
        ..Default::default()
    }
}

fn parse_tag<T: DeserializeOwned>(raw: &str, tag: ResponseTag) -> Option<T> {
    extract_tag(raw, tag).and_then(|body| parse_json_block(body, tag))
}

/// ASCIIの大文字小文字を無視した部分文字列検索（バイト位置を返す）
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || hay.len() < pat.len() {
        return None;
    }
    hay.windows(pat.len())
        .position(|window| window.eq_ignore_ascii_case(pat))
}
