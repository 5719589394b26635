//! プロンプト生成モジュール
//!
//! CLIと各バックエンドで共有されるプロンプト生成ロジック:
//! - SYSTEM_INSTRUCTION: 全解析共通のシステム指示
//! - build_report_prompt: チャンク解析用プロンプト（前回レポート統合／経時比較）
//! - build_history_context: 同一患者の過去症例から経時比較コンテキストを作る
//! - 補助機能（ディープリサーチ、要約、チャット、シミュレーション、Scribe）用プロンプト
//!
//! 出力言語はイタリア語（製品要件）。

use crate::parser::ResponseTag;

/// 前回レポートのうちプロンプトに含める末尾文字数
pub const PRIOR_CONTEXT_TAIL_CHARS: usize = 10_000;
/// 過去症例1件あたりの抜粋文字数
pub const HISTORY_EXCERPT_CHARS: usize = 800;
/// 経時比較に使う過去症例の最大件数
pub const MAX_HISTORY_RECORDS: usize = 5;
pub const RESEARCH_CONTEXT_CHARS: usize = 15_000;
pub const SUMMARY_CONTEXT_CHARS: usize = 20_000;
pub const CHAT_CONTEXT_CHARS: usize = 20_000;
pub const SIMULATION_CONTEXT_CHARS: usize = 10_000;

pub const SYSTEM_INSTRUCTION: &str = r#"Sei un sistema esperto di intelligenza diagnostica medica, specializzato in medicina traslazionale, patologia clinica e sintesi delle evidenze.

LINGUA: ITALIANO, con terminologia medica formale.

REGOLE DI OUTPUT:
1. Ogni affermazione deve essere ancorata ai dati estratti dai documenti forniti.
2. Il testo narrativo non deve mai contenere i tag tecnici [NOME_START]/[NOME_END]: i blocchi strutturati vanno solo in coda alla risposta.
3. In presenza di un rischio clinico immediato, inserisci su una riga isolata: !!! RED CODE: <motivo> !!!
4. Genera sempre un blocco [PLAIN_LANGUAGE_START]...[PLAIN_LANGUAGE_END] con spiegazioni semplici per il paziente.
5. I blocchi *_JSON devono contenere JSON valido, senza commenti."#;

/// 期待する構造化ブロックとその中身の説明
const REPORT_BLOCKS: &[(ResponseTag, &str)] = &[
    (ResponseTag::PlainLanguage, "Testo Markdown per il paziente"),
    (ResponseTag::Cdss, "Array JSON di TherapeuticSuggestion {path, evidenceLevel, rationale, contraindications}"),
    (ResponseTag::Drugs, "Array JSON di DrugInteraction {drugA, drugB, severity, description}"),
    (ResponseTag::Vitals, "Oggetto JSON VitalParams {bpm, pressure, temp, oxygen, respiratoryRate}"),
    (ResponseTag::InstrumentalImages, "Array JSON di InstrumentalImage {id, category, title, description, findings, clinicalSignificance}"),
    (ResponseTag::Screening, "Array JSON di ScreeningAlert {title, dueDate, reason, urgency}"),
    (ResponseTag::Comparison, "Array JSON di LongitudinalPoint {date, parameter, value, previousValue, delta, status, note}"),
];

/// 過去症例の抜粋（日付は呼び出し側で整形済み）
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalReport {
    pub date: String,
    pub markdown: String,
}

/// 先頭から最大 `max` 文字（文字境界を保つ）
pub fn head_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 末尾から最大 `max` 文字（文字境界を保つ）
pub fn tail_chars(text: &str, max: usize) -> &str {
    if max == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// 経時比較用コンテキスト生成
///
/// 先頭 `MAX_HISTORY_RECORDS` 件のみを使い、各レポートは
/// `HISTORY_EXCERPT_CHARS` 文字で切り詰める。空なら `None`。
pub fn build_history_context(records: &[HistoricalReport]) -> Option<String> {
    if records.is_empty() {
        return None;
    }

    let context = records
        .iter()
        .take(MAX_HISTORY_RECORDS)
        .map(|r| {
            format!(
                "[Data: {}] Referto: {}",
                r.date,
                head_chars(&r.markdown, HISTORY_EXCERPT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    Some(context)
}

fn report_instructions() -> String {
    let blocks = REPORT_BLOCKS
        .iter()
        .map(|(tag, desc)| format!("{} ({}) {}", tag.start_marker(), desc, tag.end_marker()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Redigi un REFERTO MEDICO INTEGRALE in ITALIANO: un dossier clinico completo e definitivo.

Includi obbligatoriamente i seguenti blocchi strutturati, rigorosamente in coda al testo:
{blocks}"#
    )
}

/// チャンク解析用プロンプト生成
///
/// # Arguments
/// * `file_names` - このチャンクのファイル名
/// * `prior_report` - 現在までのレポート（空でなければ「統合」モード）
/// * `history_context` - 経時比較コンテキスト（含めるかどうかは呼び出し側が決める）
pub fn build_report_prompt(
    file_names: &[&str],
    prior_report: Option<&str>,
    history_context: Option<&str>,
) -> String {
    let names = file_names.join(", ");
    let prior = prior_report.map(str::trim).filter(|r| !r.is_empty());

    let mut prompt = match prior {
        Some(report) => format!(
            "{}\n\nINTEGRAZIONE CON CONTESTO PRECEDENTE:\n{}\n\nNUOVI DATI: {}.\nAggiorna e integra il referto esistente con i nuovi documenti.",
            report_instructions(),
            tail_chars(report, PRIOR_CONTEXT_TAIL_CHARS),
            names
        ),
        None => format!(
            "{}\n\nDocumenti: {}.\nGenera il referto integrale.",
            report_instructions(),
            names
        ),
    };

    if let Some(history) = history_context.filter(|h| !h.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n\nANALISI COMPARATIVA LONGITUDINALE RICHIESTA:\nConfronta i nuovi dati con la seguente storia clinica precedente e popola {}:\n{}",
            ResponseTag::Comparison.start_marker(),
            history
        ));
    }

    prompt
}

pub fn build_research_prompt(report: &str) -> String {
    format!(
        r#"DEEP RESEARCH & CLINICAL EXCELLENCE - ITALIANO.
Sulla base del referto, esegui una ricerca avanzata EBM su:
1. Letteratura scientifica recente su trattamenti e diagnostica specifici del caso.
2. Protocolli innovativi e trial clinici.
3. Centri di eccellenza suggeriti.

CONTESTO:
{}"#,
        head_chars(report, RESEARCH_CONTEXT_CHARS)
    )
}

pub fn build_summary_prompt(report: &str) -> String {
    format!(
        "Executive Summary in Italiano del report: {}",
        head_chars(report, SUMMARY_CONTEXT_CHARS)
    )
}

pub fn build_simulation_prompt(intervention: &str, report: &str) -> String {
    format!(
        r#"Simulazione: {}.
Rispondi SOLO con un oggetto JSON {{"treatmentName", "efficacyRate", "sideEffectRisk", "confidenceRate", "predictedOutcome"}} (percentuali 0-100).
Contesto: {}"#,
        intervention,
        head_chars(report, SIMULATION_CONTEXT_CHARS)
    )
}

/// チャット用プロンプト（レポートは末尾 CHAT_CONTEXT_CHARS 文字）
pub fn build_chat_prompt(message: &str, report: Option<&str>) -> String {
    match report.map(str::trim).filter(|r| !r.is_empty()) {
        Some(report) => format!(
            "CONTESTO CLINICO:\n{}\n\nDOMANDA: {}",
            tail_chars(report, CHAT_CONTEXT_CHARS),
            message
        ),
        None => message.to_string(),
    }
}

pub fn build_scribe_prompt(transcript: &str) -> String {
    format!(
        "Scribe AI transcript: {}\n\nRestituisci {} {{\"anamnesis\", \"symptoms\", \"plan\"}} {}.",
        transcript,
        ResponseTag::Scribe.start_marker(),
        ResponseTag::Scribe.end_marker()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_and_tail_chars_multibyte() {
        let text = "àèìòù";
        assert_eq!(head_chars(text, 2), "àè");
        assert_eq!(tail_chars(text, 2), "òù");
        assert_eq!(head_chars(text, 10), text);
        assert_eq!(tail_chars(text, 10), text);
        assert_eq!(tail_chars(text, 0), "");
    }

    #[test]
    fn test_report_prompt_fresh_case() {
        let prompt = build_report_prompt(&["a.pdf", "b.jpg"], None, None);
        assert!(prompt.contains("Documenti: a.pdf, b.jpg."));
        assert!(prompt.contains("[CDSS_JSON_START]"));
        assert!(prompt.contains("[COMPARISON_JSON_END]"));
        assert!(!prompt.contains("INTEGRAZIONE"));
        assert!(!prompt.contains("LONGITUDINALE"));
    }

    #[test]
    fn test_report_prompt_integrates_prior_report_tail() {
        let prior = format!("{}FINE", "x".repeat(PRIOR_CONTEXT_TAIL_CHARS + 50));
        let prompt = build_report_prompt(&["c.pdf"], Some(&prior), None);

        assert!(prompt.contains("INTEGRAZIONE CON CONTESTO PRECEDENTE"));
        assert!(prompt.contains("NUOVI DATI: c.pdf."));
        assert!(prompt.contains("FINE"));
        // 末尾のみ含まれる
        assert!(!prompt.contains(&"x".repeat(PRIOR_CONTEXT_TAIL_CHARS)));
    }

    #[test]
    fn test_report_prompt_blank_prior_is_fresh() {
        let prompt = build_report_prompt(&["c.pdf"], Some("   "), None);
        assert!(prompt.contains("Documenti: c.pdf."));
    }

    #[test]
    fn test_report_prompt_with_history() {
        let prompt = build_report_prompt(&["c.pdf"], None, Some("[Data: 01/02/2025] Referto: PCR 3"));
        assert!(prompt.contains("ANALISI COMPARATIVA LONGITUDINALE RICHIESTA"));
        assert!(prompt.contains("PCR 3"));
    }

    #[test]
    fn test_history_context_limits() {
        let records: Vec<HistoricalReport> = (0..7)
            .map(|i| HistoricalReport {
                date: format!("0{}/01/2025", i + 1),
                markdown: format!("R{}{}", i, "y".repeat(1000)),
            })
            .collect();

        let context = build_history_context(&records).unwrap();
        assert_eq!(context.matches("[Data:").count(), MAX_HISTORY_RECORDS);
        assert!(context.starts_with("[Data: 01/01/2025] Referto: R0"));
        assert!(!context.contains("R5"));
        assert!(!context.contains(&"y".repeat(HISTORY_EXCERPT_CHARS)));
    }

    #[test]
    fn test_history_context_empty() {
        assert!(build_history_context(&[]).is_none());
    }

    #[test]
    fn test_chat_prompt_without_context() {
        assert_eq!(build_chat_prompt("Domanda?", None), "Domanda?");
        let prompt = build_chat_prompt("Domanda?", Some("Referto"));
        assert!(prompt.starts_with("CONTESTO CLINICO:\nReferto"));
        assert!(prompt.ends_with("DOMANDA: Domanda?"));
    }

    #[test]
    fn test_scribe_prompt_requests_block() {
        let prompt = build_scribe_prompt("Paziente riferisce tosse");
        assert!(prompt.contains("[SCRIBE_JSON_START]"));
        assert!(prompt.contains("tosse"));
    }
}
