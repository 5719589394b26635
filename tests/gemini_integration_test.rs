//! Gemini API の実呼び出しテスト（GEMINI_API_KEY が無ければスキップ）

use medimind_common::decode_response;
use medimind_rust::analyzer::{AiBackend, GeminiClient, GenerateRequest, GenerationOptions};
use medimind_rust::config::Config;
use std::time::Duration;

#[tokio::test]
async fn gemini_tagged_block_integration() {
    let api_key = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            eprintln!("GEMINI_API_KEY not set; skipping integration test");
            return;
        }
    };

    let prompt = r#"Rispondi esattamente con questo testo, senza aggiungere altro:
Referto di prova.
[PLAIN_LANGUAGE_START]Tutto bene.[PLAIN_LANGUAGE_END]
[VITALS_JSON_START]{"bpm": 70}[VITALS_JSON_END]"#;

    let config = Config::default();
    let client = GeminiClient::new(api_key, Duration::from_secs(120)).expect("client");
    let response = client
        .generate(GenerateRequest {
            documents: vec![],
            prompt: prompt.to_string(),
            system_instruction: None,
            options: GenerationOptions {
                model: config.summary_model.clone(),
                temperature: 0.0,
                max_output_tokens: Some(512),
                thinking_budget: None,
                google_search: false,
                response_mime_type: None,
            },
        })
        .await
        .expect("Gemini request failed");

    assert!(!response.text.trim().is_empty(), "empty response");

    let result = decode_response(&response.text, response.grounding_chunks, 0);
    assert!(!result.markdown.contains("_START]"), "tags not stripped: {}", result.markdown);
    assert_eq!(result.vitals.and_then(|v| v.bpm), Some(70.0));
}
