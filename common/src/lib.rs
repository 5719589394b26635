//! MediMind Common Library
//!
//! CLIと各バックエンドで共有される型とユーティリティ
//! （ネットワーク・ファイルI/Oを持たない純粋ロジックのみ）

pub mod types;
pub mod lenient;
pub mod parser;
pub mod prompts;

pub use types::{
    AnalysisResult, CaseRecord, ChatMessage, ChatRole, Checkpoint, DigitalTwinData,
    DrugInteraction, GroundingChunk, GroundingWeb, InstrumentalImage, LongitudinalPoint,
    PatientActionTask, ProactiveCareStep, ScreeningAlert, ScribeOutput, SimulationResult,
    SpatialMarker, TherapeuticSuggestion, VitalParams,
};
pub use parser::{
    decode_blocks, decode_response, detect_red_code, extract_tag, parse_json_block,
    strip_code_fence, strip_tagged_blocks, DecodedBlocks, ResponseTag,
};
pub use prompts::{build_history_context, build_report_prompt, HistoricalReport};
