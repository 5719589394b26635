use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediMindError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`medimind config --set-api-key YOUR_KEY` で設定するか GEMINI_API_KEY を指定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("解析対象の文書がありません")]
    NoDocuments,

    #[error("患者名が入力されていません")]
    MissingPatientName,

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("チャンク {chunk}/{total} の解析に失敗: {source}")]
    ChunkFailed {
        chunk: usize,
        total: usize,
        #[source]
        source: Box<MediMindError>,
    },

    #[error("バックアップの読み込みに失敗: {0}")]
    ImportValidation(String),

    #[error("症例が見つかりません: {0}")]
    CaseNotFound(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediMindError>;
