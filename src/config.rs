use crate::error::{MediMindError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const HISTORY_FILE_NAME: &str = "history.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    /// 要約用の軽量モデル
    pub summary_model: String,
    pub chunk_size: usize,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub thinking_budget: u32,
    pub history_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-3-pro-preview".into(),
            summary_model: "gemini-3-flash-preview".into(),
            chunk_size: 15,
            timeout_seconds: 300,
            temperature: 0.1,
            max_output_tokens: 32_768,
            thinking_budget: 16_000,
            history_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| MediMindError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("medimind"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// 履歴ファイルのパス
    ///
    /// 優先順位: 環境変数 MEDIMIND_HISTORY → 設定 → 既定（設定ディレクトリ/history.json）
    pub fn history_path(&self) -> Result<PathBuf> {
        if let Ok(path) = std::env::var("MEDIMIND_HISTORY") {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        if let Some(path) = &self.history_path {
            return Ok(path.clone());
        }
        Ok(Self::config_dir()?.join(HISTORY_FILE_NAME))
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        for var in ["GEMINI_API_KEY", "API_KEY"] {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    return Ok(key);
                }
            }
        }

        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(MediMindError::MissingApiKey)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }
}
