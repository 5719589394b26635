mod media;

pub use media::{is_image, media_type_for_extension};

use crate::error::{MediMindError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 文書の分類タグ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    #[default]
    Clinical,
}

/// 解析待ちの文書（選択後は不変）
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub category: DocumentCategory,
    pub size: u64,
}

impl Document {
    /// ファイルから文書を作成（非対応の拡張子は None）
    pub fn from_path(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Err(MediMindError::FileNotFound(path.display().to_string()));
        }

        let Some(mime_type) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(media_type_for_extension)
        else {
            return Ok(None);
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let size = std::fs::metadata(path)?.len();

        Ok(Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.to_path_buf(),
            file_name,
            mime_type: mime_type.to_string(),
            category: DocumentCategory::Clinical,
            size,
        }))
    }
}

/// フォルダ内の対応文書を列挙（ファイル名順）
pub fn scan_folder(folder: &Path, recursive: bool) -> Result<Vec<Document>> {
    if !folder.exists() {
        return Err(MediMindError::FolderNotFound(folder.display().to_string()));
    }

    let mut documents = Vec::new();
    let max_depth = if recursive { usize::MAX } else { 1 };

    for entry in WalkDir::new(folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(doc) = Document::from_path(path)? {
            documents.push(doc);
        }
    }

    documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    Ok(documents)
}

/// CLI引数のパス群から文書キューを作る
///
/// ファイルはそのまま（非対応形式はスキップ）、フォルダは走査する。
/// 順序は引数の順。
pub fn scan_paths(paths: &[PathBuf], recursive: bool) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for path in paths {
        if path.is_dir() {
            documents.extend(scan_folder(path, recursive)?);
        } else if path.exists() {
            match Document::from_path(path)? {
                Some(doc) => documents.push(doc),
                None => tracing::warn!(path = %path.display(), "非対応の形式のためスキップ"),
            }
        } else {
            return Err(MediMindError::FileNotFound(path.display().to_string()));
        }
    }

    Ok(documents)
}
