//! 文書のBase64変換
//!
//! チャンク内のファイルは rayon で並列に読み込む（順序は保持）。

use super::backend::EncodedDocument;
use crate::error::{MediMindError, Result};
use crate::scanner::Document;
use base64::{engine::general_purpose::STANDARD, Engine};
use rayon::prelude::*;

pub fn encode_document(doc: &Document) -> Result<EncodedDocument> {
    let bytes = std::fs::read(&doc.path)
        .map_err(|_| MediMindError::FileNotFound(doc.path.display().to_string()))?;

    Ok(EncodedDocument {
        file_name: doc.file_name.clone(),
        mime_type: doc.mime_type.clone(),
        category: doc.category,
        data: STANDARD.encode(bytes),
    })
}

pub fn encode_chunk(docs: &[Document]) -> Result<Vec<EncodedDocument>> {
    docs.par_iter().map(encode_document).collect()
}

/// ブロッキングI/Oをランタイム外で実行
pub async fn encode_chunk_blocking(docs: &[Document]) -> Result<Vec<EncodedDocument>> {
    let docs = docs.to_vec();
    tokio::task::spawn_blocking(move || encode_chunk(&docs))
        .await
        .map_err(|e| MediMindError::Io(std::io::Error::other(e.to_string())))?
}
