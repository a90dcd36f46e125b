//! On-disk layout of a persisted [`CodeIndex`](crate::CodeIndex).
//!
//! ```text
//! "CDTX" | version: u32 LE | header_len: u32 LE | header (JSON) | rows * dimension f32 LE
//! ```

use crate::error::{Result, VectorStoreError};
use crate::table::CodeEntry;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

const INDEX_MAGIC: &[u8; 4] = b"CDTX";
pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct IndexHeader {
    pub model_id: String,
    pub dimension: usize,
    pub fingerprint: String,
    pub entries: Vec<CodeEntry>,
}

pub(crate) fn encode_index(header: &IndexHeader, matrix: &Array2<f32>) -> Result<Vec<u8>> {
    let header_bytes = serde_json::to_vec(header)?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| VectorStoreError::IndexError("index header too large".into()))?;

    let mut out = Vec::with_capacity(12 + header_bytes.len() + matrix.len() * 4);
    out.extend_from_slice(INDEX_MAGIC);
    out.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    for v in matrix {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

pub(crate) fn decode_index(bytes: &[u8]) -> Result<(IndexHeader, Array2<f32>)> {
    if bytes.len() < 12 || &bytes[0..4] != INDEX_MAGIC {
        return Err(corrupt("missing magic header"));
    }
    let version = read_u32(bytes, 4)?;
    if version != INDEX_FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {version} (expected {INDEX_FORMAT_VERSION})"
        )));
    }
    let header_len = read_u32(bytes, 8)? as usize;
    let body_start = 12usize
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| corrupt("truncated header"))?;
    let header: IndexHeader = serde_json::from_slice(&bytes[12..body_start])
        .map_err(|e| corrupt(format!("unreadable header: {e}")))?;

    let rows = header.entries.len();
    let expected = rows
        .checked_mul(header.dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| corrupt("matrix size overflow"))?;
    let body = &bytes[body_start..];
    if body.len() != expected {
        return Err(corrupt(format!(
            "matrix has {} bytes, expected {expected}",
            body.len()
        )));
    }

    let values: Vec<f32> = body
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    let matrix = Array2::from_shape_vec((rows, header.dimension), values)
        .map_err(|e| corrupt(format!("matrix shape: {e}")))?;
    Ok((header, matrix))
}

pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|raw| raw.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| corrupt("truncated header"))
}

fn corrupt(reason: impl Into<String>) -> VectorStoreError {
    VectorStoreError::CorruptIndex(reason.into())
}
