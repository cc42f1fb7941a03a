use axum::{
    extract::{Multipart, Path, State},
    Json,
};

use crate::error::{ApiResponse, AppError, Result};
use crate::handlers::file::text_field;
use crate::models::{ChainAudit, LedgerFileItem, VerifyResponse};
use crate::services::hasher::normalize_digest;
use crate::services::ContentHasher;
use crate::AppState;

/// Check whether a file's digest is on the ledger
/// POST /api/v1/verify
///
/// Takes the file itself (`file`), hashed as it streams in, or a
/// precomputed `digest`.
pub async fn verify_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<VerifyResponse>>> {
    let mut digest: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(format!("Failed to process multipart: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" if digest.is_none() => {
                let mut hasher = ContentHasher::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read file chunk: {}", e))
                })? {
                    hasher.update(&chunk);
                }
                digest = Some(hasher.finalize());
            }
            "digest" | "fileHash" | "file_hash" if digest.is_none() => {
                if let Some(raw) = text_field(field).await? {
                    digest = Some(normalize_digest(&raw)?);
                }
            }
            _ => {}
        }
    }

    let file_hash = digest.ok_or_else(|| AppError::InputMissing("No file provided".to_string()))?;
    let valid = state.ledger.is_registered(&file_hash).await?;
    let status = if valid { "verified" } else { "not_registered" };

    Ok(Json(ApiResponse::success(VerifyResponse {
        file_hash,
        valid,
        status: status.to_string(),
    })))
}

/// Every registration on the ledger, oldest first
/// GET /api/v1/ledger/files
pub async fn list_ledger_files(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<LedgerFileItem>>>> {
    let items = state
        .ledger
        .entries()
        .await?
        .into_iter()
        .map(LedgerFileItem::from)
        .collect();
    Ok(Json(ApiResponse::success(items)))
}

/// Walk one signer's chain
/// GET /api/v1/ledger/chain/:signer
pub async fn audit_chain(
    State(state): State<AppState>,
    Path(signer): Path<String>,
) -> Result<Json<ApiResponse<ChainAudit>>> {
    let audit = state.ledger.audit_chain(signer.trim()).await?;
    if !audit.valid {
        tracing::warn!(
            "Chain of {} is broken at {:?}: {:?}",
            audit.signer,
            audit.broken_at,
            audit.problem
        );
    }
    Ok(Json(ApiResponse::success(audit)))
}
