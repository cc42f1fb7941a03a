use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Extension, Json,
};
use chrono::Utc;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{
    CurrentOwner, FileListResponse, FileResponse, NewFile, SendLinkRequest, UploadResponse,
};
use crate::services::{DownloadDecision, UploadService, UploadSource};
use crate::AppState;

/// Header carrying the access secret on downloads
const PASSWORD_HEADER: &str = "password";

/// A multipart file field written to a temp file
struct SpooledFile {
    path: PathBuf,
    file_name: Option<String>,
    content_type: Option<String>,
}

impl SpooledFile {
    async fn remove(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::error!("Failed to remove temp file {:?}: {}", self.path, e);
        }
    }
}

async fn spool_field(mut field: Field<'_>) -> Result<SpooledFile> {
    let file_name = field.file_name().map(|s| s.to_string());
    let content_type = field.content_type().map(|s| s.to_string());

    let temp_path = std::env::temp_dir().join(format!("notarydrop_upload_{}", Uuid::new_v4()));
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create temp file: {}", e)))?;

    let written: Result<()> = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file chunk: {}", e)))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to write to temp file: {}", e)))?;
        }
        file.flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to flush temp file: {}", e)))
    }
    .await;

    let spooled = SpooledFile {
        path: temp_path,
        file_name,
        content_type,
    };
    if let Err(e) = written {
        spooled.remove().await;
        return Err(e);
    }
    Ok(spooled)
}

pub(crate) async fn text_field(field: Field<'_>) -> Result<Option<String>> {
    let text = field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {}", e)))?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::BadRequest(format!("Invalid notarize flag: {}", raw))),
    }
}

fn parse_expiry_minutes(raw: &str) -> Result<chrono::Duration> {
    let minutes: i64 = raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid expiryMinutes: {}", raw)))?;
    if minutes < 0 {
        return Err(AppError::BadRequest("expiryMinutes must not be negative".to_string()));
    }
    chrono::Duration::try_minutes(minutes)
        .ok_or_else(|| AppError::BadRequest(format!("expiryMinutes out of range: {}", raw)))
}

/// Liveness probe
/// GET /api/v1/ping
pub async fn ping() -> &'static str {
    "pong"
}

/// Upload a file
/// POST /api/v1/upload
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(owner): Extension<CurrentOwner>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>> {
    let mut spooled: Option<SpooledFile> = None;
    let mut original_name: Option<String> = None;
    let mut receiver_email: Option<String> = None;
    let mut password: Option<String> = None;
    let mut expiry_minutes: Option<String> = None;
    let mut notarize: Option<String> = None;

    let parsed: Result<()> = async {
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            AppError::BadRequest(format!("Failed to process multipart: {}", e))
        })? {
            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "file" => {
                    let file = spool_field(field).await?;
                    // Keep only the first file part
                    if spooled.is_none() {
                        spooled = Some(file);
                    } else {
                        file.remove().await;
                    }
                }
                "originalName" | "original_name" => original_name = text_field(field).await?,
                "receiverEmail" | "receiver_email" => receiver_email = text_field(field).await?,
                "password" | "accessSecret" => password = text_field(field).await?,
                "expiryMinutes" | "expiry_minutes" => expiry_minutes = text_field(field).await?,
                "notarize" => notarize = text_field(field).await?,
                _ => {}
            }
        }
        Ok(())
    }
    .await;

    let Some(spooled) = spooled else {
        parsed?;
        return Err(AppError::InputMissing("No file provided".to_string()));
    };

    let result = async {
        parsed?;
        let requested = notarize.as_deref().map(parse_flag).transpose()?.unwrap_or(true);
        let expires_at = expiry_minutes
            .as_deref()
            .map(parse_expiry_minutes)
            .transpose()?
            .map(|minutes| Utc::now() + minutes);

        let meta = NewFile {
            original_name: original_name
                .or_else(|| spooled.file_name.clone())
                .unwrap_or_else(|| "unnamed".to_string()),
            owner_id: owner.id,
            access_secret: password,
            expires_at,
            mime_type: spooled.content_type.clone(),
            receiver_email,
        };

        UploadService::upload(
            &state.config,
            &state.store,
            &state.ledger,
            &state.mailer,
            UploadSource::TempFile(spooled.path.clone()),
            meta,
            state.config.ledger.enabled && requested,
        )
        .await
    }
    .await;

    spooled.remove().await;

    let response = result?;
    tracing::info!(
        "Uploaded {} ({} bytes) as {}",
        response.file_name,
        response.file_size,
        response.id
    );
    Ok(Json(ApiResponse::success(response)))
}

/// Download a file once
/// GET /api/v1/download/:id
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let password = headers
        .get(PASSWORD_HEADER)
        .and_then(|h| h.to_str().ok());

    let download = match state
        .gate
        .authorize_download(&id, password, Utc::now())
        .await?
    {
        DownloadDecision::Authorized(download) => download,
        DownloadDecision::Denied(reason) => {
            tracing::debug!("Download of {} denied: {:?}", id, reason);
            return Err(reason.into());
        }
    };

    let content_type = download
        .record
        .mime_type
        .clone()
        .or_else(|| {
            mime_guess::from_path(&download.filename)
                .first()
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let fallback_name: String = download
        .filename
        .chars()
        .map(|c| if c.is_ascii() && !matches!(c, '"' | '\\') && !c.is_ascii_control() { c } else { '_' })
        .collect();
    let encoded_name = urlencoding::encode(&download.filename);

    tracing::info!("Serving {} ({} bytes)", id, download.record.size);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, download.record.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                fallback_name, encoded_name
            ),
        )
        // The record is consumed once the body stream is dropped
        .body(Body::from_stream(ReaderStream::new(download.reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// List the caller's live files, newest first
/// GET /api/v1/my-files
pub async fn list_my_files(
    State(state): State<AppState>,
    Extension(owner): Extension<CurrentOwner>,
) -> Result<Json<ApiResponse<FileListResponse>>> {
    let files = state
        .store
        .list_by_owner(&owner.id)
        .await?
        .into_iter()
        .map(|file| {
            let link = state.config.download_link(&file.id);
            FileResponse::from_record(file, link)
        })
        .collect();

    Ok(Json(ApiResponse::success(FileListResponse { files })))
}

/// E-mail the download link of an owned file
/// POST /api/v1/send
pub async fn send_link(
    State(state): State<AppState>,
    Extension(owner): Extension<CurrentOwner>,
    Json(req): Json<SendLinkRequest>,
) -> Result<Json<ApiResponse<()>>> {
    let file = state
        .store
        .find_live(&req.file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    if file.owner_id != owner.id {
        return Err(AppError::AccessRefused("Access denied".to_string()));
    }
    if file.is_expired_at(Utc::now()) {
        return Err(AppError::Expired(
            "File has expired and is no longer available.".to_string(),
        ));
    }

    let link = state.config.download_link(&file.id);
    state
        .mailer
        .send_download_link(&req.receiver_email, &link, req.sender_name.as_deref())
        .await?;

    Ok(Json(ApiResponse::<()>::success_message("Email sent")))
}
