//! File endpoints: upload, download, delete and lookup.

use super::common::{MessageResponse, PublicFile, require_private_id, require_public_id};
use crate::client_ip::Client;
use crate::error::{ApiError, ApiResult, status_for};
use crate::lifecycle::{ErrorKind, UploadOutcome, UploadRequest};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Extension, Form, Multipart, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use moada_core::FileRecord;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Response for an upload answered with an already stored file.
#[derive(Debug, Serialize)]
pub struct DuplicateResponse {
    pub code: &'static str,
    pub message: &'static str,
    pub file: PublicFile,
}

/// POST /sendFile - Upload a file (multipart `file`, optional `email`).
pub async fn send_file(
    State(state): State<AppState>,
    Extension(client): Extension<Client>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let mut file: Option<(String, String, Bytes)> = None;
    let mut email = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                file = Some((file_name, content_type, data));
            }
            Some("email") => email = Some(field.text().await?),
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("the 'file' field was not provided".to_string()))?;

    let outcome = state
        .lifecycle
        .upload(UploadRequest {
            identity: client.identity,
            file_name,
            content_type,
            email,
            data,
        })
        .await?;

    Ok(match outcome {
        UploadOutcome::Stored(record) => (StatusCode::CREATED, Json(record)).into_response(),
        UploadOutcome::Deduplicated(record) => (
            status_for(ErrorKind::Conflict),
            Json(DuplicateResponse {
                code: ErrorKind::Conflict.as_str(),
                message: "this file has already been uploaded",
                file: PublicFile::from(record),
            }),
        )
            .into_response(),
    })
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "idPublic")]
    pub id_public: Option<String>,
}

/// GET /downloadFile?idPublic= - Stream a file as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    Extension(client): Extension<Client>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let public_id = require_public_id(query.id_public.as_deref())?;
    let download = state.lifecycle.download(&client.identity, &public_id).await?;

    Ok((
        StatusCode::OK,
        [
            (
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (CONTENT_LENGTH, HeaderValue::from(download.size)),
            (CONTENT_DISPOSITION, attachment(&download.record.name)),
        ],
        Body::from_stream(download.stream),
    )
        .into_response())
}

/// `Content-Disposition` for a download, with an ASCII fallback name and
/// the exact name in `filename*`.
fn attachment(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(name, NON_ALPHANUMERIC);

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    #[serde(rename = "idPrivate")]
    pub id_private: Option<String>,
}

/// POST /deleteFile - Delete one of the caller's files (form `idPrivate`).
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(client): Extension<Client>,
    Form(form): Form<DeleteForm>,
) -> ApiResult<Json<MessageResponse>> {
    let private_id = require_private_id(form.id_private.as_deref())?;
    let record = state.lifecycle.delete(&client.identity, &private_id).await?;

    Ok(Json(MessageResponse {
        message: format!("{} has been deleted", record.name),
    }))
}

#[derive(Debug, Deserialize)]
pub struct FileInfoQuery {
    #[serde(rename = "idPrivate")]
    pub id_private: Option<String>,
}

/// GET /fileInfo?idPrivate= - Full record of a file.
pub async fn file_info(
    State(state): State<AppState>,
    Query(query): Query<FileInfoQuery>,
) -> ApiResult<Json<FileRecord>> {
    let private_id = require_private_id(query.id_private.as_deref())?;
    Ok(Json(state.lifecycle.file_info(&private_id).await?))
}
