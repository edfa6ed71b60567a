//! Client endpoints.

use crate::client_ip::Client;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Extension, State};
use moada_core::ClientRecord;
use serde::Serialize;

/// GET /myInfo - The caller's client record.
pub async fn my_info(
    State(state): State<AppState>,
    Extension(client): Extension<Client>,
) -> ApiResult<Json<ClientRecord>> {
    Ok(Json(state.lifecycle.client_info(&client.identity).await?))
}

/// Erase-all response.
#[derive(Debug, Serialize)]
pub struct EraseResponse {
    pub message: &'static str,
    /// Number of files removed.
    pub files: usize,
}

/// POST /deleteUser - Erase every file and the record of the caller.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(client): Extension<Client>,
) -> ApiResult<Json<EraseResponse>> {
    let erased = state.lifecycle.erase(&client.identity).await?;
    Ok(Json(EraseResponse {
        message: "All of your data has been erased",
        files: erased.files,
    }))
}
