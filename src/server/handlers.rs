// ==========================================
// Precast tracking backend - HTTP handlers
// ==========================================
// Parse and validate, call ImportApi, serialise. Nothing else.
// ==========================================

use crate::api::{ApiError, ApiResult, CancelResponse, SubmitResponse};
use crate::jobs::JobStatus;
use crate::server::auth::Caller;
use crate::server::AppState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

/// Tuning parameters, kept as text so malformed values get a 400 with our body.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitQuery {
    pub batch_size: Option<String>,
    pub concurrent_batches: Option<String>,
}

pub async fn submit_import(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<String>,
    Query(query): Query<SubmitQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let project_id = parse_project_id(&project_id)?;
    let batch_size = parse_tuning("batch_size", query.batch_size.as_deref())?;
    let concurrent_batches =
        parse_tuning("concurrent_batches", query.concurrent_batches.as_deref())?;

    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("expected multipart upload: {}", e)))?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }
    let (file_name, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("missing file field".to_string()))?;

    let response = state
        .api
        .submit(
            project_id,
            &file_name,
            bytes,
            batch_size,
            concurrent_batches,
            &caller,
        )
        .await?;
    Ok(Json(response))
}

pub async fn job_status(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatus>> {
    Ok(Json(state.api.status(&job_id)?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    Ok(Json(state.api.cancel(&job_id, &caller)?))
}

pub async fn export_template(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let project_id = parse_project_id(&project_id)?;
    let template = state.api.template(project_id, &caller).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(template.content_type),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", template.file_name))
            .map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    Ok((headers, template.bytes))
}

fn parse_project_id(raw: &str) -> ApiResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::BadRequest(format!("invalid project id '{}'", raw))),
    }
}

/// Missing or empty ⇒ default; anything but an integer ⇒ 400.
fn parse_tuning(name: &str, raw: Option<&str>) -> ApiResult<Option<i64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("{} must be an integer, got '{}'", name, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tuning() {
        assert_eq!(parse_tuning("batch_size", None).unwrap(), None);
        assert_eq!(parse_tuning("batch_size", Some("")).unwrap(), None);
        assert_eq!(parse_tuning("batch_size", Some(" 40 ")).unwrap(), Some(40));
        assert_eq!(parse_tuning("batch_size", Some("-3")).unwrap(), Some(-3));
        assert!(matches!(
            parse_tuning("batch_size", Some("ten")),
            Err(ApiError::BadRequest(_))
        ));
        assert!(parse_tuning("batch_size", Some("2.5")).is_err());
    }

    #[test]
    fn test_parse_project_id() {
        assert_eq!(parse_project_id("12").unwrap(), 12);
        assert!(parse_project_id("0").is_err());
        assert!(parse_project_id("abc").is_err());
    }
}
