use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use datastory_infra::orchestrator::{Upload, WorkerSignal, accepted_format};
use datastory_jobs::{CompletionPayload, ErrorCode, Narratives, Stage};

use crate::app::errors;

// -------------------------
// Uploads
// -------------------------

struct FilePart {
    file_name: String,
    content_type: Option<String>,
}

/// Read a `POST /jobs` multipart body: a required `file` part and an
/// optional `options` part holding a JSON object.
///
/// A body cut off by the request size limit is reported as `FILE_TOO_LARGE`,
/// unless the file part already declared an unsupported type.
pub async fn read_upload(mut multipart: Multipart, limit: u64) -> Result<Upload, Response> {
    let mut upload: Option<Upload> = None;
    let mut options = Value::Object(Map::new());
    let mut pending: Option<FilePart> = None;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(multipart_error(err, pending.as_ref(), limit)),
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let part = FilePart {
                    file_name: field.file_name().unwrap_or("upload").to_string(),
                    content_type: field.content_type().map(str::to_string),
                };
                let mut bytes = Vec::new();
                loop {
                    match field.chunk().await {
                        Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
                        Ok(None) => break,
                        Err(err) => return Err(multipart_error(err, Some(&part), limit)),
                    }
                }
                upload = Some(Upload {
                    file_name: part.file_name.clone(),
                    content_type: part.content_type.clone(),
                    bytes,
                    options: Value::Null,
                });
                pending = Some(part);
            }
            Some("options") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| multipart_error(err, pending.as_ref(), limit))?;
                options = parse_options(&text)?;
            }
            _ => {}
        }
    }

    let mut upload = upload.ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidUpload,
            "multipart field `file` is required",
        )
    })?;
    upload.options = options;
    Ok(upload)
}

fn parse_options(text: &str) -> Result<Value, Response> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidUpload,
            "`options` must be a JSON object",
        )),
        Err(err) => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidUpload,
            format!("`options` is not valid JSON: {err}"),
        )),
    }
}

fn multipart_error(err: MultipartError, file: Option<&FilePart>, limit: u64) -> Response {
    if err.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return errors::json_error(StatusCode::BAD_REQUEST, ErrorCode::InvalidUpload, err.body_text());
    }
    if let Some(file) = file {
        if let Err(err) = accepted_format(&file.file_name, file.content_type.as_deref()) {
            return errors::orchestrator_error_to_response(err);
        }
    }
    errors::json_error_with(
        StatusCode::BAD_REQUEST,
        ErrorCode::FileTooLarge,
        format!("file exceeds the upload limit of {limit} bytes"),
        match json!({ "limit": limit }) {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    )
}

// -------------------------
// Worker callbacks
// -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Processing,
    Failed,
    Completed,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /callbacks/jobs/{jobId}`.
///
/// Failures may nest `error: { code, message }` or send flat
/// `errorCode`/`errorMessage`; the nested form wins when both are present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackBody {
    pub status: CallbackStatus,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default)]
    pub attempt: Option<u32>,
    #[serde(default)]
    pub error: Option<CallbackErrorBody>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, alias = "narrative")]
    pub narratives: Option<Narratives>,
    #[serde(default)]
    pub charts: Vec<Value>,
    #[serde(default)]
    pub statistics: Value,
}

pub const DEFAULT_WORKER_ERROR_CODE: &str = "WORKER_ERROR";

impl CallbackBody {
    pub fn into_signal(self) -> Result<WorkerSignal, String> {
        match self.status {
            CallbackStatus::Processing => {
                let progress = match self.progress {
                    None => None,
                    Some(p) if (0..=100).contains(&p) => Some(p as u8),
                    Some(p) => return Err(format!("progress must be between 0 and 100, got {p}")),
                };
                Ok(WorkerSignal::Progress {
                    stage: self.stage,
                    progress,
                    attempt: self.attempt,
                })
            }
            CallbackStatus::Failed => {
                let nested = self.error.unwrap_or_default();
                let code = nested
                    .code
                    .or(self.error_code)
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_WORKER_ERROR_CODE.to_string());
                let message = nested
                    .message
                    .or(self.error_message)
                    .unwrap_or_else(|| "worker reported a failure".to_string());
                Ok(WorkerSignal::Failed {
                    code,
                    message,
                    attempt: self.attempt,
                })
            }
            CallbackStatus::Completed => Ok(WorkerSignal::Completed {
                payload: CompletionPayload {
                    narratives: self.narratives.unwrap_or_default(),
                    charts: self.charts,
                    statistics: self.statistics,
                },
                attempt: self.attempt,
            }),
        }
    }
}
