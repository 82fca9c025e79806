//! HTTP surface.
//!
//! - `POST /upload`: multipart enhancement request
//! - `GET /health`: readiness report
//! - `GET /static/output_images/...`: locally stored results

mod form;

pub use form::{FILE_FIELD, UploadForm, UploadedFile, read_form};

use crate::constants::server::STATIC_PREFIX;
use crate::constants::storage::OUTPUT_DIR_NAME;
use crate::error::{Error, ErrorKind, Result};
use crate::pipeline::EnhancementResult;
use crate::runtime::Runtime;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::multipart::FormData;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Slack on top of the upload cap for the multipart envelope and text fields.
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Body of a successful upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Stored object id.
    pub id: Uuid,
    /// Locator of the processed image.
    pub processed_image: String,
    /// Always `success`.
    pub status: &'static str,
    /// When the result was stored.
    pub created_at: DateTime<Utc>,
}

impl From<EnhancementResult> for UploadResponse {
    fn from(result: EnhancementResult) -> Self {
        Self {
            id: result.locator.id,
            processed_image: result.locator.url,
            status: "success",
            created_at: result.created_at,
        }
    }
}

/// Body of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Diagnostic message.
    pub error: String,
}

/// HTTP status for a failure class.
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::UnsupportedVersion => StatusCode::BAD_REQUEST,
        ErrorKind::ModelInit
        | ErrorKind::Inference
        | ErrorKind::Storage
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    warp::reply::with_status(
        warp::reply::json(&ErrorBody {
            error: message.into(),
        }),
        status,
    )
    .into_response()
}

fn error_reply(err: &Error) -> Response {
    error_response(status_for(err.kind()), err.to_string())
}

/// All routes, with permissive CORS.
pub fn routes(runtime: Arc<Runtime>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let form_limit = runtime
        .config()
        .server
        .max_upload_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    let upload = warp::path("upload")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::multipart::form().max_length(form_limit))
        .and(with_runtime(Arc::clone(&runtime)))
        .and_then(handle_upload);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_runtime(Arc::clone(&runtime)))
        .and_then(handle_health);

    let results = warp::path(STATIC_PREFIX)
        .and(warp::path(OUTPUT_DIR_NAME))
        .and(warp::fs::dir(runtime.output_dir().to_path_buf()));

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization"]);

    upload
        .or(health)
        .or(results)
        .with(cors)
        .recover(handle_rejection)
}

fn with_runtime(
    runtime: Arc<Runtime>,
) -> impl Filter<Extract = (Arc<Runtime>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&runtime))
}

async fn handle_upload(form: FormData, runtime: Arc<Runtime>) -> std::result::Result<Response, Infallible> {
    if !runtime.is_ready() {
        return Ok(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service is not accepting requests",
        ));
    }

    let max_upload_bytes = runtime.config().server.max_upload_bytes;
    let upload = match read_form(form, max_upload_bytes).await {
        Ok(upload) => upload,
        Err(e) => {
            error!(stage = "validate", kind = e.kind().as_str(), "Rejected upload: {e}");
            return Ok(error_reply(&e));
        }
    };

    let (version, user_token) = (upload.version().to_string(), upload.user_token().to_string());
    let request = match upload.into_request() {
        Ok(request) => request,
        Err(e) => {
            error!(
                version = %version,
                user_token = %user_token,
                stage = "validate",
                kind = e.kind().as_str(),
                "Rejected upload: {e}"
            );
            return Ok(error_reply(&e));
        }
    };

    Ok(match runtime.enhancer().process(request).await {
        Ok(result) => {
            let body = UploadResponse::from(result);
            warp::reply::with_status(warp::reply::json(&body), StatusCode::OK).into_response()
        }
        Err(e) => error_reply(&e),
    })
}

async fn handle_health(runtime: Arc<Runtime>) -> std::result::Result<Response, Infallible> {
    let report = runtime.health();
    let status = if runtime.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok(warp::reply::with_status(warp::reply::json(&report), status).into_response())
}

async fn handle_rejection(rejection: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Upload is too large".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::UnsupportedMediaType>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<warp::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else {
        warn!("Unhandled rejection: {:?}", rejection);
        (StatusCode::BAD_REQUEST, "Malformed request".to_string())
    };
    Ok(error_response(status, message))
}

/// Parse the configured bind address.
pub fn bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host.trim().parse().map_err(|e| Error::Server {
        reason: format!("invalid bind host '{host}': {e}"),
    })?;
    Ok(SocketAddr::new(ip, port))
}

/// Serve until Ctrl-C, then shut the runtime down.
pub async fn serve(runtime: Arc<Runtime>) -> Result<()> {
    let addr = bind_addr(&runtime.config().server.host, runtime.config().server.port)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested, draining in-flight requests");
    };

    let (bound, server) = warp::serve(routes(Arc::clone(&runtime)))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| Error::Server {
            reason: format!("failed to bind {addr}: {e}"),
        })?;
    info!("Listening on http://{bound}");

    server.await;
    runtime.shutdown();
    Ok(())
}
