//! HTTP server for defect classification.

use crate::config::ServerConfig;
use crate::engine::build_pipeline;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use print_defect::core::DefectError;
use print_defect::pipeline::{
    ImageSource, IngestCoordinator, IngestError, IngestRequest, InspectOptions, MemoryRecordStore,
    Pipeline, StoreError,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Application state shared across handlers
struct AppState {
    pipeline: Pipeline,
    ingest: IngestCoordinator,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(ErrorResponse {
            status: "error",
            message: message.into(),
        }),
    )
        .into_response()
}

/// Run the HTTP server
pub async fn run_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Loading classification model...");
    let pipeline = build_pipeline(&config.engine)?;
    info!("Model loaded");

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let store = if config.printers.is_empty() {
        MemoryRecordStore::new()
    } else {
        MemoryRecordStore::with_printers(config.printers.iter().copied())
    };
    let ingest = IngestCoordinator::new(pipeline.clone(), Arc::new(store), &config.upload_dir)
        .keep_uploads(config.keep_uploads);

    let state = Arc::new(AppState { pipeline, ingest });
    let app = router(state, config.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    info!("Server listening on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /health         - Health check");
    info!("  POST /process_images - Classify one image");
    info!("  POST /api/prints     - Classify and record a print");
    info!("Upload limit: {} bytes", config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/process_images", post(process_images_handler))
        .route("/api/prints", post(add_print_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fields of a multipart upload
#[derive(Default)]
struct Upload {
    filename: Option<String>,
    data: Option<Vec<u8>>,
    printer_id: Option<String>,
    quality: Option<String>,
    threshold: Option<String>,
    remove_background: Option<String>,
}

impl Upload {
    /// Reads every field; an oversized body fails with `413`.
    async fn read(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut upload = Upload::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    upload.filename = Some(field.file_name().unwrap_or_default().to_string());
                    upload.data = Some(field.bytes().await?.to_vec());
                }
                "printer_id" => upload.printer_id = Some(field.text().await?),
                "quality" => upload.quality = Some(field.text().await?),
                "threshold" => upload.threshold = Some(field.text().await?),
                "remove_background" => upload.remove_background = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(upload)
    }

    fn options(&self) -> Result<InspectOptions, String> {
        let confidence_threshold = self
            .threshold
            .as_deref()
            .map(|t| t.trim().parse::<f32>().map_err(|_| format!("invalid threshold: {t}")))
            .transpose()?;
        let remove_background = self
            .remove_background
            .as_deref()
            .map(|v| v.trim().parse::<bool>().map_err(|_| format!("invalid remove_background: {v}")))
            .transpose()?;
        Ok(InspectOptions {
            confidence_threshold,
            remove_background,
        })
    }
}

fn pipeline_error_status(err: &DefectError) -> StatusCode {
    match err {
        DefectError::Validation { .. } | DefectError::ImageLoad(_) | DefectError::Io(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Classification endpoint: multipart field `image`
async fn process_images_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Response {
    let start = Instant::now();
    let upload = match Upload::read(multipart).await {
        Ok(upload) => upload,
        Err(e) => return error_response(e.status(), e.body_text()),
    };
    let options = match upload.options() {
        Ok(options) => options,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let (Some(filename), Some(data)) = (upload.filename, upload.data) else {
        return error_response(StatusCode::BAD_REQUEST, "No image part");
    };

    match state
        .pipeline
        .inspect(ImageSource::bytes(filename, data), &options)
        .await
    {
        Ok(inspection) => {
            info!(
                state = %inspection.state,
                total_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Image processed"
            );
            (StatusCode::OK, Json(inspection)).into_response()
        }
        Err(e) => {
            error!(stage = %e.stage(), error = %e, "Image processing failed");
            error_response(pipeline_error_status(&e), e.to_string())
        }
    }
}

/// Print upload endpoint: multipart fields `image`, `printer_id`, `quality`
async fn add_print_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Response {
    let upload = match Upload::read(multipart).await {
        Ok(upload) => upload,
        Err(e) => return error_response(e.status(), e.body_text()),
    };
    let options = match upload.options() {
        Ok(options) => options,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let (Some(filename), Some(data)) = (upload.filename, upload.data) else {
        return error_response(StatusCode::BAD_REQUEST, "No image part");
    };
    let printer_id = upload.printer_id.as_deref().map(str::trim).map(str::parse::<u64>);
    let quality = upload.quality.as_deref().map(str::trim).map(str::parse::<u32>);
    let (Some(Ok(printer_id)), Some(Ok(quality))) = (printer_id, quality) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "printer_id and quality must be positive integers",
        );
    };

    let request = IngestRequest {
        filename,
        data,
        printer_id,
        quality,
        options,
    };
    match state.ingest.ingest(request).await {
        Ok(receipt) => {
            let code = if receipt.record.is_some() {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (code, Json(receipt)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Print upload rejected");
            let code = match &e {
                IngestError::Validation(_) => StatusCode::BAD_REQUEST,
                IngestError::Store(StoreError::UnknownPrinter(_)) => StatusCode::NOT_FOUND,
                IngestError::Pipeline(err) => pipeline_error_status(err),
                IngestError::Io(_) | IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(code, e.to_string())
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use print_defect::core::config::{ParallelPolicy, PipelineConfig};
    use print_defect::core::traits::AdapterBuilder;
    use print_defect::core::{ClassifierBackend, DefectResult, ModelHandle, Tensor4D};
    use print_defect::domain::DefectClassificationAdapterBuilder;
    use std::io::Cursor;
    use std::path::Path;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const BOUNDARY: &str = "print-defect-boundary";

    #[derive(Debug)]
    struct FixedBackend;

    impl ClassifierBackend for FixedBackend {
        fn forward(&self, _input: &Tensor4D) -> DefectResult<Vec<f32>> {
            Ok(vec![0.9, 0.1])
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn state(upload_dir: &Path) -> Arc<AppState> {
        let model = ModelHandle::new(
            Box::new(FixedBackend),
            vec!["0 OK".to_string(), "1 Underextrusion".to_string()],
        )
        .unwrap();
        let adapter = DefectClassificationAdapterBuilder::new()
            .build(Arc::new(model))
            .unwrap();
        let pipeline =
            Pipeline::new(PipelineConfig::default(), adapter, ParallelPolicy::default()).unwrap();
        let ingest = IngestCoordinator::new(
            pipeline.clone(),
            Arc::new(MemoryRecordStore::new()),
            upload_dir,
        );
        Arc::new(AppState { pipeline, ingest })
    }

    /// Incompressible PNG, so the encoded size tracks the pixel count.
    fn noise_png(side: u32) -> Vec<u8> {
        let mut seed = 0x2545_f491_u32;
        let img = RgbImage::from_fn(side, side, |_, _| {
            let mut next = || {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 24) as u8
            };
            Rgb([next(), next(), next()])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn multipart_body(image: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"remove_background\"\r\n\r\nfalse\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"p.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(image);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    /// Serves `app` on a loopback port and returns the status of one upload.
    async fn upload_status(app: Router, body: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let head = format!(
            "POST /process_images HTTP/1.1\r\nHost: {addr}\r\n\
             Content-Type: multipart/form-data; boundary={BOUNDARY}\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();

        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        while !response.windows(2).any(|w| w == b"\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buf[..n]);
        }
        let status_line = String::from_utf8_lossy(&response);
        status_line.split_whitespace().nth(1).unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_configured_limit_admits_large_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body(&noise_png(1024));
        assert!(body.len() > 2 * 1024 * 1024);

        let app = router(state(dir.path()), 8 * 1024 * 1024);
        assert_eq!(upload_status(app, body).await, 200);
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_payload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state(dir.path()), 4096);
        assert_eq!(upload_status(app, multipart_body(&[0u8; 6000])).await, 413);
    }
}
