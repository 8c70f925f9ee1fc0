use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{cors::CorsLayer, services::ServeFile, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::engine::CaptionEngine;
use crate::error::ApiError;
use crate::logging::LogFile;
use crate::ui;
use crate::uploads::{caption_and_cleanup, UploadDir};

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadDir,
    pub engine: Arc<dyn CaptionEngine>,
    pub logs: LogFile,
}

#[derive(Serialize)]
struct CaptionResponse {
    caption: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct FileListResponse {
    files: Vec<String>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ui", get(index))
        .route("/caption", post(generate_caption))
        .route("/health", get(health_check))
        .route("/logs", get(get_logs))
        .route("/delete_logs", post(delete_logs))
        .route("/file_list", get(list_uploaded_files))
        .route("/download/:filename", get(download_file))
        .route("/clear_folder", post(clear_upload_folder))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(Arc::new(state))
}

async fn index() -> Html<&'static str> {
    info!("Rendering index page.");
    Html(ui::INDEX_HTML)
}

async fn generate_caption(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CaptionResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Caption request is not multipart: {}", e);
        no_file()
    })?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some("image") {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(upload_error)?;
        upload = Some((original_name, data));
        break;
    }

    let Some((original_name, data)) = upload else {
        warn!("Request missing image file.");
        return Err(no_file());
    };

    let scratch = state.uploads.store(&data, &original_name).await.map_err(|e| {
        error!("Failed to save upload {:?}: {}", original_name, e);
        ApiError::Internal("Failed to save image".into())
    })?;

    let caption = caption_and_cleanup(scratch, state.engine.as_ref())
        .await
        .map_err(|e| {
            error!("Error generating caption: {:#}", e);
            ApiError::Internal("Failed to generate caption".into())
        })?;

    info!("Generated caption: {}", caption);
    Ok(Json(CaptionResponse { caption }))
}

fn upload_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Upload exceeds the body limit: {}", e);
        ApiError::PayloadTooLarge("Image too large".into())
    } else {
        warn!("Malformed multipart body: {}", e);
        ApiError::BadRequest("Invalid upload".into())
    }
}

fn no_file() -> ApiError {
    ApiError::BadRequest("No file provided".into())
}

async fn health_check() -> Json<StatusResponse> {
    info!("Health check endpoint called.");
    Json(StatusResponse { status: "OK" })
}

async fn get_logs(State(state): State<Arc<AppState>>) -> Response {
    match state.logs.read().await {
        Ok(logs) => {
            info!("Logs successfully retrieved.");
            ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], logs).into_response()
        }
        Err(e) => {
            error!("Error retrieving logs: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Unable to retrieve logs.").into_response()
        }
    }
}

async fn delete_logs(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    info!("Request to delete logs received.");
    state.logs.truncate().await.map_err(|e| {
        error!("Error deleting logs: {}", e);
        ApiError::Internal("Unable to delete logs".into())
    })?;
    Ok(Json(StatusResponse { status: "Logs deleted" }))
}

async fn list_uploaded_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FileListResponse>, ApiError> {
    info!("Fetching list of uploaded files.");
    let files = state.uploads.list().await.map_err(|e| {
        error!("Error listing files: {}", e);
        ApiError::Internal("Unable to list files".into())
    })?;
    Ok(Json(FileListResponse { files }))
}

async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    info!("Download request received for file: {}", filename);
    let Some(path) = state.uploads.resolve(&filename).await else {
        warn!("File not found: {}", filename);
        return Err(ApiError::NotFound("File not found".into()));
    };

    let served = ServeFile::new(path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    let mut response = served.map(Body::new);

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    match HeaderValue::from_str(&disposition) {
        Ok(value) => {
            response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
        }
        Err(_) => {
            response.headers_mut().insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment"),
            );
        }
    }
    Ok(response)
}

async fn clear_upload_folder(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    info!("Request to clear upload folder received.");
    let removed = state.uploads.clear().await.map_err(|e| {
        error!("Error clearing upload folder: {}", e);
        ApiError::Internal("Unable to clear folder".into())
    })?;
    info!("Cleared {} files from upload folder", removed);
    Ok(Json(StatusResponse { status: "Upload folder cleared" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records whether the image was on disk when captioning ran.
    struct FakeEngine {
        result: Result<&'static str, &'static str>,
        calls: Mutex<Vec<(PathBuf, bool)>>,
    }

    #[async_trait]
    impl CaptionEngine for FakeEngine {
        async fn caption(&self, image: &std::path::Path) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((image.to_path_buf(), image.exists()));
            match self.result {
                Ok(caption) => Ok(caption.to_string()),
                Err(msg) => Err(anyhow::anyhow!(msg)),
            }
        }
    }

    struct Harness {
        _dir: TempDir,
        server: TestServer,
        engine: Arc<FakeEngine>,
        uploads: UploadDir,
        log_path: PathBuf,
    }

    async fn harness(result: Result<&'static str, &'static str>) -> Harness {
        harness_with_limit(result, 1024 * 1024).await
    }

    async fn harness_with_limit(
        result: Result<&'static str, &'static str>,
        max_upload_bytes: usize,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::create(dir.path().join("uploaded_images"))
            .await
            .unwrap();
        let log_path = dir.path().join("app.log");
        let engine = Arc::new(FakeEngine {
            result,
            calls: Mutex::new(Vec::new()),
        });
        let state = AppState {
            uploads: uploads.clone(),
            engine: engine.clone(),
            logs: LogFile::new(&log_path),
        };
        let server = TestServer::new(router(state, max_upload_bytes)).unwrap();
        Harness {
            _dir: dir,
            server,
            engine,
            uploads,
            log_path,
        }
    }

    fn image_form(field: &str) -> MultipartForm {
        MultipartForm::new().add_part(
            field,
            Part::bytes(b"\x89PNG\r\n\x1a\nfake".to_vec())
                .file_name("cat.png")
                .mime_type("image/png"),
        )
    }

    #[tokio::test]
    async fn caption_returns_text_and_removes_upload() {
        let h = harness(Ok("a photography of a cat on a sofa")).await;

        let response = h.server.post("/caption").multipart(image_form("image")).await;

        response.assert_status_ok();
        response.assert_json(&json!({ "caption": "a photography of a cat on a sofa" }));

        let calls = h.engine.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        let (path, existed) = &calls[0];
        assert!(existed);
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("_cat.png"));
        assert!(!path.exists());
        assert!(h.uploads.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn engine_failure_is_500_and_removes_upload() {
        let h = harness(Err("out of memory")).await;

        let response = h.server.post("/caption").multipart(image_form("image")).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&json!({ "error": "Failed to generate caption" }));
        let calls = h.engine.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].0.exists());
        assert!(h.uploads.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn caption_without_image_field_is_400() {
        let h = harness(Ok("unused")).await;

        let response = h.server.post("/caption").multipart(image_form("photo")).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "No file provided" }));
        assert!(h.engine.calls.lock().unwrap().is_empty());
        assert!(h.uploads.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_413_and_writes_nothing() {
        let h = harness_with_limit(Ok("unused"), 1024).await;
        let form = MultipartForm::new().add_part(
            "image",
            Part::bytes(vec![0u8; 8 * 1024])
                .file_name("huge.png")
                .mime_type("image/png"),
        );

        let response = h.server.post("/caption").multipart(form).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        response.assert_json(&json!({ "error": "Image too large" }));
        assert!(h.engine.calls.lock().unwrap().is_empty());
        assert!(h.uploads.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn caption_without_multipart_body_is_400() {
        let h = harness(Ok("unused")).await;

        let response = h.server.post("/caption").json(&json!({ "image": "x" })).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "No file provided" }));
        assert!(h.uploads.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_is_ok() {
        let h = harness(Ok("unused")).await;

        let response = h.server.get("/health").await;

        response.assert_status_ok();
        response.assert_json(&json!({ "status": "OK" }));
    }

    #[tokio::test]
    async fn delete_logs_empties_log() {
        let h = harness(Ok("unused")).await;
        std::fs::write(&h.log_path, "2024-03-09 INFO Starting\n").unwrap();

        let before = h.server.get("/logs").await;
        before.assert_status_ok();
        assert!(before.text().contains("Starting"));
        assert!(before
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        let deleted = h.server.post("/delete_logs").await;
        deleted.assert_status_ok();
        deleted.assert_json(&json!({ "status": "Logs deleted" }));

        let after = h.server.get("/logs").await;
        after.assert_status_ok();
        assert_eq!(after.text(), "");
        assert_eq!(std::fs::read_to_string(&h.log_path).unwrap(), "");
    }

    #[tokio::test]
    async fn file_list_download_and_clear() {
        let h = harness(Ok("unused")).await;
        std::fs::write(h.uploads.root().join("b.png"), b"bbb").unwrap();
        std::fs::write(h.uploads.root().join("a.png"), b"aaa").unwrap();

        let listed = h.server.get("/file_list").await;
        listed.assert_status_ok();
        listed.assert_json(&json!({ "files": ["a.png", "b.png"] }));

        let download = h.server.get("/download/a.png").await;
        download.assert_status_ok();
        assert_eq!(download.as_bytes().as_ref(), b"aaa");
        assert_eq!(
            download.headers().get("content-disposition").unwrap(),
            "attachment; filename=\"a.png\""
        );

        let cleared = h.server.post("/clear_folder").await;
        cleared.assert_status_ok();
        cleared.assert_json(&json!({ "status": "Upload folder cleared" }));

        let listed = h.server.get("/file_list").await;
        let body: Value = listed.json();
        assert_eq!(body["files"], json!([]));
    }

    #[tokio::test]
    async fn download_unknown_or_escaping_name_is_404() {
        let h = harness(Ok("unused")).await;
        std::fs::write(&h.log_path, "secret").unwrap();

        let missing = h.server.get("/download/nope.png").await;
        missing.assert_status(StatusCode::NOT_FOUND);
        missing.assert_json(&json!({ "error": "File not found" }));

        let escaping = h.server.get("/download/..%2Fapp.log").await;
        escaping.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn index_serves_upload_page() {
        let h = harness(Ok("unused")).await;

        let response = h.server.get("/").await;

        response.assert_status_ok();
        assert!(response.text().contains("/caption"));
        h.server.get("/ui").await.assert_status_ok();
    }
}
