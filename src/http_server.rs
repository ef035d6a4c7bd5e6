//! HTTP server implementation using Axum.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use axum::{
    extract::{Multipart, Query, State},
    http::header,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::browser::{self, ClickTarget};
use crate::code;
use crate::desktop::{self, MouseButton};
use crate::error::{ApiError, Result};
use crate::recorder::StopReport;
use crate::runner::{self, RunRequest, StreamChunk};
use crate::state::AppState;

fn default_timeout() -> u64 {
    30
}

fn default_fps() -> u32 {
    15
}

fn default_mode() -> String {
    "644".into()
}

fn default_button() -> String {
    "left".into()
}

fn default_format() -> String {
    "png".into()
}

#[derive(Debug, Deserialize)]
struct ShellExecRequest {
    command: String,
    cwd: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ShellExecResponse {
    stdout: String,
    stderr: String,
    exit_code: i32,
    duration_ms: f64,
}

#[derive(Debug, Deserialize)]
struct CodeExecRequest {
    code: String,
    language: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

#[derive(Debug, Serialize)]
struct CodeExecResponse {
    output: String,
    error: String,
    exit_code: i32,
    duration_ms: f64,
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: String,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    path: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Debug, Deserialize)]
struct FileWriteRequest {
    path: String,
    content: String,
    #[serde(default = "default_mode")]
    mode: String,
}

#[derive(Debug, Serialize)]
struct FileEntry {
    name: String,
    path: PathBuf,
    #[serde(rename = "type")]
    kind: &'static str,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LaunchQuery {
    #[serde(default)]
    headless: bool,
}

#[derive(Debug, Deserialize)]
struct NavigateRequest {
    url: String,
    wait_until: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClickRequest {
    selector: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TypeRequest {
    text: String,
    selector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    script: String,
}

#[derive(Debug, Deserialize)]
struct BrowserScreenshotQuery {
    #[serde(default)]
    full_page: bool,
    #[serde(default = "default_format")]
    format: String,
}

#[derive(Debug, Deserialize)]
struct MouseRequest {
    action: String,
    x: i32,
    y: i32,
    #[serde(default = "default_button")]
    button: String,
}

#[derive(Debug, Deserialize)]
struct KeyboardRequest {
    text: Option<String>,
    key: Option<String>,
    #[serde(default)]
    modifiers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RecordStartRequest {
    output_path: String,
    #[serde(default = "default_fps")]
    fps: u32,
}

#[derive(Debug, Serialize)]
struct RecordStopResponse {
    status: &'static str,
    size_bytes: u64,
    duration: f64,
    output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<StopReport> for RecordStopResponse {
    fn from(report: StopReport) -> Self {
        Self {
            status: "stopped",
            size_bytes: report.size_bytes,
            duration: report.duration_secs,
            output_path: report.output_path,
            error: report.error,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sandbox/info", get(sandbox_info))
        .route("/shell/exec", post(shell_exec))
        .route("/shell/stream", post(shell_stream))
        .route("/code/execute", post(code_execute))
        .route("/file/read", get(file_read))
        .route("/file/write", post(file_write))
        .route("/file/list", get(file_list))
        .route("/file/upload", post(file_upload))
        .route("/file/download", get(file_download))
        .route("/browser/launch", post(browser_launch))
        .route("/browser/navigate", post(browser_navigate))
        .route("/browser/click", post(browser_click))
        .route("/browser/type", post(browser_type))
        .route("/browser/evaluate", post(browser_evaluate))
        .route("/browser/screenshot", get(browser_screenshot))
        .route("/browser/close", post(browser_close))
        .route("/browser/status", get(browser_status))
        .route("/screen/screenshot", get(screen_screenshot))
        .route("/screen/mouse", post(screen_mouse))
        .route("/screen/keyboard", post(screen_keyboard))
        .route("/screen/record/start", post(record_start))
        .route("/screen/record/stop", post(record_stop))
        .route("/screen/record/status", get(record_status))
        .route("/screen/record/download", get(record_download))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Session teardown: leave no Chrome or recorder child behind.
    if let Err(e) = state.browser.close().await {
        warn!(error = %e, "browser teardown failed");
    }
    match state.recorder.stop().await {
        Ok(report) => info!(
            size_bytes = report.size_bytes,
            "recording stopped at shutdown"
        ),
        Err(ApiError::NotRecording) => {}
        Err(e) => warn!(error = %e, "recorder teardown failed"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let display_number = state
        .config
        .display
        .trim_start_matches(':')
        .split('.')
        .next()
        .unwrap_or("0")
        .to_string();
    let display_up = Path::new(&format!("/tmp/.X11-unix/X{display_number}")).exists();

    Json(json!({
        "status": "healthy",
        "uptime": state.uptime_secs(),
        "services": {
            "display": display_up,
            "browser": state.browser.status().await.running,
            "recording": state.recorder.status().await.recording,
        }
    }))
}

async fn sandbox_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let hostname = tokio::fs::read_to_string("/proc/sys/kernel/hostname")
        .await
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    Json(json!({
        "hostname": hostname,
        "workspace": state.config.workspace,
        "display": state.config.display,
        "cdp_url": state.config.cdp_url(),
        "uptime": state.uptime_secs(),
    }))
}

async fn shell_exec(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ShellExecRequest>,
) -> Result<Json<ShellExecResponse>> {
    let outcome = runner::run(run_request(&state, req)?).await?;
    Ok(Json(ShellExecResponse {
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        exit_code: outcome.exit_code,
        duration_ms: outcome.duration.as_secs_f64() * 1000.0,
    }))
}

async fn shell_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ShellExecRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let mut rx = runner::stream(run_request(&state, req)?);
    let stream = async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            let data = match chunk {
                StreamChunk::Line(line) => line,
                StreamChunk::Exit(code) => format!("[exit_code:{code}]"),
                StreamChunk::Error(e) => format!("[error:{e}]"),
            };
            yield Ok(Event::default().data(data));
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn run_request(state: &AppState, req: ShellExecRequest) -> Result<RunRequest> {
    if req.timeout == 0 {
        return Err(ApiError::InvalidArgument("timeout must be positive".into()));
    }
    Ok(RunRequest {
        command: req.command,
        cwd: req.cwd.unwrap_or_else(|| state.config.workspace.clone()),
        timeout: Duration::from_secs(req.timeout),
        env: req.env,
    })
}

async fn code_execute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CodeExecRequest>,
) -> Result<Json<CodeExecResponse>> {
    if req.timeout == 0 {
        return Err(ApiError::InvalidArgument("timeout must be positive".into()));
    }
    let outcome = code::execute(
        &req.language,
        &req.code,
        Duration::from_secs(req.timeout),
        state.config.workspace.clone(),
    )
    .await?;
    Ok(Json(CodeExecResponse {
        output: outcome.stdout,
        error: outcome.stderr,
        exit_code: outcome.exit_code,
        duration_ms: outcome.duration.as_secs_f64() * 1000.0,
    }))
}

/// Relative paths land in the workspace; absolute paths are honored as-is.
fn resolve_path(workspace: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

async fn file_read(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Value>> {
    let path = resolve_path(&state.config.workspace, &query.path);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("file: {}", path.display())))?;
    Ok(Json(
        json!({ "path": path, "content": content, "size": content.len() }),
    ))
}

async fn file_write(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FileWriteRequest>,
) -> Result<Json<Value>> {
    let path = resolve_path(&state.config.workspace, &req.path);
    let mode = u32::from_str_radix(&req.mode, 8)
        .map_err(|_| ApiError::InvalidArgument(format!("invalid file mode: {}", req.mode)))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &req.content).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(Json(json!({ "path": path, "size": req.content.len() })))
}

async fn file_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let root = resolve_path(&state.config.workspace, &query.path);
    if !tokio::fs::try_exists(&root).await? {
        return Err(ApiError::NotFound(format!("directory: {}", root.display())));
    }

    let mut entries = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(dir) = pending.pop() {
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let meta = entry.metadata().await?;
            let path = entry.path();
            if meta.is_dir() && query.recursive {
                pending.push(path.clone());
            }
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                kind: if meta.is_dir() { "directory" } else { "file" },
                size: meta.len(),
                modified: meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs()),
            });
        }
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(Json(json!({ "path": root, "entries": entries })))
}

async fn file_download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Response> {
    let path = resolve_path(&state.config.workspace, &query.path);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("file: {}", path.display())))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".into());
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn file_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let mut dest: Option<String> = None;
    let mut content: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?
    {
        match field.name() {
            Some("path") => {
                dest = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?,
                );
            }
            Some("file") => {
                content = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }
    let dest = dest.ok_or_else(|| ApiError::InvalidArgument("missing path field".into()))?;
    let content = content.ok_or_else(|| ApiError::InvalidArgument("missing file field".into()))?;

    let path = resolve_path(&state.config.workspace, &dest);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &content).await?;
    Ok(Json(json!({ "path": path, "size": content.len() })))
}

async fn browser_launch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LaunchQuery>,
) -> Result<Json<browser::LaunchInfo>> {
    Ok(Json(state.browser.launch(query.headless).await?))
}

async fn browser_navigate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NavigateRequest>,
) -> Result<Json<browser::PageLocation>> {
    Ok(Json(
        state
            .browser
            .navigate(&req.url, req.wait_until.as_deref())
            .await?,
    ))
}

async fn browser_click(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClickRequest>,
) -> Result<Json<Value>> {
    let target = ClickTarget::from_parts(req.selector, req.x, req.y)?;
    state.browser.click(target).await?;
    Ok(Json(json!({ "status": "clicked" })))
}

async fn browser_type(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TypeRequest>,
) -> Result<Json<Value>> {
    state
        .browser
        .type_text(&req.text, req.selector.as_deref())
        .await?;
    Ok(Json(json!({ "status": "typed" })))
}

async fn browser_evaluate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<Value>> {
    let result = state.browser.evaluate(&req.script).await?;
    Ok(Json(json!({ "result": result })))
}

async fn browser_screenshot(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowserScreenshotQuery>,
) -> Result<Response> {
    let format = browser::image_format(&query.format)?;
    let bytes = state.browser.screenshot(query.full_page, format).await?;
    let content_type = if query.format == "png" {
        "image/png"
    } else {
        "image/jpeg"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

async fn browser_close(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    state.browser.close().await?;
    Ok(Json(json!({ "status": "closed" })))
}

async fn browser_status(State(state): State<Arc<AppState>>) -> Json<browser::BrowserStatus> {
    Json(state.browser.status().await)
}

async fn screen_screenshot(State(state): State<Arc<AppState>>) -> Result<Response> {
    let bytes = desktop::screenshot(&state.config.display).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

async fn screen_mouse(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MouseRequest>,
) -> Result<Json<Value>> {
    let button = MouseButton::parse(&req.button)?;
    desktop::mouse(&state.config.display, &req.action, req.x, req.y, button).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn screen_keyboard(
    State(state): State<Arc<AppState>>,
    Json(req): Json<KeyboardRequest>,
) -> Result<Json<Value>> {
    desktop::keyboard(
        &state.config.display,
        req.text.as_deref(),
        req.key.as_deref(),
        &req.modifiers,
    )
    .await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn record_start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordStartRequest>,
) -> Result<Json<Value>> {
    let output = resolve_path(&state.config.workspace, &req.output_path);
    let report = state.recorder.start(output, req.fps).await?;
    Ok(Json(json!({ "status": "recording", "pid": report.pid })))
}

async fn record_stop(State(state): State<Arc<AppState>>) -> Result<Json<RecordStopResponse>> {
    let report = state.recorder.stop().await?;
    Ok(Json(report.into()))
}

async fn record_status(
    State(state): State<Arc<AppState>>,
) -> Json<crate::recorder::RecordingStatus> {
    Json(state.recorder.status().await)
}

async fn record_download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Response> {
    let path = resolve_path(&state.config.workspace, &query.path);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("recording: {}", path.display())))?;
    Ok(([(header::CONTENT_TYPE, "video/mp4")], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let mut config = crate::config::Config::from_env();
        config.workspace = std::env::temp_dir();
        router(AppState::new(config))
    }

    async fn send_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        into_parts(response).await
    }

    async fn send_get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        into_parts(response).await
    }

    async fn into_parts(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_status_and_services() {
        let (status, body) = send_get(test_app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body["services"]["browser"].is_boolean());
        assert_eq!(body["services"]["recording"], false);
    }

    #[tokio::test]
    async fn shell_exec_captures_output_and_exit_code() {
        let (status, body) = send_json(
            test_app(),
            "/shell/exec",
            json!({ "command": "echo hello; exit 0" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stdout"], "hello\n");
        assert_eq!(body["exit_code"], 0);
        assert!(body["duration_ms"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn shell_exec_reports_nonzero_exit_without_error() {
        let (status, body) = send_json(
            test_app(),
            "/shell/exec",
            json!({ "command": "echo oops >&2; exit 42" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exit_code"], 42);
        assert_eq!(body["stderr"], "oops\n");
    }

    #[tokio::test]
    async fn shell_exec_timeout_maps_to_408() {
        let (status, body) = send_json(
            test_app(),
            "/shell/exec",
            json!({ "command": "sleep 10", "timeout": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert!(body["error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn shell_exec_rejects_zero_timeout() {
        let (status, _) = send_json(
            test_app(),
            "/shell/exec",
            json!({ "command": "true", "timeout": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn code_execute_runs_bash() {
        let (status, body) = send_json(
            test_app(),
            "/code/execute",
            json!({ "language": "bash", "code": "echo $((2 + 2))" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["output"].as_str().unwrap().contains('4'));
        assert_eq!(body["exit_code"], 0);
    }

    #[tokio::test]
    async fn code_execute_unknown_language_is_400() {
        let (status, body) = send_json(
            test_app(),
            "/code/execute",
            json!({ "language": "cobol", "code": "DISPLAY 'hi'." }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("cobol"));
    }

    #[tokio::test]
    async fn record_stop_without_start_is_409() {
        let (status, _) = send_json(test_app(), "/screen/record/stop", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn record_status_defaults_to_idle() {
        let (status, body) = send_get(test_app(), "/screen/record/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recording"], false);
    }

    #[tokio::test]
    async fn browser_status_defaults_to_not_running() {
        let (status, body) = send_get(test_app(), "/browser/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);
    }

    #[tokio::test]
    async fn browser_click_requires_selector_or_coordinates() {
        let (status, _) = send_json(test_app(), "/browser/click", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn file_write_then_read_round_trip() {
        let name = format!("sandboxd-http-{}.txt", uuid::Uuid::new_v4());

        let (status, body) = send_json(
            test_app(),
            "/file/write",
            json!({ "path": name, "content": "round trip" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["size"], 10);

        let (status, body) = send_get(test_app(), &format!("/file/read?path={name}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "round trip");

        let written = std::env::temp_dir().join(&name);
        std::fs::remove_file(written).unwrap();
    }

    #[tokio::test]
    async fn file_read_missing_is_404() {
        let (status, _) = send_get(test_app(), "/file/read?path=no-such-sandboxd-file").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn file_write_rejects_bad_mode() {
        let (status, _) = send_json(
            test_app(),
            "/file/write",
            json!({ "path": "x.txt", "content": "", "mode": "rwx" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn file_list_contains_written_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "b").unwrap();

        let uri = format!("/file/list?path={}&recursive=true", dir.path().display());
        let (status, body) = send_get(test_app(), &uri).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"a.txt"));
        assert!(names.contains(&"sub"));
        assert!(names.contains(&"b.txt"));
    }
}
