use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Deserialize;
use serde_json::{Value, json};
use sharp_frames_core::config::EngineConfig;
use sharp_frames_core::error::AppError;
use sharp_frames_core::session::parse_page_action;
use sharp_frames_core::sidecar_api::{self, SessionProgressPayload};

const REAP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionStartParams {
    session_id: String,
    video_path: PathBuf,
    work_dir: Option<PathBuf>,
    #[serde(default)]
    options: EngineConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPageParams {
    session_id: String,
    page: Option<usize>,
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionSelectParams {
    session_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionClearParams {
    session_id: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WorkdirReapParams {
    max_age_secs: Option<u64>,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    let _ = write_json_line_shared(writer, &message);
}

fn emit_session_progress(writer: &SharedWriter, payload: SessionProgressPayload) {
    emit_rpc_event(
        writer,
        "session.progress",
        json!({
            "sessionId": payload.session_id,
            "step": payload.step,
        }),
    );
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::FfmpegFailed { code, stderr } if *code == -1 => RpcErrorPayload {
            summary: stderr.clone(),
            detail: stderr.clone(),
        },
        AppError::FfmpegFailed { code, stderr } => {
            let parsed = sharp_frames_core::ffmpeg::parse_ffmpeg_error(stderr, Some(*code));
            RpcErrorPayload {
                summary: parsed.summary,
                detail: parsed.detail,
            }
        }
        _ => {
            let text = err.to_string();
            RpcErrorPayload {
                summary: text.clone(),
                detail: text,
            }
        }
    }
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid params payload: {}", e)))
}

fn to_result_value<T: serde::Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::from(format!("Failed to serialize {}: {}", what, e)))
}

/// Methods that decode video run on worker threads so the input loop keeps reading.
fn is_async_request(method: &str) -> bool {
    matches!(method, "session.start" | "session.page" | "session.select")
}

fn dispatch(method: &str, params: Value, writer: &SharedWriter) -> Result<Value, AppError> {
    match method {
        "app.capabilities" => to_result_value(sidecar_api::app_capabilities()?, "app capabilities"),
        "session.start" => {
            let parsed: SessionStartParams = params_from_value(params)?;
            let writer_for_events = Arc::clone(writer);
            let emitter: sidecar_api::SidecarProgressEmitter =
                Arc::new(move |payload| emit_session_progress(&writer_for_events, payload));
            let result = sidecar_api::session_start(
                parsed.session_id,
                parsed.video_path,
                parsed.work_dir,
                parsed.options,
                Some(emitter),
            )?;
            to_result_value(result, "start result")
        }
        "session.page" => {
            let parsed: SessionPageParams = params_from_value(params)?;
            let page = match (parsed.page, parsed.action.as_deref()) {
                (Some(page), _) => page,
                (None, Some(action)) => parse_page_action(action).ok_or_else(|| {
                    AppError::InvalidRequest(format!("Unknown page action: {}", action))
                })?,
                (None, None) => {
                    return Err(AppError::InvalidRequest(
                        "session.page needs page or action".to_string(),
                    ));
                }
            };
            let result = sidecar_api::session_page(&parsed.session_id, page)?;
            to_result_value(result, "page result")
        }
        "session.select" => {
            let parsed: SessionSelectParams = params_from_value(params)?;
            to_result_value(
                sidecar_api::session_select(&parsed.session_id, &parsed.text),
                "select result",
            )
        }
        "session.clear" => {
            let parsed: SessionClearParams = params_from_value(params)?;
            let cleared = sidecar_api::session_clear(&parsed.session_id);
            Ok(json!({ "cleared": cleared }))
        }
        "workdir.create" => {
            let path = sidecar_api::workdir_create()?;
            Ok(json!({ "path": path }))
        }
        "workdir.reap" => {
            let parsed: WorkdirReapParams = if params.is_null() {
                WorkdirReapParams::default()
            } else {
                params_from_value(params)?
            };
            let removed = sidecar_api::workdir_reap(parsed.max_age_secs.map(Duration::from_secs));
            Ok(json!({ "removed": removed }))
        }
        _ => Err(AppError::InvalidRequest(format!("Unknown method: {}", method))),
    }
}

fn handle_request(request: RpcRequest, writer: &SharedWriter) {
    let response = match dispatch(&request.method, request.params, writer) {
        Ok(result) => serde_json::to_value(RpcSuccess {
            id: request.id,
            result,
        })
        .map_err(|e| io::Error::other(format!("serialize success: {}", e))),
        Err(err) => {
            if err.is_fatal() {
                log::error!(
                    target: "sharp_frames::sidecar",
                    "{} (id={}) aborted: {}",
                    request.method,
                    request.id,
                    err
                );
            }
            serde_json::to_value(RpcFailure {
                id: request.id,
                error: parse_error_payload(&err),
            })
            .map_err(|e| io::Error::other(format!("serialize failure: {}", e)))
        }
    };

    match response {
        Ok(value) => {
            let _ = write_json_line_shared(writer, &value);
        }
        Err(err) => {
            let failure = RpcFailure {
                id: request.id,
                error: RpcErrorPayload {
                    summary: "Serialization error".to_string(),
                    detail: err.to_string(),
                },
            };
            let _ = write_json_line_shared(writer, &failure);
        }
    }
}

/// Periodically removes stale working directories until told to stop.
struct Reaper {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: thread::JoinHandle<()>,
}

impl Reaper {
    fn spawn(interval: Duration, max_age: Duration) -> Self {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_for_thread = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let (lock, cvar) = &*stop_for_thread;
            let mut stopped = lock.lock();
            loop {
                let deadline = Instant::now() + interval;
                while !*stopped {
                    if cvar.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                if *stopped {
                    return;
                }
                let removed = sidecar_api::workdir_reap(Some(max_age));
                if !removed.is_empty() {
                    log::info!(
                        target: "sharp_frames::sidecar",
                        "Reaper removed {} working directories",
                        removed.len()
                    );
                }
            }
        });
        Self { stop, handle }
    }

    fn shutdown(self) {
        let (lock, cvar) = &*self.stop;
        *lock.lock() = true;
        cvar.notify_all();
        let _ = self.handle.join();
    }
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let max_age = sidecar_api::configured_max_age();
    sidecar_api::cleanup_startup(max_age);
    let reaper = Reaper::spawn(REAP_INTERVAL, max_age);

    let stdin = io::stdin();
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let mut async_workers: Vec<thread::JoinHandle<()>> = Vec::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid input stream".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid request".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        async_workers.retain(|worker| !worker.is_finished());
        if is_async_request(&request.method) {
            let writer = Arc::clone(&stdout);
            let worker = thread::spawn(move || handle_request(request, &writer));
            async_workers.push(worker);
        } else {
            handle_request(request, &stdout);
        }
    }

    for worker in async_workers {
        let _ = worker.join();
    }

    reaper.shutdown();
    sidecar_api::cleanup_on_exit();
    Ok(())
}
