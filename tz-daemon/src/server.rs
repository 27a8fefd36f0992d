//! Unix Socket Server
//!
//! Async JSON-lines server exposing one simulated zone.
//!
//! # Limits
//! - **Connections**: maximum concurrent connections enforced
//! - **Rate limiting**: per-client (UID) request window
//! - **Timeouts**: idle read and write timeouts; a parked `WaitRead` is
//!   bounded only by its own zone timeout
//! - **Message size**: bounded line reader, oversized input closes the connection
//!
//! # Audit
//! Peer credentials (UID/GID/PID) are logged for every state-changing request.

use std::collections::HashMap;
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use tz_core::{Admission, Completion, RequestId, ThermalZone, Timeout, WatchSpec};
use tz_error::ThermalError;
use tz_protocol::{
    PendingWatch, Request, RequestEnvelope, Response, ResponseData, ResponseEnvelope, ZoneStatus,
};

use crate::mailbox::CompletionMailbox;

// ============================================================================
// Constants
// ============================================================================

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 64;

/// Maximum message size in bytes
const MAX_MESSAGE_SIZE: usize = tz_protocol::MAX_MESSAGE_SIZE;

/// Idle read timeout per message
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per message
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum requests per client per window
const RATE_LIMIT_REQUESTS: u32 = 1500;

/// Rate limit window duration
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);

/// Input a client may send ahead while one of its waits is parked
const MAX_PIPELINED: usize = MAX_MESSAGE_SIZE * 4;

/// Socket permissions (owner and group read/write)
const SOCKET_MODE: u32 = 0o660;

/// Global connection counter
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Everything a connection handler needs
#[derive(Clone)]
pub struct ServerContext {
    pub zone: Arc<ThermalZone>,
    pub mailbox: Arc<CompletionMailbox>,
}

async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    out.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(0);
        }

        let (take_len, found_newline) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        let remaining = max_len.saturating_sub(out.len());
        if take_len > remaining {
            let consume_len = remaining.min(available.len());
            reader.consume(consume_len);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

// ============================================================================
// Rate Limiting
// ============================================================================

struct ClientState {
    request_count: u32,
    window_start: Instant,
}

/// Rate limiter state per client (keyed by UID)
struct RateLimiter {
    clients: HashMap<u32, ClientState>,
    max_requests: u32,
}

impl RateLimiter {
    fn new(max_requests: u32) -> Self {
        Self {
            clients: HashMap::new(),
            max_requests,
        }
    }

    /// Returns true if the request is allowed
    fn check_and_increment(&mut self, uid: u32) -> bool {
        let now = Instant::now();

        let state = self.clients.entry(uid).or_insert(ClientState {
            request_count: 0,
            window_start: now,
        });

        if now.duration_since(state.window_start) > RATE_LIMIT_WINDOW {
            state.request_count = 0;
            state.window_start = now;
        }

        if state.request_count >= self.max_requests {
            return false;
        }

        state.request_count += 1;
        true
    }

    fn cleanup(&mut self) {
        let now = Instant::now();
        self.clients
            .retain(|_, state| now.duration_since(state.window_start) < RATE_LIMIT_WINDOW * 2);
    }
}

// ============================================================================
// Server
// ============================================================================

/// Serve `ctx` on `socket_path` until `shutdown` resolves
pub async fn run_server<F>(socket_path: &str, ctx: ServerContext, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let path = Path::new(socket_path);

    // Remove a stale socket, but never follow a symlink
    if let Ok(metadata) = path.symlink_metadata() {
        if metadata.file_type().is_symlink() {
            bail!("Socket path is a symlink - refusing");
        }
        std::fs::remove_file(path).with_context(|| format!("Failed to remove stale socket {}", socket_path))?;
        debug!("Removed existing socket file");
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path))?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))
        .with_context(|| format!("Failed to set permissions on {}", socket_path))?;

    info!("Listening on {} (mode {:o})", socket_path, SOCKET_MODE);
    info!(
        "Limits: max_conn={}, max_msg={}, rate_limit={}/{:?}",
        MAX_CONNECTIONS, MAX_MESSAGE_SIZE, RATE_LIMIT_REQUESTS, RATE_LIMIT_WINDOW
    );

    let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(RATE_LIMIT_REQUESTS)));

    let rate_limiter_cleanup = rate_limiter.clone();
    let cleanup_task = tokio::spawn(async move {
        loop {
            tokio::time::sleep(RATE_LIMIT_WINDOW).await;
            rate_limiter_cleanup.lock().await.cleanup();
        }
    });

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let current = ACTIVE_CONNECTIONS.load(Ordering::SeqCst);
                        if current >= MAX_CONNECTIONS {
                            warn!("Connection limit reached ({}), rejecting new connection", current);
                            drop(stream);
                            continue;
                        }

                        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                        let rate_limiter = rate_limiter.clone();
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            handle_client(stream, rate_limiter, ctx).await;
                            ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    cleanup_task.abort();
    let _ = std::fs::remove_file(socket_path);
    info!(
        "Server stopped ({} connections still open)",
        ACTIVE_CONNECTIONS.load(Ordering::SeqCst)
    );

    Ok(())
}

/// Client credentials from Unix socket peer
#[derive(Debug, Clone, Copy)]
struct PeerCredentials {
    uid: u32,
    gid: u32,
    pid: i32,
}

/// What a request turned into
enum Reply {
    Now(ResponseEnvelope),
    /// A queued wait; answer once its completion arrives
    Park {
        envelope_id: u64,
        request_id: RequestId,
        completion: oneshot::Receiver<Completion>,
    },
}

/// Handle a single client connection
async fn handle_client(stream: UnixStream, rate_limiter: Arc<Mutex<RateLimiter>>, ctx: ServerContext) {
    let cred = match get_peer_credentials(&stream) {
        Some(c) => c,
        None => {
            error!("Failed to get peer credentials, rejecting connection");
            return;
        }
    };

    debug!("Connection from uid={}, gid={}, pid={}", cred.uid, cred.gid, cred.pid);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(MAX_MESSAGE_SIZE);
    // Input drained from the socket while a wait was parked; read before the socket
    let mut backlog: Vec<u8> = Vec::new();
    let mut request_count: u64 = 0;
    let connection_start = Instant::now();

    loop {
        let (read_result, unread) = {
            let mut source = backlog.as_slice().chain(&mut reader);
            let result = timeout(READ_TIMEOUT, read_line_bounded(&mut source, &mut line, MAX_MESSAGE_SIZE)).await;
            (result, source.into_inner().0.len())
        };
        let consumed = backlog.len() - unread;
        backlog.drain(..consumed);

        match read_result {
            Ok(Ok(0)) => {
                debug!(
                    "Client disconnected: uid={}, pid={}, requests={}, duration={:?}",
                    cred.uid, cred.pid, request_count, connection_start.elapsed()
                );
                break;
            }
            Ok(Ok(n)) => {
                {
                    let mut limiter = rate_limiter.lock().await;
                    if !limiter.check_and_increment(cred.uid) {
                        warn!("Rate limit exceeded for uid={}, pid={}", cred.uid, cred.pid);
                        let envelope = ResponseEnvelope::new(0, Response::error("Rate limit exceeded"));
                        let _ = send_response(&mut writer, &envelope).await;
                        continue;
                    }
                }

                request_count += 1;
                trace!("Request #{} from uid={}: {} bytes", request_count, cred.uid, n);

                let line_str = match std::str::from_utf8(&line) {
                    Ok(s) => s,
                    Err(e) => {
                        debug!("Non-UTF8 request from uid={}: {}", cred.uid, e);
                        let envelope = ResponseEnvelope::new(0, Response::error("Invalid request encoding"));
                        let _ = send_response(&mut writer, &envelope).await;
                        break;
                    }
                };

                let envelope = match process_request(line_str, &cred, &ctx) {
                    Reply::Now(envelope) => envelope,
                    Reply::Park { envelope_id, request_id, completion } => {
                        match await_completion(&ctx, request_id, completion, &mut reader, &mut backlog).await {
                            Some(completion) => {
                                ResponseEnvelope::new(envelope_id, completion_response(request_id, completion))
                            }
                            None => {
                                debug!("Client uid={} left while {} was pending", cred.uid, request_id);
                                break;
                            }
                        }
                    }
                };

                if send_response(&mut writer, &envelope).await.is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    warn!(
                        "Message too large (>{} bytes) from uid={}, pid={}",
                        MAX_MESSAGE_SIZE, cred.uid, cred.pid
                    );
                    let envelope = ResponseEnvelope::new(0, Response::error("Message too large"));
                    let _ = send_response(&mut writer, &envelope).await;
                } else {
                    error!("Read error from uid={}, pid={}: {}", cred.uid, cred.pid, e);
                }
                break;
            }
            Err(_) => {
                debug!("Read timeout for uid={}, pid={}", cred.uid, cred.pid);
                break;
            }
        }
    }
}

/// Wait for a parked request's outcome, cancelling it if the client hangs up.
///
/// Pipelined input is moved into `backlog` so the socket stays watched for
/// EOF. Returns `None` when the connection is gone or sent too much ahead.
async fn await_completion(
    ctx: &ServerContext,
    id: RequestId,
    mut completion: oneshot::Receiver<Completion>,
    reader: &mut BufReader<OwnedReadHalf>,
    backlog: &mut Vec<u8>,
) -> Option<Completion> {
    loop {
        tokio::select! {
            result = &mut completion => {
                return result.ok();
            }
            available = async { reader.fill_buf().await.map(|buf| buf.len()) } => {
                match available {
                    Ok(n) if n > 0 && backlog.len() + n <= MAX_PIPELINED => {
                        backlog.extend_from_slice(reader.buffer());
                        reader.consume(n);
                        trace!("Buffered {} pipelined bytes while {} is parked", n, id);
                    }
                    Ok(n) => {
                        if n > 0 {
                            warn!("Too much pipelined input while {} is parked, dropping client", id);
                        }
                        if ctx.zone.cancel(id).is_ok() {
                            info!("Cancelled {} after client disconnect", id);
                        }
                        return None;
                    }
                    Err(e) => {
                        debug!("Read error while {} is parked: {}", id, e);
                        if ctx.zone.cancel(id).is_ok() {
                            info!("Cancelled {} after client disconnect", id);
                        }
                        return None;
                    }
                }
            }
        }
    }
}

/// Send response with timeout
async fn send_response(writer: &mut OwnedWriteHalf, envelope: &ResponseEnvelope) -> Result<(), ()> {
    let response_json = serde_json::to_string(envelope).unwrap_or_else(|_| {
        r#"{"id":0,"status":"error","message":"Serialization error"}"#.to_string()
    });

    let write_result = timeout(WRITE_TIMEOUT, async {
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok::<_, std::io::Error>(())
    })
    .await;

    match write_result {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => {
            debug!("Write error: {}", e);
            Err(())
        }
        Err(_) => {
            warn!("Write timeout");
            Err(())
        }
    }
}

/// Get peer credentials (uid, gid, pid) from Unix socket
#[cfg(target_os = "linux")]
fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();
    // SAFETY: ucred is a plain C struct; zeroed is a valid value.
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: fd is a live socket owned by `stream`, and cred/len describe
    // a correctly sized buffer.
    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    if result != 0 {
        return None;
    }
    Some(PeerCredentials {
        uid: cred.uid,
        gid: cred.gid,
        pid: cred.pid,
    })
}

/// Get peer credentials from Unix socket (no PID off Linux)
#[cfg(not(target_os = "linux"))]
fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    stream.peer_cred().ok().map(|c| PeerCredentials {
        uid: c.uid(),
        gid: c.gid(),
        pid: c.pid().unwrap_or(0),
    })
}

// ============================================================================
// Request Processing
// ============================================================================

/// Process a single request line with audit logging
fn process_request(line: &str, cred: &PeerCredentials, ctx: &ServerContext) -> Reply {
    let envelope: RequestEnvelope = match serde_json::from_str(line.trim()) {
        Ok(e) => e,
        Err(e) => {
            debug!("Invalid JSON from uid={}: {}", cred.uid, e);
            return Reply::Now(ResponseEnvelope::new(0, Response::error("Invalid request format")));
        }
    };

    let envelope_id = envelope.id;
    let request = envelope.request;

    // Validate server-side as well; clients are not trusted to have done it.
    if let Err(e) = request.validate() {
        warn!("Request validation failed from uid={}: {}", cred.uid, e);
        return Reply::Now(ResponseEnvelope::new(envelope_id, Response::error(e)));
    }

    let request_type = request.type_name();
    debug!("Processing {} (id={}) from uid={}, pid={}", request_type, envelope_id, cred.uid, cred.pid);

    let response = match request {
        Request::Ping => Response::ok_string("pong"),

        Request::Version => Response::ok_string(env!("CARGO_PKG_VERSION")),

        Request::ReadTemperature => Response::ok_temp(ctx.zone.read_temperature()),

        Request::SetTemperature { value } => {
            info!("AUDIT: SetTemperature value={} by uid={}, pid={}", value, cred.uid, cred.pid);
            ctx.zone.on_temperature_changed(value);
            Response::ok()
        }

        Request::WaitRead { low, high, timeout_ms, output_len } => {
            let spec = WatchSpec::new(low, high, Timeout::from(timeout_ms))
                .with_output_len(output_len as usize);

            match ctx.zone.submit(spec) {
                Admission::Immediate(reading) => Response::Ok(ResponseData::wait_reading(reading, None)),
                Admission::Queued(request_id) => {
                    debug!("WaitRead [{}, {}] queued as {} for uid={}", low, high, request_id, cred.uid);
                    return Reply::Park {
                        envelope_id,
                        request_id,
                        completion: ctx.mailbox.register(request_id),
                    };
                }
                Admission::Rejected(kind) => Response::error(format!("WaitRead rejected: {}", kind)),
            }
        }

        Request::Cancel { request_id } => {
            info!("AUDIT: Cancel request={} by uid={}, pid={}", request_id, cred.uid, cred.pid);
            match ctx.zone.cancel(RequestId::new(request_id)) {
                Ok(()) => Response::Ok(ResponseData::cancel_result(true)),
                Err(ThermalError::RequestNotFound(_)) => Response::Ok(ResponseData::cancel_result(false)),
                Err(e) => Response::error(e.to_string()),
            }
        }

        Request::CameraOff => {
            info!("AUDIT: CameraOff by uid={}, pid={}", cred.uid, cred.pid);
            ctx.zone.camera_off();
            Response::ok()
        }

        Request::CameraOn => {
            info!("AUDIT: CameraOn by uid={}, pid={}", cred.uid, cred.pid);
            ctx.zone.camera_on();
            Response::ok()
        }

        Request::Status => Response::Ok(ResponseData::status(zone_status(ctx))),
    };

    if let Response::Error { ref message } = response {
        warn!("Request {} (id={}) failed for uid={}: {}", request_type, envelope_id, cred.uid, message);
    }

    Reply::Now(ResponseEnvelope::new(envelope_id, response))
}

fn completion_response(id: RequestId, completion: Completion) -> Response {
    match completion {
        Completion::Reading(reading) => Response::Ok(ResponseData::wait_reading(reading, Some(id.get()))),
        Completion::Cancelled => Response::Ok(ResponseData::wait_cancelled(id.get())),
        Completion::Failed(kind) => Response::error(format!("WaitRead failed: {}", kind)),
    }
}

fn zone_status(ctx: &ServerContext) -> ZoneStatus {
    let snapshot = ctx.zone.snapshot();
    ZoneStatus {
        reading: snapshot.reading,
        band_low: snapshot.band.low,
        band_high: snapshot.band.high,
        crossings: ctx.mailbox.crossings(),
        pending: snapshot
            .pending
            .into_iter()
            .map(|p| PendingWatch {
                request_id: p.id.get(),
                low: p.low,
                high: p.high,
                remaining_ms: p.remaining_ms,
            })
            .collect(),
    }
}
