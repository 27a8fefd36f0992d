use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum message size for IPC (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Output capacity a `WaitRead` declares when the caller does not say
pub const DEFAULT_OUTPUT_LEN: u32 = 4;

/// Largest output capacity a `WaitRead` may declare
const MAX_OUTPUT_LEN: u32 = 4096;

/// Timeout value meaning "wait forever"
pub const INFINITE_TIMEOUT_MS: u32 = u32::MAX;

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

fn default_output_len() -> u32 {
    DEFAULT_OUTPUT_LEN
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    ReadTemperature,
    /// Feed a new simulated reading into the zone
    SetTemperature { value: u32 },
    /// Block until the reading leaves `[low, high]` or the timeout passes
    WaitRead {
        low: u32,
        high: u32,
        /// `None` or [`INFINITE_TIMEOUT_MS`] waits forever
        #[serde(default)]
        timeout_ms: Option<u32>,
        /// Bytes the caller can receive the reading into
        #[serde(default = "default_output_len")]
        output_len: u32,
    },
    /// Cancel a pending wait by the id reported in `Status`
    Cancel { request_id: u64 },
    CameraOff,
    CameraOn,
    Status,
}

impl Request {
    /// Validate request parameters before sending to daemon
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Ping
            | Request::Version
            | Request::ReadTemperature
            | Request::CameraOff
            | Request::CameraOn
            | Request::Status => Ok(()),

            Request::SetTemperature { .. } => Ok(()),

            Request::WaitRead {
                low,
                high,
                timeout_ms: _,
                output_len,
            } => {
                validate_band(*low, *high)?;
                validate_output_len(*output_len)?;
                Ok(())
            }

            Request::Cancel { request_id } => validate_request_id(*request_id).map_err(String::from),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::ReadTemperature => "ReadTemperature",
            Request::SetTemperature { .. } => "SetTemperature",
            Request::WaitRead { .. } => "WaitRead",
            Request::Cancel { .. } => "Cancel",
            Request::CameraOff => "CameraOff",
            Request::CameraOn => "CameraOn",
            Request::Status => "Status",
        }
    }

    /// Whether the daemon may hold the connection open until a zone event
    pub fn may_block(&self) -> bool {
        matches!(self, Request::WaitRead { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response payload; unset fields are omitted on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Temperature in tenths of a kelvin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<u32>,
    /// Zone-side id of a wait that had to be queued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// Set on a `Cancel` reply, and on a `WaitRead` reply retired by cancellation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<ZoneStatus>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: String) -> Self { Self { value: Some(v), ..Self::default() } }
    pub fn temperature(r: u32) -> Self { Self { reading: Some(r), ..Self::default() } }
    pub fn status(z: ZoneStatus) -> Self { Self { zone: Some(z), ..Self::default() } }

    /// Reply to a wait that resolved with a reading
    pub fn wait_reading(reading: u32, request_id: Option<u64>) -> Self {
        Self {
            reading: Some(reading),
            request_id,
            ..Self::default()
        }
    }

    /// Reply to a wait that was cancelled before it resolved
    pub fn wait_cancelled(request_id: u64) -> Self {
        Self {
            request_id: Some(request_id),
            cancelled: Some(true),
            ..Self::default()
        }
    }

    /// Reply to a `Cancel`; `false` when the request was no longer pending
    pub fn cancel_result(cancelled: bool) -> Self {
        Self {
            cancelled: Some(cancelled),
            ..Self::default()
        }
    }
}

/// Zone state as reported by `Status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub reading: u32,
    pub band_low: u32,
    pub band_high: u32,
    /// Band-crossed signals raised since the daemon started
    #[serde(default)]
    pub crossings: u64,
    pub pending: Vec<PendingWatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWatch {
    pub request_id: u64,
    pub low: u32,
    pub high: u32,
    /// `None` when the wait never expires
    pub remaining_ms: Option<u64>,
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn ok_temp(r: u32) -> Self {
        Response::Ok(ResponseData::temperature(r))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { message: msg.into() }
    }
}

pub fn validate_band(low: u32, high: u32) -> Result<(), String> {
    if low > high {
        return Err(format!("Invalid band: low {} exceeds high {}", low, high));
    }
    Ok(())
}

pub fn validate_output_len(len: u32) -> Result<(), &'static str> {
    if len > MAX_OUTPUT_LEN {
        return Err("Output length exceeds maximum (4096)");
    }
    Ok(())
}

pub fn validate_request_id(id: u64) -> Result<(), &'static str> {
    if id == 0 {
        return Err("Request id must be non-zero");
    }
    Ok(())
}
