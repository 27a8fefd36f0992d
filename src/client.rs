/*
 * This file is part of Thermzone.
 *
 * Copyright (C) 2025 Thermzone contributors
 *
 * Thermzone is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Thermzone is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Thermzone. If not, see <https://www.gnu.org/licenses/>.
 */

//! Zone Client
//!
//! Talks to the thermzoned daemon over its Unix socket, one JSON line per
//! request and per response.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tz_error::{Result, ThermalError};
use tz_protocol::{Request, RequestEnvelope, Response, ResponseData, ResponseEnvelope, ZoneStatus};

const TIMEOUT_MS: u64 = 5000;

/// Slack added on top of a wait's own timeout before the client gives up
const WAIT_GRACE_MS: u64 = 2000;

const MAX_MESSAGE_SIZE: usize = tz_protocol::MAX_MESSAGE_SIZE;

/// Initial buffer size for responses
const INITIAL_BUFFER_SIZE: usize = 512;

/// Socket the client connects to: `THERMZONE_SOCKET`, else the daemon default
pub fn socket_path() -> PathBuf {
    match std::env::var(tz_core::constants::paths::SOCKET_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(tz_core::constants::paths::default_socket_path()),
    }
}

/// Outcome of a `WaitRead`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Resolved with a reading; `request_id` is set when the wait was queued
    Reading { value: u32, request_id: Option<u64> },
    Cancelled { request_id: u64 },
}

/// Operations a zone client offers
#[cfg_attr(test, mockall::automock)]
pub trait ZoneApi {
    fn ping(&mut self) -> Result<String>;
    fn version(&mut self) -> Result<String>;
    fn read_temperature(&mut self) -> Result<u32>;
    fn set_temperature(&mut self, value: u32) -> Result<()>;
    fn wait_read(&mut self, low: u32, high: u32, timeout_ms: Option<u32>) -> Result<WaitOutcome>;
    /// Returns `false` if the request was no longer pending
    fn cancel(&mut self, request_id: u64) -> Result<bool>;
    fn camera_off(&mut self) -> Result<()>;
    fn camera_on(&mut self) -> Result<()>;
    fn status(&mut self) -> Result<ZoneStatus>;
}

/// Blocking connection to the daemon
pub struct ZoneClient {
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl ZoneClient {
    /// Connect to the socket from [`socket_path`]
    pub fn connect() -> Result<Self> {
        Self::connect_to(&socket_path())
    }

    /// Connect to an explicit socket
    pub fn connect_to(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ThermalError::DaemonNotAvailable);
        }

        let stream = UnixStream::connect(path).map_err(|e| {
            ThermalError::DaemonConnection(format!("Failed to connect to {}: {}", path.display(), e))
        })?;

        let reader_stream = stream.try_clone().map_err(|e| {
            ThermalError::DaemonConnection(format!("Failed to clone socket for reader: {}", e))
        })?;

        stream.set_write_timeout(Some(Duration::from_millis(TIMEOUT_MS)))?;
        reader_stream.set_read_timeout(Some(Duration::from_millis(TIMEOUT_MS)))?;

        Ok(Self {
            writer: stream,
            reader: BufReader::new(reader_stream),
        })
    }

    /// Send a request and return the daemon's response
    pub fn request(&mut self, req: Request) -> Result<Response> {
        req.validate()
            .map_err(|e| ThermalError::DaemonRequest(format!("Request validation failed: {}", e)))?;

        let read_timeout = Self::read_timeout_for(&req);
        self.reader.get_ref().set_read_timeout(read_timeout)?;

        let envelope = RequestEnvelope::new(req);
        let request_id = envelope.id;

        let mut json = serde_json::to_vec(&envelope)?;
        json.push(b'\n');

        if json.len() > MAX_MESSAGE_SIZE {
            return Err(ThermalError::MessageTooLarge {
                size: json.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        self.writer
            .write_all(&json)
            .map_err(|e| ThermalError::DaemonConnection(format!("Failed to send request: {}", e)))?;

        let mut response_buf: Vec<u8> = Vec::with_capacity(INITIAL_BUFFER_SIZE);
        let limit = (MAX_MESSAGE_SIZE + 1) as u64;
        std::io::Read::take(&mut self.reader, limit)
            .read_until(b'\n', &mut response_buf)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                    ThermalError::Timeout(format!("No response to {} within {:?}", envelope.request.type_name(), read_timeout))
                }
                _ => ThermalError::DaemonConnection(format!("Failed to read response: {}", e)),
            })?;

        if response_buf.is_empty() {
            return Err(ThermalError::DaemonConnection("Daemon closed connection".to_string()));
        }

        if response_buf.len() > MAX_MESSAGE_SIZE {
            return Err(ThermalError::MessageTooLarge {
                size: response_buf.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        if response_buf.last() == Some(&b'\n') {
            response_buf.pop();
        }

        let response_envelope: ResponseEnvelope = serde_json::from_slice(&response_buf)
            .map_err(|e| ThermalError::IpcProtocol(format!("Failed to parse response: {}", e)))?;

        if response_envelope.id != request_id {
            return Err(ThermalError::IpcProtocol(format!(
                "Response ID mismatch: expected {}, got {}",
                request_id, response_envelope.id
            )));
        }

        Self::verify_response_type(&envelope.request, &response_envelope.response)?;

        Ok(response_envelope.response)
    }

    /// A wait may legitimately outlast the normal read timeout
    fn read_timeout_for(req: &Request) -> Option<Duration> {
        match req {
            Request::WaitRead { timeout_ms, .. } => match timeout_ms {
                None => None,
                Some(ms) if *ms == tz_protocol::INFINITE_TIMEOUT_MS => None,
                Some(ms) => Some(Duration::from_millis(u64::from(*ms) + WAIT_GRACE_MS)),
            },
            _ => Some(Duration::from_millis(TIMEOUT_MS)),
        }
    }

    /// Verify that response type matches the request
    fn verify_response_type(req: &Request, resp: &Response) -> Result<()> {
        let Response::Ok(data) = resp else {
            return Ok(());
        };

        let valid = match req {
            Request::Ping | Request::Version => data.value.is_some(),
            Request::ReadTemperature => data.reading.is_some(),
            Request::WaitRead { .. } => data.reading.is_some() || data.cancelled == Some(true),
            Request::Cancel { .. } => data.cancelled.is_some(),
            Request::Status => data.zone.is_some(),
            _ => true,
        };

        if !valid {
            return Err(ThermalError::IpcProtocol(format!(
                "Response type mismatch: got {:?} for request {}",
                data,
                req.type_name()
            )));
        }
        Ok(())
    }

    /// Send `req` and unwrap an `ok` payload
    fn expect_ok(&mut self, req: Request) -> Result<ResponseData> {
        match self.request(req)? {
            Response::Ok(data) => Ok(data),
            Response::Error { message } => Err(ThermalError::DaemonRequest(message)),
        }
    }
}

fn missing(field: &str) -> ThermalError {
    ThermalError::IpcProtocol(format!("Response missing {}", field))
}

impl ZoneApi for ZoneClient {
    fn ping(&mut self) -> Result<String> {
        self.expect_ok(Request::Ping)?.value.ok_or_else(|| missing("value"))
    }

    fn version(&mut self) -> Result<String> {
        self.expect_ok(Request::Version)?.value.ok_or_else(|| missing("value"))
    }

    fn read_temperature(&mut self) -> Result<u32> {
        self.expect_ok(Request::ReadTemperature)?
            .reading
            .ok_or_else(|| missing("reading"))
    }

    fn set_temperature(&mut self, value: u32) -> Result<()> {
        self.expect_ok(Request::SetTemperature { value }).map(|_| ())
    }

    fn wait_read(&mut self, low: u32, high: u32, timeout_ms: Option<u32>) -> Result<WaitOutcome> {
        let data = self.expect_ok(Request::WaitRead {
            low,
            high,
            timeout_ms,
            output_len: tz_protocol::DEFAULT_OUTPUT_LEN,
        })?;

        match (data.cancelled, data.reading, data.request_id) {
            (Some(true), _, Some(request_id)) => Ok(WaitOutcome::Cancelled { request_id }),
            (_, Some(value), request_id) => Ok(WaitOutcome::Reading { value, request_id }),
            _ => Err(missing("reading")),
        }
    }

    fn cancel(&mut self, request_id: u64) -> Result<bool> {
        self.expect_ok(Request::Cancel { request_id })?
            .cancelled
            .ok_or_else(|| missing("cancelled"))
    }

    fn camera_off(&mut self) -> Result<()> {
        self.expect_ok(Request::CameraOff).map(|_| ())
    }

    fn camera_on(&mut self) -> Result<()> {
        self.expect_ok(Request::CameraOn).map(|_| ())
    }

    fn status(&mut self) -> Result<ZoneStatus> {
        self.expect_ok(Request::Status)?.zone.ok_or_else(|| missing("zone"))
    }
}
