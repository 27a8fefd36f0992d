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

//! Command-line interface for tzctl

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::client::{WaitOutcome, ZoneApi};

#[derive(Parser, Debug)]
#[command(name = "tzctl")]
#[command(version)]
#[command(about = "Control and query the thermzone daemon")]
#[command(long_about = "tzctl talks to thermzoned over its Unix socket.\n\n\
Readings are in tenths of a kelvin (2940 = 21.85 °C).")]
pub struct Cli {
    /// Daemon socket (defaults to $THERMZONE_SOCKET or the system socket)
    #[arg(short, long, global = true)]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Check that the daemon is answering
    Ping,
    /// Show the daemon version
    Version,
    /// Print the current reading
    Read,
    /// Feed a new reading into the zone
    Set {
        /// Reading in tenths of a kelvin
        value: u32,
    },
    /// Block until the reading leaves [low, high] or the timeout passes
    Wait {
        low: u32,
        high: u32,
        /// Give up after this many milliseconds (omit to wait forever)
        #[arg(short, long)]
        timeout_ms: Option<u32>,
    },
    /// Cancel a pending wait by request id
    Cancel { request_id: u64 },
    /// Turn the camera off (resets the reading)
    CameraOff,
    /// Turn the camera on
    CameraOn,
    /// Show the zone state and pending waits
    Status {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
}

/// Tenths of a kelvin to degrees Celsius
pub fn decikelvin_to_celsius(reading: u32) -> f64 {
    f64::from(reading) / 10.0 - 273.15
}

fn format_reading(reading: u32) -> String {
    format!("{} ({:.2} °C)", reading, decikelvin_to_celsius(reading))
}

fn format_bound(value: u32) -> String {
    if value == u32::MAX {
        "max".to_string()
    } else {
        value.to_string()
    }
}

/// Run one command against `api`, writing human-readable output to `out`
pub fn run(command: &Commands, api: &mut dyn ZoneApi, out: &mut dyn Write) -> Result<()> {
    match command {
        Commands::Ping => {
            let reply = api.ping().context("Ping failed")?;
            writeln!(out, "{}", reply)?;
        }
        Commands::Version => {
            writeln!(out, "{}", api.version()?)?;
        }
        Commands::Read => {
            let reading = api.read_temperature()?;
            writeln!(out, "{}", format_reading(reading))?;
        }
        Commands::Set { value } => {
            api.set_temperature(*value)?;
            writeln!(out, "Reading set to {}", format_reading(*value))?;
        }
        Commands::Wait { low, high, timeout_ms } => {
            if low > high {
                anyhow::bail!("Invalid band: low {} is above high {}", low, high);
            }
            match api.wait_read(*low, *high, *timeout_ms)? {
                WaitOutcome::Reading { value, .. } => writeln!(out, "{}", format_reading(value))?,
                WaitOutcome::Cancelled { request_id } => {
                    writeln!(out, "Wait {} was cancelled", request_id)?
                }
            }
        }
        Commands::Cancel { request_id } => {
            if api.cancel(*request_id)? {
                writeln!(out, "Cancelled {}", request_id)?;
            } else {
                writeln!(out, "Request {} is not pending", request_id)?;
            }
        }
        Commands::CameraOff => {
            api.camera_off()?;
            writeln!(out, "Camera off")?;
        }
        Commands::CameraOn => {
            api.camera_on()?;
            writeln!(out, "Camera on")?;
        }
        Commands::Status { json } => {
            let status = api.status()?;
            if *json {
                writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
            } else {
                writeln!(out, "Reading:   {}", format_reading(status.reading))?;
                writeln!(
                    out,
                    "Band:      [{}, {}]",
                    format_bound(status.band_low),
                    format_bound(status.band_high)
                )?;
                writeln!(out, "Crossings: {}", status.crossings)?;
                writeln!(out, "Pending:   {}", status.pending.len())?;
                for watch in &status.pending {
                    let remaining = match watch.remaining_ms {
                        Some(ms) => format!("{} ms left", ms),
                        None => "no timeout".to_string(),
                    };
                    writeln!(
                        out,
                        "  #{:<6} [{}, {}] {}",
                        watch.request_id,
                        format_bound(watch.low),
                        format_bound(watch.high),
                        remaining
                    )?;
                }
            }
        }
    }
    Ok(())
}
