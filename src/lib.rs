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

//! Thermzone - client side of the simulated thermal zone
//!
//! [`client`] speaks the daemon's line-delimited JSON protocol and
//! [`cli`] is the `tzctl` front end built on it.

pub mod cli;
pub mod client;

pub use client::{socket_path, WaitOutcome, ZoneApi, ZoneClient};
