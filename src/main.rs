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

use std::process::ExitCode;

use clap::Parser;

use thermzone::cli::{self, Cli};
use thermzone::ZoneClient;

fn main() -> ExitCode {
    let args = Cli::parse();

    let client = match &args.socket {
        Some(path) => ZoneClient::connect_to(path),
        None => ZoneClient::connect(),
    };

    let mut client = match client {
        Ok(client) => client,
        Err(e) => {
            eprintln!("tzctl: {}", e);
            return ExitCode::from(2);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli::run(&args.command, &mut client, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tzctl: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
