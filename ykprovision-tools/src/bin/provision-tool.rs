// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};
use ykprovision::cancel::{install_interrupt_handler, CancellationToken};
use ykprovision::config::{KeyValidity, Paths, Policy, ProbeConfig};
use ykprovision::device::hal::ToolHardware;
use ykprovision::device::Model;
use ykprovision::pin::{random_pin, RANDOM_ADMIN_PIN_DIGITS, RANDOM_PIN_DIGITS};
use ykprovision::provision::*;

fn parse_model(s: &str) -> std::result::Result<Model, String> {
    // Any name is accepted here; unsupported ones are rejected later on, with
    // a more useful error.
    Ok(s.parse::<Model>().unwrap_or_else(|e| match e {}))
}

fn parse_validity(s: &str) -> std::result::Result<KeyValidity, String> {
    s.parse().map_err(|e: ykprovision::error::Error| e.to_string())
}

fn print_result(result: &ProvisionResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }

    println!("For name \"{}\", email: {}", result.name, result.email);
    println!("Yubikey serial: {}", result.serial);
    if let Some(pin) = result.pin.as_ref() {
        println!("PIN set to: {}", pin);
    }
    if let Some(admin_pin) = result.admin_pin.as_ref() {
        println!("Admin PIN set to: {}", admin_pin);
    }
    println!("Public key:\n{}", result.public_key);
    Ok(())
}

#[derive(Parser)]
#[command(about = "Generate an OpenPGP key on a YubiKey, and print its SSH public key")]
struct Cli {
    #[arg(short = 'n', long)]
    /// The name to generate the key for.
    name: String,

    #[arg(short = 'e', long)]
    /// The email address for the key.
    email: String,

    #[arg(short = 'j', long)]
    /// Output just the result, as JSON.
    json: bool,

    #[arg(short = 'o', long)]
    /// Overwrite any keys already on the token. When run from a terminal this
    /// asks for confirmation first, unless --yes is also given.
    overwrite: bool,

    #[arg(short = 'y', long)]
    /// Don't ask for confirmation before overwriting existing keys. Without a
    /// terminal on stdin there is nobody to ask, so this is implied.
    yes: bool,

    #[arg(long, default_value = "123456")]
    /// The token's current PIN.
    pin: String,

    #[arg(long, default_value = "12345678")]
    /// The token's current admin PIN.
    adminpin: String,

    #[arg(long, conflicts_with = "randomnewpin")]
    /// Change the PIN to this value.
    newpin: Option<String>,

    #[arg(long)]
    /// Change the PIN to a random 6-digit value.
    randomnewpin: bool,

    #[arg(long, conflicts_with = "randomnewadminpin")]
    /// Change the admin PIN to this value.
    newadminpin: Option<String>,

    #[arg(long)]
    /// Change the admin PIN to a random 10-digit value.
    randomnewadminpin: bool,

    #[arg(short = 'f', long, value_parser = parse_model)]
    /// Override the detected token model (e.g. neo, neo-nano).
    forcecard: Option<Model>,

    #[arg(long, value_parser = parse_validity, default_value = "4y")]
    /// How long the generated key is valid for (0 for no expiry, or e.g. 365, 52w, 4y).
    validity: KeyValidity,

    #[arg(long)]
    /// The pinentry substitute program. Defaults to the one next to this executable.
    substitute: Option<PathBuf>,

    #[arg(long, default_value_t = 30)]
    /// How many times to look for the token before giving up.
    probe_attempts: u32,

    #[arg(long, default_value_t = 2)]
    /// How long to wait between looks for the token, in seconds.
    probe_backoff_secs: u64,

    #[arg(long, default_value_t = 5)]
    /// How long to let the token settle after switching modes, in seconds.
    settle_secs: u64,
}

fn new_pin(fixed: Option<String>, random: bool, digits: u32) -> Result<Option<String>> {
    Ok(match random {
        false => fixed,
        true => Some(random_pin(digits)?.to_string()),
    })
}

fn needs_confirmation(overwrite: bool, yes: bool, interactive: bool) -> bool {
    overwrite && !yes && interactive
}

fn provision(cli: Cli) -> Result<()> {
    use bdrck::cli::AbstractStream;

    if needs_confirmation(cli.overwrite, cli.yes, bdrck::cli::Stream::Stdin.isatty()) {
        // This is a very destructive operation; confirm with the user first before
        // proceeding.
        if !bdrck::cli::continue_confirmation(
            bdrck::cli::Stream::Stdin,
            bdrck::cli::Stream::Stderr,
            "This will destroy any keys already on the token. ",
        )? {
            return Err(ykprovision::error::Error::Aborted.into());
        }
    }

    let cancel = CancellationToken::new();
    install_interrupt_handler(&cancel)?;

    let mut paths = Paths::for_current_user()?;
    if let Some(substitute) = cli.substitute {
        paths = paths.with_substitute(substitute);
    }

    let pins = Pins {
        pin: cli.pin,
        admin_pin: cli.adminpin,
        new_pin: new_pin(cli.newpin, cli.randomnewpin, RANDOM_PIN_DIGITS)?,
        new_admin_pin: new_pin(
            cli.newadminpin,
            cli.randomnewadminpin,
            RANDOM_ADMIN_PIN_DIGITS,
        )?,
    };
    info!(
        "Changing PIN: {}, changing admin PIN: {}",
        pins.new_pin.is_some(),
        pins.new_admin_pin.is_some()
    );

    let policy = Policy {
        overwrite: cli.overwrite,
        key_validity: cli.validity,
        forced_model: cli.forcecard,
    };
    let probe = ProbeConfig {
        backoff: Duration::from_secs(cli.probe_backoff_secs),
        max_attempts: cli.probe_attempts,
        settle: Duration::from_secs(cli.settle_secs),
    };

    let hal = ToolHardware::default();
    let operator = TerminalOperator;
    let result = Provisioner::new(&hal, &operator, paths, policy, probe, cancel).provision(
        &ProvisionRequest {
            name: cli.name,
            email: cli.email,
            pins: pins,
        },
    )?;

    print_result(&result, cli.json)
}

fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<ykprovision::error::Error>()
        .map(|e| e.exit_code())
        .unwrap_or(1)
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(
                    if cfg!(debug_assertions) {
                        LevelFilter::DEBUG
                    } else {
                        LevelFilter::WARN
                    }
                    .into(),
                )
                .from_env()
                .unwrap(),
        )
        .init();

    if let Err(e) = provision(Cli::parse()) {
        eprintln!("error: {}", e);
        std::process::exit(exit_code(&e));
    }
}
