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

use crate::config::Policy;
use crate::device::hal::TokenHal;
use crate::device::{DeviceState, Model};
use crate::error::*;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

static SERIAL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"serial: *(?P<s>[0-9]+)").unwrap());

static PRODUCT_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"product_id: *(?P<id>[0-9]+)").unwrap());

// Matches lines like:
//
//     Signature key ....: 7ED6 6360 7222 6AFC 61EE  26AE 11F3 2D39 9CB7 1542
//     Encryption key....: 28AF C015 6AB9 0707 D9C3  C23F 5CD2 A26B 7D36 66D6
//     Authentication key: 9655 FFFC C4A0 F4D3 87EB  498B 4DAF B5C4 7DCA AB87
static KEY_FINGERPRINT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:Signature|Encryption|Authentication)\s+key[\s.]*:\s+[0-9A-F]{4}(?:\s+[0-9A-F]{4}){9}",
    )
    .unwrap()
});

/// Extract the serial number from the device info query's output.
pub fn parse_serial(report: &str) -> Option<String> {
    SERIAL_REGEX
        .captures(report)
        .and_then(|c| c.name("s"))
        .map(|s| s.as_str().to_owned())
}

/// Extract the USB product ID from the device info query's output.
/// A value too large to be a product ID is treated the same as a missing one.
pub fn parse_product_id(report: &str) -> Option<u32> {
    PRODUCT_ID_REGEX
        .captures(report)
        .and_then(|c| c.name("id"))
        .and_then(|id| id.as_str().parse().ok())
}

/// Returns true if the given card status output lists at least one key
/// fingerprint in any of the three key roles.
pub fn has_existing_keys(card_status: &str) -> bool {
    KEY_FINGERPRINT_REGEX.is_match(card_status)
}

fn probe_serial<H: TokenHal>(hal: &H) -> Result<String> {
    let report = hal.serial_report()?;
    parse_serial(&report.stdout).ok_or(Error::DeviceNotFound)
}

fn probe_model<H: TokenHal>(hal: &H, policy: &Policy) -> Result<Model> {
    if let Some(model) = policy.forced_model.as_ref() {
        info!("Using forced token model '{}'", model);
        return Ok(model.clone());
    }

    let report = hal.product_report()?;
    let report = report.stdout.trim();
    parse_product_id(report)
        .and_then(Model::from_product_id)
        .ok_or_else(|| Error::AmbiguousModel(report.to_owned()))
}

fn probe_configured<H: TokenHal>(hal: &H) -> Result<bool> {
    let status = hal.card_status()?;
    if !status.success() {
        return Err(Error::StatusQueryFailed(status.exit));
    }
    Ok(has_existing_keys(&status.stdout))
}

/// Find out everything we need to know about the inserted token: its serial
/// number, which model it is, and whether it already holds keys.
pub fn probe<H: TokenHal>(hal: &H, policy: &Policy) -> Result<DeviceState> {
    let serial = probe_serial(hal)?;
    info!("Found token with serial {}", serial);

    let model = probe_model(hal, policy)?;
    info!("Token model is '{}'", model);

    let configured = probe_configured(hal)?;
    info!(
        "Token {} existing keys",
        if configured { "holds" } else { "has no" }
    );

    let mode = hal.mode_report()?.stdout.trim().to_owned();

    Ok(DeviceState {
        serial: serial,
        model: model,
        mode: mode,
        configured: configured,
    })
}
