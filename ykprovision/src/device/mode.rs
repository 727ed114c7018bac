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

use crate::cancel::CancellationToken;
use crate::config::{Policy, ProbeConfig};
use crate::device::hal::TokenHal;
use crate::device::{DeviceState, Model};
use crate::error::*;
use log::{info, warn};

/// The marker the mode query prints when no token is plugged in.
const DEVICE_ABSENT_MARKER: &str = "No device found";

/// What a single mode probe told us.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ModeProbe {
    /// No token is plugged in (or it's still re-enumerating).
    Absent,
    /// The token is already in the mode we want.
    Correct,
    /// The token is in some other mode; the report is included.
    Incorrect(String),
}

/// Interpret the output of a mode query for the given model. A model with no
/// CCID mode is never in the correct mode.
pub fn classify(report: &str, model: &Model) -> ModeProbe {
    if report.contains(DEVICE_ABSENT_MARKER) {
        return ModeProbe::Absent;
    }
    match model.ccid_mode() {
        Some(mode) if report.contains(mode) => ModeProbe::Correct,
        _ => ModeProbe::Incorrect(report.trim().to_owned()),
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum State {
    Probing { attempt: u32 },
    NeedsChange { current: String },
    Done,
}

/// Make sure the token is in a CCID-capable mode, switching it over if
/// necessary (and if the policy allows it).
///
/// While the token is absent, we wait `probe.backoff` between probes, for at
/// most `probe.max_attempts` probes in total. Cancelling the given token stops
/// the wait early; both cases fail with `DeviceNeverAppeared`.
pub fn ensure_mode<H: TokenHal>(
    hal: &H,
    state: &DeviceState,
    policy: &Policy,
    probe: &ProbeConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut current = State::Probing { attempt: 0 };
    loop {
        current = match current {
            State::Probing { attempt } => {
                if cancel.is_cancelled() || attempt >= probe.max_attempts {
                    return Err(Error::DeviceNeverAppeared(attempt));
                }

                let report = hal.mode_report()?;
                match classify(&report.stdout, &state.model) {
                    ModeProbe::Absent => {
                        warn!("No token found; unplug it and plug it back in");
                        let attempt = attempt + 1;
                        if attempt < probe.max_attempts && !cancel.sleep(probe.backoff) {
                            return Err(Error::DeviceNeverAppeared(attempt));
                        }
                        State::Probing { attempt: attempt }
                    }
                    ModeProbe::Correct => {
                        info!("Token is already in CCID mode");
                        State::Done
                    }
                    ModeProbe::Incorrect(mode) => State::NeedsChange { current: mode },
                }
            }
            State::NeedsChange { current } => {
                info!("Token mode is currently: {}", current);
                let mode = state
                    .model
                    .ccid_mode()
                    .ok_or_else(|| Error::UnsupportedModel(state.model.to_string()))?;
                if state.configured && !policy.overwrite {
                    return Err(Error::ModeSetRefused);
                }

                info!("Switching token into CCID mode {}", mode);
                let output = hal.set_mode(mode)?;
                if !output.success() {
                    return Err(Error::ModeSetFailed(output.exit));
                }
                State::Done
            }
            State::Done => return Ok(()),
        };
    }
}
