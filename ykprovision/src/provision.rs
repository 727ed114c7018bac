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
use crate::config::{Paths, Policy, ProbeConfig};
use crate::device::hal::{TokenHal, ToolOutput};
use crate::device::mode::ensure_mode;
use crate::device::probe::probe;
use crate::device::DeviceState;
use crate::error::*;
use crate::pin::exchange::PinExchange;
use crate::pin::pinentry::PinentryRedirection;
use crate::script::{CommandScript, Intent};
use bdrck::cli;
use log::info;
use serde::Serialize;

/// Someone physically present at the token, who can be asked to do things to
/// it.
pub trait Operator {
    /// Ask the operator to unplug the token and plug it back in, blocking
    /// until they have. Returns false if they decline to continue.
    fn confirm_reseat(&self) -> Result<bool>;
}

/// An Operator on the other end of this process's terminal.
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn confirm_reseat(&self) -> Result<bool> {
        // Some tokens won't talk to a fresh agent right after key generation
        // until they've been re-plugged, and there's no way to detect this.
        Ok(cli::continue_confirmation(
            cli::Stream::Stdin,
            cli::Stream::Stderr,
            "Unplug the token and plug it back in, so its new public key can be read. ",
        )?)
    }
}

/// The current and (optional) new PINs for a provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pins {
    pub pin: String,
    pub admin_pin: String,
    pub new_pin: Option<String>,
    pub new_admin_pin: Option<String>,
}

impl Default for Pins {
    fn default() -> Self {
        Pins {
            pin: "123456".to_owned(),
            admin_pin: "12345678".to_owned(),
            new_pin: None,
            new_admin_pin: None,
        }
    }
}

/// Everything the operator asked for in one provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest {
    pub name: String,
    pub email: String,
    pub pins: Pins,
}

/// The outcome of a successful provisioning run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProvisionResult {
    pub name: String,
    pub email: String,
    pub serial: String,
    /// The new PIN, if it was changed.
    pub pin: Option<String>,
    /// The new admin PIN, if it was changed.
    #[serde(rename = "adminpin")]
    pub admin_pin: Option<String>,
    #[serde(rename = "pubkey")]
    pub public_key: String,
}

/// Drives a whole provisioning run against a single token: probe it, get it
/// into CCID mode, optionally change its PINs, generate keys, and read back
/// the resulting public key.
pub struct Provisioner<'a, H: TokenHal, O: Operator> {
    hal: &'a H,
    operator: &'a O,
    policy: Policy,
    probe: ProbeConfig,
    cancel: CancellationToken,
    exchange: PinExchange,
    redirection: PinentryRedirection,
}

impl<'a, H: TokenHal, O: Operator> Provisioner<'a, H, O> {
    pub fn new(
        hal: &'a H,
        operator: &'a O,
        paths: Paths,
        policy: Policy,
        probe: ProbeConfig,
        cancel: CancellationToken,
    ) -> Self {
        Provisioner {
            hal: hal,
            operator: operator,
            policy: policy,
            probe: probe,
            cancel: cancel,
            exchange: PinExchange::new(paths.pin_exchange),
            redirection: PinentryRedirection::new(paths.agent_conf, paths.substitute),
        }
    }

    /// Run one card editor session with the given PINs available to the
    /// pinentry substitute. The redirection is put back, and then the PINs
    /// are removed, whether or not the session succeeds.
    fn run_session(
        &self,
        old_pin: &str,
        new_pin: &str,
        script: &CommandScript,
    ) -> Result<ToolOutput> {
        if self.cancel.is_cancelled() {
            return Err(Error::Aborted);
        }
        let mut staged = self.exchange.stage(old_pin, new_pin)?;
        let mut redirect = self.redirection.activate(self.hal)?;

        let output = self.hal.card_edit(script);

        let restored = redirect.restore();
        let released = staged.release();
        let output = output?;
        restored?;
        released?;
        Ok(output)
    }

    fn change_pin(
        &self,
        state: &DeviceState,
        intent: Intent,
        which: &'static str,
        old_pin: &str,
        new_pin: &str,
    ) -> Result<()> {
        info!("Changing the {}", which);
        let script = CommandScript::build(&state.model, state.configured, &intent)?;
        let output = self.run_session(old_pin, new_pin, &script)?;
        if !output.success() {
            return Err(Error::PinChangeFailed {
                which: which,
                status: output.exit,
            });
        }
        Ok(())
    }

    fn retrieve_public_key(&self) -> Result<String> {
        // An interrupt while the prompt is up doesn't unblock it, so check
        // for one once the operator answers.
        if !self.operator.confirm_reseat()? || self.cancel.is_cancelled() {
            return Err(Error::Aborted);
        }

        let output = self.hal.ssh_public_keys()?;
        if !output.success() {
            return Err(Error::PublicKeyRetrievalFailed(format!(
                "SSH agent query failed ({})",
                output.exit
            )));
        }
        let public_key = output.stdout.trim();
        if public_key.is_empty() {
            return Err(Error::PublicKeyRetrievalFailed(
                "the agent didn't list any keys".to_owned(),
            ));
        }
        Ok(public_key.to_owned())
    }

    pub fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionResult> {
        let state = probe(self.hal, &self.policy)?;

        info!("Checking the token is in the right mode");
        ensure_mode(self.hal, &state, &self.policy, &self.probe, &self.cancel)?;
        if !self.cancel.sleep(self.probe.settle) {
            return Err(Error::Aborted);
        }

        let mut pin = request.pins.pin.as_str();
        let mut admin_pin = request.pins.admin_pin.as_str();
        if let Some(new_pin) = request.pins.new_pin.as_ref() {
            self.change_pin(&state, Intent::ChangePin, "PIN", pin, new_pin)?;
            pin = new_pin.as_str();
        }
        if let Some(new_admin_pin) = request.pins.new_admin_pin.as_ref() {
            self.change_pin(
                &state,
                Intent::ChangeAdminPin,
                "admin PIN",
                admin_pin,
                new_admin_pin,
            )?;
            admin_pin = new_admin_pin.as_str();
        }

        info!("Generating keys");
        let script = CommandScript::build(
            &state.model,
            state.configured,
            &Intent::GenerateKey {
                validity: self.policy.key_validity.clone(),
                name: request.name.clone(),
                email: request.email.clone(),
            },
        )?;
        // Key generation prompts for the admin PIN first, then the user PIN.
        let output = self.run_session(admin_pin, pin, &script)?;
        if !output.success() {
            return Err(Error::CardEditorFailed(output.exit));
        }

        let public_key = self.retrieve_public_key()?;

        Ok(ProvisionResult {
            name: request.name.clone(),
            email: request.email.clone(),
            serial: state.serial,
            pin: request.pins.new_pin.clone(),
            admin_pin: request.pins.new_admin_pin.clone(),
            public_key: public_key,
        })
    }
}
