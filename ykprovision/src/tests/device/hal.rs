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

use crate::device::hal::*;
use crate::error::*;
use crate::pin::exchange::PinExchangeRequest;
use crate::script::CommandScript;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

pub fn ok(stdout: &str) -> ToolOutput {
    ToolOutput {
        exit: ExitSignal(Some(0)),
        stdout: stdout.to_owned(),
    }
}

pub fn failed(code: i32) -> ToolOutput {
    ToolOutput {
        exit: ExitSignal(Some(code)),
        stdout: String::new(),
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Serial,
    Product,
    CardStatus,
    ModeReport,
    SetMode(String),
    CardEdit,
    ReloadAgent,
    SshKeys,
}

/// What the outside world looked like while one card editor session ran.
#[derive(Clone, Debug)]
pub struct Session {
    pub script: CommandScript,
    pub pins: Option<PinExchangeRequest>,
    pub agent_conf: Option<String>,
}

pub struct TokenTestStub {
    pub serial: ToolOutput,
    pub product: ToolOutput,
    pub status: ToolOutput,
    pub set_mode_result: ToolOutput,
    pub ssh_keys: ToolOutput,
    /// Returned by mode_report once the queued reports run out.
    pub default_mode: ToolOutput,
    pub mode_reports: Mutex<VecDeque<ToolOutput>>,
    pub card_edit_results: Mutex<VecDeque<ToolOutput>>,
    pub watched: Option<(PathBuf, PathBuf)>,
    pub calls: Mutex<Vec<Call>>,
    pub sessions: Mutex<Vec<Session>>,
}

impl TokenTestStub {
    pub fn new() -> Self {
        TokenTestStub {
            serial: ok("serial: 1234567\n"),
            product: ok("product_id: 111\n"),
            status: ok("Reader ...........: Yubico Yubikey NEO OTP CCID\n"),
            set_mode_result: ok(""),
            ssh_keys: ok("ssh-rsa AAAAB3NzaC1yc2E cardno:000601234567\n"),
            default_mode: ok("0x82\n"),
            mode_reports: Mutex::new(VecDeque::new()),
            card_edit_results: Mutex::new(VecDeque::new()),
            watched: None,
            calls: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot the given PIN exchange file and agent configuration whenever
    /// a card editor session starts.
    pub fn watch(mut self, pin_exchange: PathBuf, agent_conf: PathBuf) -> Self {
        self.watched = Some((pin_exchange, agent_conf));
        self
    }

    pub fn push_mode_report(&self, report: ToolOutput) -> &Self {
        self.mode_reports.lock().unwrap().push_back(report);
        self
    }

    pub fn push_card_edit_result(&self, result: ToolOutput) -> &Self {
        self.card_edit_results.lock().unwrap().push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn set_mode_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::SetMode(_)))
            .count()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl TokenHal for TokenTestStub {
    fn serial_report(&self) -> Result<ToolOutput> {
        self.record(Call::Serial);
        Ok(self.serial.clone())
    }

    fn product_report(&self) -> Result<ToolOutput> {
        self.record(Call::Product);
        Ok(self.product.clone())
    }

    fn card_status(&self) -> Result<ToolOutput> {
        self.record(Call::CardStatus);
        Ok(self.status.clone())
    }

    fn mode_report(&self) -> Result<ToolOutput> {
        self.record(Call::ModeReport);
        Ok(self
            .mode_reports
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_mode.clone()))
    }

    fn set_mode(&self, mode: &str) -> Result<ToolOutput> {
        self.record(Call::SetMode(mode.to_owned()));
        Ok(self.set_mode_result.clone())
    }

    fn card_edit(&self, script: &CommandScript) -> Result<ToolOutput> {
        self.record(Call::CardEdit);
        let (pins, agent_conf) = match self.watched.as_ref() {
            None => (None, None),
            Some((pin_exchange, agent_conf)) => (
                PinExchangeRequest::read(pin_exchange).ok(),
                fs::read_to_string(agent_conf).ok(),
            ),
        };
        self.sessions.lock().unwrap().push(Session {
            script: script.clone(),
            pins: pins,
            agent_conf: agent_conf,
        });
        Ok(self
            .card_edit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ok("")))
    }

    fn reload_agent(&self) -> Result<ToolOutput> {
        self.record(Call::ReloadAgent);
        Ok(ok(""))
    }

    fn ssh_public_keys(&self) -> Result<ToolOutput> {
        self.record(Call::SshKeys);
        Ok(self.ssh_keys.clone())
    }
}
