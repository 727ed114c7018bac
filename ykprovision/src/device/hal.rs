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

use crate::config::ToolPaths;
use crate::error::*;
use crate::script::CommandScript;
use log::debug;
use std::ffi::OsStr;
use std::io::Write;
use std::process::{Command, Output, Stdio};

/// The PATH the SSH agent bridge query runs with. We scrub the environment
/// for that query so an already-running agent's socket isn't picked up.
const BRIDGE_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// The captured result of running one external tool.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ToolOutput {
    pub exit: ExitSignal,
    pub stdout: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit.0 == Some(0)
    }
}

impl From<Output> for ToolOutput {
    fn from(output: Output) -> Self {
        ToolOutput {
            exit: ExitSignal(output.status.code()),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        }
    }
}

/// Every interaction this library has with the outside world (the token, the
/// card editor, and the GnuPG agent) goes through this trait. Each function
/// runs one external tool synchronously, and returns its output. An `Err`
/// means the tool couldn't be run at all; a tool which ran but failed is
/// reported via `ToolOutput::exit`.
pub trait TokenHal {
    /// Query the inserted token's serial number. The output should contain a
    /// line like `serial: 1234567`.
    fn serial_report(&self) -> Result<ToolOutput>;

    /// Query the inserted token's USB product ID. The output should contain a
    /// line like `product_id: 111`.
    fn product_report(&self) -> Result<ToolOutput>;

    /// Run the card status query, whose output lists any key fingerprints.
    fn card_status(&self) -> Result<ToolOutput>;

    /// Query the token's current operating mode.
    fn mode_report(&self) -> Result<ToolOutput>;

    /// Switch the token into the given operating mode.
    fn set_mode(&self, mode: &str) -> Result<ToolOutput>;

    /// Run one card editor session, driven entirely by the given script.
    fn card_edit(&self, script: &CommandScript) -> Result<ToolOutput>;

    /// Tell the GnuPG agent to re-read its configuration.
    fn reload_agent(&self) -> Result<ToolOutput>;

    /// Ask a fresh SSH-enabled agent for the public keys it can see.
    fn ssh_public_keys(&self) -> Result<ToolOutput>;
}

/// An implementation of TokenHal which runs the real command line tools.
pub struct ToolHardware {
    tools: ToolPaths,
}

impl ToolHardware {
    pub fn new(tools: ToolPaths) -> Self {
        ToolHardware { tools: tools }
    }

    fn run<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Result<ToolOutput> {
        debug!("Running '{}' with {} argument(s)", program, args.len());
        let output: ToolOutput = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()?
            .into();
        debug!("'{}' finished with {}", program, output.exit);
        Ok(output)
    }

    /// Like `run`, but stderr is captured and appended to stdout, for tools
    /// which report interesting conditions on either stream.
    fn run_merged<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Result<ToolOutput> {
        debug!("Running '{}' with {} argument(s)", program, args.len());
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let mut merged: ToolOutput = output.into();
        merged.stdout.push_str(&stderr);
        debug!("'{}' finished with {}", program, merged.exit);
        Ok(merged)
    }
}

impl Default for ToolHardware {
    fn default() -> Self {
        Self::new(ToolPaths::default())
    }
}

impl TokenHal for ToolHardware {
    fn serial_report(&self) -> Result<ToolOutput> {
        self.run(&self.tools.device_info, &["-s"])
    }

    fn product_report(&self) -> Result<ToolOutput> {
        self.run(&self.tools.device_info, &["-I"])
    }

    fn card_status(&self) -> Result<ToolOutput> {
        self.run(&self.tools.gpg, &["--card-status"])
    }

    fn mode_report(&self) -> Result<ToolOutput> {
        // "No device found" is reported on stderr.
        self.run_merged(&self.tools.mode_query, &["-m"])
    }

    fn set_mode(&self, mode: &str) -> Result<ToolOutput> {
        self.run(
            &self.tools.mode_set,
            &["-y".to_owned(), "-v".to_owned(), format!("-m{}", mode)],
        )
    }

    fn card_edit(&self, script: &CommandScript) -> Result<ToolOutput> {
        debug!(
            "Starting card editor session with {} scripted commands",
            script.len()
        );
        // The editor reads its commands from fd 0. PIN entry goes through the
        // agent's pinentry, so the editor never needs the terminal.
        let mut child = Command::new(&self.tools.gpg)
            .args(["--command-fd", "0", "--card-edit"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        // An editor which bails out early closes its end of the pipe, so the
        // write can fail. We still reap the child, and its exit status is the
        // more useful error in that case.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(script.to_transcript().as_bytes()),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "card editor was spawned without a stdin pipe",
            )),
        }; // Drop stdin, so the editor sees EOF after the last command.

        let output: ToolOutput = child.wait_with_output()?.into();
        debug!("Card editor finished with {}", output.exit);
        match written {
            Err(e) if output.success() => Err(e.into()),
            Err(e) => {
                debug!("Card editor stopped reading its commands early: {}", e);
                Ok(output)
            }
            Ok(()) => Ok(output),
        }
    }

    fn reload_agent(&self) -> Result<ToolOutput> {
        self.run(&self.tools.agent_connect, &["RELOADAGENT", "/bye"])
    }

    fn ssh_public_keys(&self) -> Result<ToolOutput> {
        debug!("Querying a fresh agent for SSH public keys");
        Ok(Command::new(&self.tools.agent)
            .args(["--daemon", "--enable-ssh-support"])
            .arg(&self.tools.ssh_add)
            .arg("-L")
            .env_clear()
            .env("SSH_AUTH_SOCK", "")
            .env("PATH", BRIDGE_PATH)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()?
            .into())
    }
}
