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

use crate::device::Model;
use crate::error::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// The name of the pinentry substitute program, which we expect to find in
/// the same directory as the running executable.
pub const SUBSTITUTE_NAME: &str = "pinentry-exchange";

const PRIVATE_DIR: &str = ".ykprovision";
const PIN_EXCHANGE_FILE: &str = "pin_ipc";
const AGENT_DIR: &str = ".gnupg";
const AGENT_CONF_FILE: &str = "gpg-agent.conf";

/// The external programs we drive. These are looked up in PATH unless an
/// absolute path is given.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolPaths {
    pub device_info: String,
    pub mode_query: String,
    pub mode_set: String,
    pub gpg: String,
    pub agent_connect: String,
    pub agent: String,
    pub ssh_add: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            device_info: "ykinfo".to_owned(),
            mode_query: "ykneomgr".to_owned(),
            mode_set: "ykpersonalize".to_owned(),
            gpg: "gpg2".to_owned(),
            agent_connect: "gpg-connect-agent".to_owned(),
            agent: "gpg-agent".to_owned(),
            ssh_add: "ssh-add".to_owned(),
        }
    }
}

/// The files this library reads and writes while provisioning.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Paths {
    /// Where PINs are staged for the pinentry substitute to pick up.
    pub pin_exchange: PathBuf,
    /// The GnuPG agent's configuration file.
    pub agent_conf: PathBuf,
    /// The pinentry substitute program the agent is pointed at.
    pub substitute: PathBuf,
}

impl Paths {
    /// Lay out all paths relative to the given home directory. The substitute
    /// program is expected next to the running executable.
    pub fn from_home<P: AsRef<Path>>(home: P) -> Result<Self> {
        let home = home.as_ref();
        let agent_dir = match env::var_os("GNUPGHOME") {
            Some(dir) => PathBuf::from(dir),
            None => home.join(AGENT_DIR),
        };
        Ok(Paths {
            pin_exchange: home.join(PRIVATE_DIR).join(PIN_EXCHANGE_FILE),
            agent_conf: agent_dir.join(AGENT_CONF_FILE),
            substitute: default_substitute()?,
        })
    }

    /// Lay out all paths relative to the current user's home directory.
    pub fn for_current_user() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::Internal("unable to determine the current user's home directory".to_owned())
        })?;
        Self::from_home(home)
    }

    pub fn with_substitute<P: Into<PathBuf>>(mut self, substitute: P) -> Self {
        self.substitute = substitute.into();
        self
    }
}

fn default_substitute() -> Result<PathBuf> {
    let exe = env::current_exe()?.canonicalize()?;
    Ok(match exe.parent() {
        Some(dir) => dir.join(SUBSTITUTE_NAME),
        None => PathBuf::from(SUBSTITUTE_NAME),
    })
}

/// Controls how patiently we wait for the token to (re)appear while checking
/// its mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProbeConfig {
    /// How long to wait between mode probes while the device is absent.
    pub backoff: Duration,
    /// The maximum number of mode probes before giving up.
    pub max_attempts: u32,
    /// How long to let the device settle after its mode is confirmed.
    pub settle: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            backoff: Duration::from_secs(2),
            max_attempts: 30,
            settle: Duration::from_secs(5),
        }
    }
}

static VALIDITY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:0|[1-9][0-9]*[dwmy]?)$").unwrap());

/// A key validity period, in the format the card editor's key generation
/// prompt accepts: `0` for no expiry, or a count with an optional unit (e.g.
/// `365`, `52w`, `4y`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyValidity(String);

impl Default for KeyValidity {
    fn default() -> Self {
        KeyValidity("4y".to_owned())
    }
}

impl fmt::Display for KeyValidity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeyValidity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !VALIDITY_REGEX.is_match(s) {
            return Err(Error::InvalidArgument(format!(
                "invalid key validity '{}'; expected e.g. 0, 365, 52w, or 4y",
                s
            )));
        }
        Ok(KeyValidity(s.to_owned()))
    }
}

/// The operator's choices for this run. This is fixed at startup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Policy {
    /// Whether we may destroy keys already present on the token.
    pub overwrite: bool,
    pub key_validity: KeyValidity,
    /// Skip model detection and assume this model instead.
    pub forced_model: Option<Model>,
}
