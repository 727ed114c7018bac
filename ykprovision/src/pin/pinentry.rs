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

use crate::device::hal::TokenHal;
use crate::error::*;
use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// The suffix of the path the agent's real configuration is moved aside to.
const BACKUP_SUFFIX: &str = ".orig";

/// The agent configuration line which points it at a different pinentry.
pub fn agent_conf_contents(substitute: &Path) -> String {
    format!("pinentry-program {}\n", substitute.display())
}

fn backup_path(conf: &Path) -> PathBuf {
    let mut backup: OsString = conf.as_os_str().to_owned();
    backup.push(BACKUP_SUFFIX);
    PathBuf::from(backup)
}

/// Points the GnuPG agent at our pinentry substitute, so PINs are read from
/// the exchange file instead of being prompted for. The agent configuration is
/// shared by everything the user runs, so only one redirection may be active
/// at a time, and it must always be put back.
pub struct PinentryRedirection {
    conf: PathBuf,
    backup: PathBuf,
    substitute: PathBuf,
    active: AtomicBool,
}

impl PinentryRedirection {
    pub fn new<C: Into<PathBuf>, S: Into<PathBuf>>(conf: C, substitute: S) -> Self {
        let conf = conf.into();
        PinentryRedirection {
            backup: backup_path(&conf),
            conf: conf,
            substitute: substitute.into(),
            active: AtomicBool::new(false),
        }
    }

    pub fn backup_path(&self) -> &Path {
        self.backup.as_path()
    }

    fn check_preconditions(&self) -> Result<PathBuf> {
        if !self.substitute.is_file() {
            return Err(Error::SubstituteNotFound(
                self.substitute.display().to_string(),
            ));
        }
        // A leftover backup means an earlier run crashed mid-redirection. The
        // backup is the user's real configuration, so we must not clobber it.
        if self.backup.exists() {
            return Err(Error::RedirectionAlreadyActive(format!(
                "found leftover backup {}",
                self.backup.display()
            )));
        }
        Ok(self.substitute.canonicalize()?)
    }

    /// Swap in an agent configuration pointing at the substitute, and tell the
    /// agent to reload it. The returned handle puts the original configuration
    /// back when restored (or dropped).
    pub fn activate<'a, H: TokenHal>(&'a self, hal: &'a H) -> Result<ActiveRedirection<'a, H>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::RedirectionAlreadyActive(
                "another redirection is active in this process".to_owned(),
            ));
        }

        let substitute = match self.check_preconditions() {
            Ok(substitute) => substitute,
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let mut active = ActiveRedirection {
            redirection: self,
            hal: hal,
            had_original: false,
            wrote_conf: false,
            restored: false,
        };

        if self.conf.exists() {
            fs::rename(&self.conf, &self.backup)?;
            active.had_original = true;
            debug!("Moved agent configuration aside to {}", self.backup.display());
        } else if let Some(dir) = self.conf.parent() {
            DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
        }

        active.wrote_conf = true;
        fs::write(&self.conf, agent_conf_contents(&substitute))?;
        info!("Pointed the agent at pinentry substitute {}", substitute.display());

        let reload = hal.reload_agent()?;
        if !reload.success() {
            return Err(Error::Internal(format!(
                "failed to reload the agent configuration ({})",
                reload.exit
            )));
        }

        Ok(active)
    }
}

/// An active pinentry redirection.
pub struct ActiveRedirection<'a, H: TokenHal> {
    redirection: &'a PinentryRedirection,
    hal: &'a H,
    had_original: bool,
    wrote_conf: bool,
    restored: bool,
}

impl<'a, H: TokenHal> ActiveRedirection<'a, H> {
    /// Put the agent's original configuration back. Calling this again after
    /// it has succeeded does nothing.
    pub fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }

        let r = self.redirection;
        if self.wrote_conf {
            match fs::remove_file(&r.conf) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        if self.had_original {
            fs::rename(&r.backup, &r.conf)?;
        }
        self.restored = true;
        r.active.store(false, Ordering::SeqCst);
        info!("Restored the original agent configuration");

        // Best effort: the configuration on disk is already correct, and the
        // agent will pick it up on its next restart regardless.
        match self.hal.reload_agent() {
            Ok(output) if output.success() => {}
            Ok(output) => warn!("Failed to reload the agent configuration ({})", output.exit),
            Err(e) => warn!("Failed to reload the agent configuration: {}", e),
        }
        Ok(())
    }
}

impl<'a, H: TokenHal> Drop for ActiveRedirection<'a, H> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(
                "Failed to restore agent configuration {}: {}",
                self.redirection.conf.display(),
                e
            );
        }
    }
}
