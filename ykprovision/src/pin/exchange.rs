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

use crate::error::*;
use log::{debug, warn};
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// The contents of the PIN exchange file, as read by the pinentry substitute.
/// The substitute answers its first prompt with `oldpin`, and subsequent ones
/// with `newpin`, bumping `round` as it goes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PinExchangeRequest {
    pub round: u32,
    pub old_pin: String,
    pub new_pin: String,
}

impl PinExchangeRequest {
    pub fn new(old_pin: &str, new_pin: &str) -> Self {
        PinExchangeRequest {
            round: 0,
            old_pin: old_pin.to_owned(),
            new_pin: new_pin.to_owned(),
        }
    }

    /// Render this request in the exchange file's `key=value` format.
    pub fn to_contents(&self) -> String {
        format!(
            "round={}\noldpin={}\nnewpin={}\n",
            self.round, self.old_pin, self.new_pin
        )
    }

    /// Parse the exchange file's `key=value` format. Unknown keys are ignored,
    /// but all three known keys must be present.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut round: Option<u32> = None;
        let mut old_pin: Option<String> = None;
        let mut new_pin: Option<String> = None;
        for line in contents.lines() {
            if let Some(index) = line.find('=') {
                let (k, v) = line.split_at(index);
                let v = &v[1..];
                match k {
                    "round" => round = Some(v.parse()?),
                    "oldpin" => old_pin = Some(v.to_owned()),
                    "newpin" => new_pin = Some(v.to_owned()),
                    _ => {}
                }
            }
        }

        match (round, old_pin, new_pin) {
            (Some(round), Some(old_pin), Some(new_pin)) => Ok(PinExchangeRequest {
                round: round,
                old_pin: old_pin,
                new_pin: new_pin,
            }),
            _ => Err(Error::InvalidArgument(
                "PIN exchange file is missing a required field".to_owned(),
            )),
        }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        r => r,
    }
}

/// The file-based channel through which PINs reach the pinentry substitute.
/// At most one request can be staged at a time.
pub struct PinExchange {
    path: PathBuf,
    staged: AtomicBool,
}

impl PinExchange {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        PinExchange {
            path: path.into(),
            staged: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Write the given PINs to the exchange file, returning a handle which
    /// deletes the file again when released (or dropped).
    ///
    /// Any file left behind by an earlier run is deleted first, and the new
    /// file is created readable and writable by its owner only.
    pub fn stage(&self, old_pin: &str, new_pin: &str) -> Result<StagedPins<'_>> {
        if self
            .staged
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::ExchangeAlreadyStaged);
        }
        // From here on, the handle cleans up after us if anything fails.
        let staged = StagedPins {
            exchange: self,
            released: false,
        };

        if let Some(dir) = self.path.parent() {
            DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
        }
        if self.path.exists() {
            warn!("Removing stale PIN exchange file {}", self.path.display());
        }
        remove_if_exists(&self.path)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&self.path)?;
        file.write_all(PinExchangeRequest::new(old_pin, new_pin).to_contents().as_bytes())?;
        file.sync_all()?;
        debug!("Staged PIN exchange file {}", self.path.display());

        Ok(staged)
    }
}

/// A staged PIN exchange request. The exchange file lives exactly as long as
/// this handle.
pub struct StagedPins<'a> {
    exchange: &'a PinExchange,
    released: bool,
}

impl<'a> StagedPins<'a> {
    /// Delete the exchange file. It's fine to call this more than once, or
    /// after something else has deleted the file.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        remove_if_exists(&self.exchange.path)?;
        self.released = true;
        self.exchange.staged.store(false, Ordering::SeqCst);
        debug!("Removed PIN exchange file {}", self.exchange.path.display());
        Ok(())
    }
}

impl<'a> Drop for StagedPins<'a> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(
                "Failed to remove PIN exchange file {}: {}",
                self.exchange.path.display(),
                e
            );
        }
    }
}
