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

use std::fmt;
use thiserror::Error;

/// How an external tool exited. Most tools give us an exit code, but a tool
/// killed by a signal (e.g. the operator hitting Ctrl-C) does not.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExitSignal(pub Option<i32>);

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

impl Default for ExitSignal {
    fn default() -> Self {
        ExitSignal(Some(0))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to find the token's serial number (is it plugged in?)")]
    DeviceNotFound,
    #[error("unrecognized token model '{0}'; use --forcecard to override")]
    AmbiguousModel(String),
    #[error("card status query failed ({0})")]
    StatusQueryFailed(ExitSignal),
    #[error("token model '{0}' doesn't support CCID mode")]
    UnsupportedModel(String),
    #[error("token already holds keys; re-run with --overwrite to destroy them")]
    ModeSetRefused,
    #[error("failed to switch the token into CCID mode ({0})")]
    ModeSetFailed(ExitSignal),
    #[error("token did not appear after {0} mode probe attempts")]
    DeviceNeverAppeared(u32),
    #[error("pinentry redirection is already active ({0}); restore it manually")]
    RedirectionAlreadyActive(String),
    #[error("cannot find a pinentry substitute at {0}")]
    SubstituteNotFound(String),
    #[error("a PIN exchange is already staged")]
    ExchangeAlreadyStaged,
    #[error("card editor session failed ({0})")]
    CardEditorFailed(ExitSignal),
    #[error("failed to change the {which} ({status})")]
    PinChangeFailed {
        which: &'static str,
        status: ExitSignal,
    },
    #[error("failed to retrieve the public key: {0}")]
    PublicKeyRetrievalFailed(String),
    #[error("aborted by operator")]
    Aborted,
    #[error("{0}")]
    Bdrck(#[from] bdrck::error::Error),
    /// An internal unrecoverable error, usually due to some underlying library.
    #[error("internal error: {0}")]
    Internal(String),
    /// Errors akin to EINVAL.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    ParseInt(#[from] std::num::ParseIntError),
}

impl Error {
    /// The process exit code for this error. Every failure kind a caller might want to script
    /// around gets its own code; everything else is a generic 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::StatusQueryFailed(_) => 10,
            Error::CardEditorFailed(_) => 11,
            Error::UnsupportedModel(_) => 20,
            Error::PinChangeFailed { .. } => 21,
            Error::AmbiguousModel(_) => 22,
            Error::ModeSetRefused => 23,
            Error::DeviceNotFound => 24,
            Error::ModeSetFailed(_) => 25,
            Error::DeviceNeverAppeared(_) => 26,
            Error::SubstituteNotFound(_) => 27,
            Error::RedirectionAlreadyActive(_) => 28,
            Error::ExchangeAlreadyStaged => 29,
            Error::PublicKeyRetrievalFailed(_) => 30,
            Error::Aborted => 31,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
