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

pub mod hal;
pub mod mode;
pub mod probe;

use std::fmt;
use std::str::FromStr;

/// The token models we know how to provision. Each model's card editor menu
/// asks its questions in a slightly different order, so we need to know which
/// one we're talking to before building a command script.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Model {
    Neo,
    NeoNano,
    /// A model we don't recognize. This only arises from a forced model name;
    /// probing an unrecognized device fails outright instead.
    Unknown(String),
}

impl Model {
    /// Map a USB product ID, as reported by the device info query, to a model.
    pub fn from_product_id(product_id: u32) -> Option<Model> {
        match product_id {
            111 => Some(Model::Neo),
            116 => Some(Model::NeoNano),
            _ => None,
        }
    }

    /// The mode code which puts this model into a CCID-capable mode, or None
    /// if this model can't do CCID at all.
    ///
    /// From ykpersonalize(1): 2 is OTP/CCID, 6 is OTP/U2F/CCID, and adding 80
    /// sets MODE_FLAG_EJECT.
    pub fn ccid_mode(&self) -> Option<&'static str> {
        match self {
            Model::Neo => Some("82"),
            Model::NeoNano => Some("82"),
            Model::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Model::Neo => "neo",
                Model::NeoNano => "neo-nano",
                Model::Unknown(name) => name.as_str(),
            }
        )
    }
}

impl FromStr for Model {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "neo" => Model::Neo,
            "neo-nano" => Model::NeoNano,
            other => Model::Unknown(other.to_owned()),
        })
    }
}

/// Everything we learned about the inserted token while probing it. This is
/// built once per run and not updated afterwards.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceState {
    pub serial: String,
    pub model: Model,
    /// The raw mode report seen while probing. The mode controller re-reads
    /// the mode itself; this is kept for diagnostics.
    pub mode: String,
    /// Whether the token already holds a signature, encryption, or
    /// authentication key.
    pub configured: bool,
}
