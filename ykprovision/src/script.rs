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

use crate::config::KeyValidity;
use crate::device::Model;
use crate::error::*;

/// What a card editor session is meant to accomplish.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Intent {
    /// Generate a fresh set of keys for the given user ID.
    GenerateKey {
        validity: KeyValidity,
        name: String,
        email: String,
    },
    /// Change the user PIN.
    ChangePin,
    /// Change the admin PIN.
    ChangeAdminPin,
}

/// One entry in the key generation lookup table. `Validity`, `Name` and
/// `Email` are substituted from the intent when the script is built.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Step {
    Literal(&'static str),
    Validity,
    Name,
    Email,
}

use self::Step::*;

// The card editor's menus ask their questions in a different order depending
// on the model and on whether keys already exist, and we answer blind, so these
// sequences have to match the firmware exactly. In order, the prompts are:
// admin mode, generate, (off-card backup), (replace existing keys), validity,
// confirm validity, real name, email, comment, okay, and quit.
static NEO_CONFIGURED: &[Step] = &[
    Literal("admin"),
    Literal("generate"),
    Literal("y"),
    Validity,
    Literal("y"),
    Name,
    Email,
    Literal(""),
    Literal("O"),
    Literal("quit"),
];

static NEO_UNCONFIGURED: &[Step] = &[
    Literal("admin"),
    Literal("generate"),
    Validity,
    Literal("y"),
    Name,
    Email,
    Literal(""),
    Literal("O"),
    Literal("quit"),
];

static NEO_NANO_CONFIGURED: &[Step] = &[
    Literal("admin"),
    Literal("generate"),
    Literal("n"),
    Literal("y"),
    Validity,
    Literal("y"),
    Name,
    Email,
    Literal(""),
    Literal("O"),
    Literal("quit"),
];

static NEO_NANO_UNCONFIGURED: &[Step] = &[
    Literal("admin"),
    Literal("generate"),
    Literal("n"),
    Validity,
    Literal("y"),
    Name,
    Email,
    Literal(""),
    Literal("O"),
    Literal("quit"),
];

static CHANGE_PIN: &[&str] = &["passwd", "quit"];

// "3" picks "change Admin PIN" from the passwd submenu, and "Q" leaves it.
static CHANGE_ADMIN_PIN: &[&str] = &["admin", "passwd", "3", "Q", "quit"];

fn generation_steps(model: &Model, configured: bool) -> Option<&'static [Step]> {
    Some(match (model, configured) {
        (Model::Neo, true) => NEO_CONFIGURED,
        (Model::Neo, false) => NEO_UNCONFIGURED,
        (Model::NeoNano, true) => NEO_NANO_CONFIGURED,
        (Model::NeoNano, false) => NEO_NANO_UNCONFIGURED,
        (Model::Unknown(_), _) => return None,
    })
}

/// The exact sequence of lines fed to one card editor session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandScript {
    tokens: Vec<String>,
}

impl CommandScript {
    /// Build the script for the given intent. This is a pure lookup; the name
    /// and email are passed through verbatim.
    pub fn build(model: &Model, configured: bool, intent: &Intent) -> Result<Self> {
        let tokens: Vec<String> = match intent {
            Intent::GenerateKey {
                validity,
                name,
                email,
            } => generation_steps(model, configured)
                .ok_or_else(|| Error::UnsupportedModel(model.to_string()))?
                .iter()
                .map(|step| match *step {
                    Literal(s) => s.to_owned(),
                    Validity => validity.to_string(),
                    Name => name.clone(),
                    Email => email.clone(),
                })
                .collect(),
            Intent::ChangePin => CHANGE_PIN.iter().map(|s| (*s).to_owned()).collect(),
            Intent::ChangeAdminPin => CHANGE_ADMIN_PIN.iter().map(|s| (*s).to_owned()).collect(),
        };
        Ok(CommandScript { tokens: tokens })
    }

    pub fn tokens(&self) -> &[String] {
        self.tokens.as_slice()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The script as the card editor reads it: one command per line.
    pub fn to_transcript(&self) -> String {
        let mut transcript = self.tokens.join("\n");
        transcript.push('\n');
        transcript
    }
}
