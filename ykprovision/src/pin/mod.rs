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

pub mod exchange;
pub mod pinentry;

use crate::error::*;
use rand::Rng;

/// The number of digits in a randomly generated user PIN.
pub const RANDOM_PIN_DIGITS: u32 = 6;
/// The number of digits in a randomly generated admin PIN.
pub const RANDOM_ADMIN_PIN_DIGITS: u32 = 10;

/// Generate a random PIN with exactly the given number of digits (so, with
/// no leading zero).
pub fn random_pin(digits: u32) -> Result<u64> {
    if digits == 0 || digits > 19 {
        return Err(Error::InvalidArgument(format!(
            "can't generate a {}-digit PIN",
            digits
        )));
    }
    let low = 10u64.pow(digits - 1);
    let high = 10u64.pow(digits) - 1;
    Ok(rand::thread_rng().gen_range(low..=high))
}
