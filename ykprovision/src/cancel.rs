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
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// The longest we sleep without re-checking for cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// A flag which can be set from elsewhere (another thread, or a signal
/// handler) to ask a long-running wait to give up.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for the given duration, waking early if cancelled. Returns true
    /// if the full duration elapsed without cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

static INTERRUPT_FLAG: OnceCell<Arc<AtomicBool>> = OnceCell::new();

extern "C" fn on_interrupt(_: libc::c_int) {
    if let Some(flag) = INTERRUPT_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

/// Cancel the given token when the process receives SIGINT, instead of
/// letting the default handler kill us outright. This way, anything we've
/// changed on disk is still put back on the way out. Only one token can ever
/// be registered.
pub fn install_interrupt_handler(token: &CancellationToken) -> Result<()> {
    if INTERRUPT_FLAG.set(token.flag.clone()).is_err() {
        return Err(Error::Internal(
            "an interrupt handler is already installed".to_owned(),
        ));
    }

    let handler = on_interrupt as extern "C" fn(libc::c_int);
    if unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) } == libc::SIG_ERR {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}
