// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tracks which init phases have completed so a failure partway through
//! `main::run` unwinds them in reverse order (§5, §9's shutdown-race note).
//!
//! The actual teardown work is done by each phase's own `Drop` impl (the
//! spidev `File`, the pipe's `OwnedFd`s, ...); this type's job is just to
//! make the unwind order visible in the log, and to be the one place that
//! would grow real teardown code if a future phase ever needed it.

pub struct PhaseGuards {
    completed: Vec<&'static str>,
}

impl PhaseGuards {
    pub fn new() -> Self {
        PhaseGuards {
            completed: Vec::new(),
        }
    }

    pub fn enter(&mut self, phase: &'static str) {
        log::debug!("init: phase '{phase}' complete");
        self.completed.push(phase);
    }
}

impl Drop for PhaseGuards {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        for phase in self.completed.iter().rev() {
            log::debug!("unwind: phase '{phase}' torn down");
        }
    }
}
