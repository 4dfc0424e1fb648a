// SPDX-License-Identifier: MIT

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::fleet::StopSignal;

/// What the engine asks of the person at the keyboard.
pub trait Operator: StopSignal {
    /// Blocks until the operator agrees to start writing. `false` cancels.
    fn confirm_start(&mut self) -> bool;
}

/// Lines typed on stdin, read by a single background thread.
///
/// Discovery and the start confirmation share it, so one Enter is never
/// swallowed by a reader nobody listens to any more.
pub struct OperatorInput {
    lines: Receiver<String>,
}

impl OperatorInput {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { lines: rx }
    }
}

impl StopSignal for OperatorInput {
    fn wait(&mut self, timeout: Duration) -> bool {
        match self.lines.recv_timeout(timeout) {
            Ok(_) => true,
            Err(RecvTimeoutError::Timeout) => false,
            // EOF on stdin counts as Enter.
            Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

impl Operator for OperatorInput {
    fn confirm_start(&mut self) -> bool {
        self.lines.recv().is_ok()
    }
}
