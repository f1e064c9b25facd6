// Copyright 2025 Recoshard Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One-shot request results
//!
//! Every request returns a [`Pending`] right away. The worker fulfils it
//! through the matching [`Completion`] when the task finishes. If the task is
//! dropped unfinished (the worker stopped), the caller gets
//! [`Error::WorkerStopped`] instead of a value.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::core::{Error, Result};

/// Creates a connected completion/pending pair
pub(crate) fn pending<T>() -> (Completion<T>, Pending<T>) {
    let (sender, receiver) = channel::bounded(1);
    (
        Completion {
            sender: Some(sender),
        },
        Pending { receiver },
    )
}

/// Worker side of a request result; fires at most once
#[derive(Debug)]
pub(crate) struct Completion<T> {
    sender: Option<Sender<T>>,
}

impl<T> Completion<T> {
    /// Delivers the result; later calls are ignored
    pub fn complete(&mut self, value: T) {
        if let Some(sender) = self.sender.take() {
            // The caller may have dropped its Pending; nobody to tell then
            let _ = sender.send(value);
        }
    }

    pub fn is_completed(&self) -> bool {
        self.sender.is_none()
    }
}

/// Caller side of a request result
///
/// The value is handed out once: after a successful `wait_timeout` or
/// `try_get`, further reads report [`Error::WorkerStopped`].
#[derive(Debug)]
#[must_use = "a request result does nothing unless waited on"]
pub struct Pending<T> {
    receiver: Receiver<T>,
}

impl<T> Pending<T> {
    /// Blocks until the worker answers the request
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| Error::WorkerStopped)
    }

    /// Blocks for at most `timeout`; `Ok(None)` means no answer yet
    ///
    /// Timing out does not cancel the request.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerStopped),
        }
    }

    /// Returns the answer if it is already there
    pub fn try_get(&self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::WorkerStopped)),
        }
    }
}
