// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-key command serialization.
//!
//! Every [`Command`] has a key (`group:<name>` or `node:<name>`). Commands with
//! the same key are handled one at a time in dispatch order by a dedicated
//! worker task; commands with different keys run in parallel.
//!
//! Workers are created on demand and exit after sitting idle for the configured
//! timeout. The decision to exit is taken under the same lock dispatching
//! holds, so a command is never queued to a worker that is about to leave.
//!
//! [`Dispatcher::shutdown`] closes the dispatcher and waits for the workers to
//! finish; commands dispatched after that are dropped.

use super::plan::Command;
use crate::metrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs commands. One call at a time per key.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Handle one command; failures are the handler's to report.
    async fn handle(&self, command: Command);
}

struct Worker {
    sender: UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Workers {
    by_key: HashMap<String, Worker>,
    closed: bool,
}

type WorkerMap = Arc<Mutex<Workers>>;

fn lock(workers: &WorkerMap) -> MutexGuard<'_, Workers> {
    workers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes commands to per-key workers.
pub struct Dispatcher<H> {
    handler: Arc<H>,
    workers: WorkerMap,
    idle_timeout: Duration,
}

impl<H: CommandHandler> Dispatcher<H> {
    /// Create a dispatcher whose workers exit after `idle_timeout` without work.
    #[must_use]
    pub fn new(handler: Arc<H>, idle_timeout: Duration) -> Self {
        Self {
            handler,
            workers: Arc::new(Mutex::new(Workers::default())),
            idle_timeout,
        }
    }

    /// Number of live workers.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        lock(&self.workers).by_key.len()
    }

    /// Queue a command behind earlier commands with the same key.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, command: Command) {
        let key = command.key();
        let mut workers = lock(&self.workers);
        if workers.closed {
            debug!(key = %key, operation = command.operation(), "Dispatcher closed, dropping command");
            return;
        }

        let command = match workers.by_key.get(&key) {
            Some(worker) => match worker.sender.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(command)) => {
                    warn!(key = %key, "Worker vanished, starting a new one");
                    command
                }
            },
            None => command,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail
        let _ = sender.send(command);

        debug!(key = %key, "Starting worker");
        metrics::record_worker_started();
        let handle = tokio::spawn(run_worker(
            key.clone(),
            receiver,
            self.handler.clone(),
            self.workers.clone(),
            self.idle_timeout,
        ));
        workers.by_key.insert(key, Worker { sender, handle });
    }

    /// Stop accepting commands and wait for the workers to drain their queues.
    ///
    /// Workers still running after `grace` are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        let workers = {
            let mut workers = lock(&self.workers);
            workers.closed = true;
            std::mem::take(&mut workers.by_key)
        };
        if workers.is_empty() {
            return;
        }

        info!(count = workers.len(), grace = ?grace, "Waiting for workers to finish");
        let deadline = tokio::time::Instant::now() + grace;
        for (key, Worker { sender, mut handle }) in workers {
            drop(sender);
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!(key = %key, "Worker still busy after grace period, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

/// Counts the worker as stopped however its task ends.
struct StoppedOnDrop;

impl Drop for StoppedOnDrop {
    fn drop(&mut self) {
        metrics::record_worker_stopped();
    }
}

async fn run_worker<H: CommandHandler>(
    key: String,
    mut receiver: UnboundedReceiver<Command>,
    handler: Arc<H>,
    workers: WorkerMap,
    idle_timeout: Duration,
) {
    let _stopped = StoppedOnDrop;
    loop {
        let command = match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!(key = %key, "Worker closed, exiting");
                return;
            }
            Err(_) => {
                let mut map = lock(&workers);
                match receiver.try_recv() {
                    Ok(command) => command,
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                        map.by_key.remove(&key);
                        break;
                    }
                }
            }
        };
        handler.handle(command).await;
    }

    debug!(key = %key, "Worker idle, exiting");
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod dispatch_tests;
