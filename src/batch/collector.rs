//! Batch collector.

use super::executor;
use crate::handler::SharedHandler;
use crate::{Context, Result};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Requests that trigger an immediate flush.
    pub max_size: usize,
    /// Longest time the first request of a window waits for company.
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            max_wait: Duration::from_millis(100),
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_size(mut self, s: usize) -> Self {
        self.max_size = s;
        self
    }
    pub fn with_max_wait(mut self, w: Duration) -> Self {
        self.max_wait = w;
        self
    }
}

/// One caller's pending call.
pub(crate) struct BatchRequest {
    pub payload: Bytes,
    pub respond: oneshot::Sender<Result<Bytes>>,
    pub ctx: Context,
}

impl BatchRequest {
    /// Hand the result to the caller unless it already gave up.
    pub fn deliver(self, result: Result<Bytes>) {
        if self.ctx.is_done() {
            debug!("batch caller cancelled, skipping delivery");
            return;
        }
        let _ = self.respond.send(result);
    }
}

/// Pending requests of the current window.
pub(crate) struct BatchWindow {
    items: Vec<BatchRequest>,
    max_size: usize,
}

impl BatchWindow {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Adds a request; returns true if it opened a new window.
    pub fn push(&mut self, request: BatchRequest) -> bool {
        self.items.push(request);
        self.items.len() == 1
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_size
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn drain(&mut self) -> Vec<BatchRequest> {
        std::mem::take(&mut self.items)
    }
}

/// Coalescing loop: one per `Batch` instance, ends when every sender is gone.
pub(crate) async fn run_collector(
    handler: SharedHandler,
    config: BatchConfig,
    mut requests: mpsc::Receiver<BatchRequest>,
) {
    let mut window = BatchWindow::new(config.max_size);
    let timer = tokio::time::sleep(config.max_wait);
    tokio::pin!(timer);
    let mut armed = false;

    loop {
        tokio::select! {
            received = requests.recv() => match received {
                Some(request) => {
                    if window.push(request) {
                        timer.as_mut().reset(Instant::now() + config.max_wait);
                        armed = true;
                    }
                    if window.is_full() {
                        armed = false;
                        debug!(size = window.len(), "batch full, flushing");
                        tokio::spawn(executor::flush(handler.clone(), window.drain()));
                    }
                }
                None => {
                    if !window.is_empty() {
                        executor::flush(handler.clone(), window.drain()).await;
                    }
                    debug!("batch collector stopped");
                    return;
                }
            },
            () = &mut timer, if armed => {
                armed = false;
                if !window.is_empty() {
                    debug!(size = window.len(), "batch wait elapsed, flushing");
                    tokio::spawn(executor::flush(handler.clone(), window.drain()));
                }
            }
        }
    }
}
