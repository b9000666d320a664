// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Lazily spawned background work owned by a cursor or shared hub.
//!
//! Sequences are cold, so nothing is spawned when a cursor is created. The task
//! is launched on first demand, cancelled through its token, and its join
//! handle is handed out once by [`BackgroundTask::stop_future`] so a caller can
//! wait for it to finish.

use std::future::Future;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::traits::StopFuture;

enum Launch {
    Idle,
    Running(JoinHandle<()>),
    Detached,
}

pub(crate) struct BackgroundTask {
    token: CancellationToken,
    launch: Mutex<Launch>,
}

impl BackgroundTask {
    pub(crate) fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    pub(crate) fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            launch: Mutex::new(Launch::Idle),
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Spawn the task unless it has already been launched or cancelled.
    pub(crate) fn ensure_launched<F, Fut>(&self, body: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut launch = self.launch.lock();
        if !matches!(*launch, Launch::Idle) || self.token.is_cancelled() {
            return;
        }
        *launch = Launch::Running(tokio::spawn(body(self.token.clone())));
    }

    /// Launched and not yet finished.
    pub(crate) fn is_running(&self) -> bool {
        matches!(&*self.launch.lock(), Launch::Running(handle) if !handle.is_finished())
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Hand out the join handle as a cleanup future. Only the first caller
    /// receives it.
    pub(crate) fn stop_future(&self) -> Option<StopFuture> {
        let mut launch = self.launch.lock();
        match std::mem::replace(&mut *launch, Launch::Detached) {
            Launch::Running(handle) => Some(
                async move {
                    let _ = handle.await;
                }
                .boxed(),
            ),
            _ => None,
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
