// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Windowing: split a sequence into consecutive sub-sequences of `size`.
//!
//! The outer cursor yields one inner [`Sequence`] per window. Each window is
//! filled by a background copy task that reads ahead of the outer consumer up to
//! `size` elements, so the outer cursor may be advanced while a window is still
//! being filled; the next window starts only after the previous copy finished.
//!
//! Copying runs only while a reference-counted keep-alive is held. The outer
//! cursor, every emitted window and every window cursor hold a clone; when the
//! last clone goes, read-ahead stops and the source is cancelled.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::context::Context;
use crate::engine::cursor::{sequence, Producer, ProducerCursor};
use crate::errors::{SequenceError, SequenceResult};
use crate::traits::{BoxCursor, Cursor, CursorExt, Element, Sequence, SequenceRef, StopFuture};

struct KeepAliveInner<T> {
    token: CancellationToken,
    source: Arc<dyn Cursor<T>>,
}

impl<T> Drop for KeepAliveInner<T> {
    fn drop(&mut self) {
        self.token.cancel();
        self.source.cancel();
    }
}

struct KeepAlive<T>(Arc<KeepAliveInner<T>>);

impl<T> Clone for KeepAlive<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> KeepAlive<T> {
    fn token(&self) -> CancellationToken {
        self.0.token.clone()
    }
}

struct WindowState<T> {
    items: Vec<T>,
    end: Option<SequenceResult<()>>,
}

/// Replayable storage for one window, filled by the copy task.
struct WindowBuffer<T> {
    state: Mutex<WindowState<T>>,
    changed: Notify,
}

impl<T: Element> WindowBuffer<T> {
    fn new(first: T) -> Self {
        Self {
            state: Mutex::new(WindowState {
                items: vec![first],
                end: None,
            }),
            changed: Notify::new(),
        }
    }

    fn push(&self, value: T) {
        self.state.lock().items.push(value);
        self.changed.notify_waiters();
    }

    fn finish(&self, end: SequenceResult<()>) {
        {
            let mut state = self.state.lock();
            if state.end.is_none() {
                state.end = Some(end);
            }
        }
        self.changed.notify_waiters();
    }

    async fn read(&self, position: usize, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock();
                if let Some(item) = state.items.get(position) {
                    return Ok(Some(item.clone()));
                }
                match &state.end {
                    Some(Ok(())) => return Ok(None),
                    Some(Err(err)) => return Err(err.clone()),
                    None => {}
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Err(SequenceError::Cancelled),
            }
        }
    }
}

struct WindowReader<T> {
    buffer: Arc<WindowBuffer<T>>,
    position: AtomicUsize,
    _keep: KeepAlive<T>,
}

#[async_trait]
impl<T: Element> Producer<T> for WindowReader<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<T>> {
        let position = self.position.load(Ordering::Acquire);
        let item = self.buffer.read(position, cancel).await?;
        if item.is_some() {
            self.position.store(position + 1, Ordering::Release);
        }
        Ok(item)
    }
}

/// One window. Every start replays the window from its first element.
struct Window<T> {
    buffer: Arc<WindowBuffer<T>>,
    keep: KeepAlive<T>,
}

impl<T: Element> Sequence<T> for Window<T> {
    fn start(&self, _context: &Context) -> BoxCursor<T> {
        ProducerCursor::boxed(
            "window_inner",
            WindowReader {
                buffer: self.buffer.clone(),
                position: AtomicUsize::new(0),
                _keep: self.keep.clone(),
            },
        )
    }
}

struct Windows<T> {
    source: Arc<dyn Cursor<T>>,
    size: usize,
    keep: Mutex<Option<KeepAlive<T>>>,
    copier: Mutex<Option<JoinHandle<SequenceResult<bool>>>>,
    ended: AtomicBool,
}

impl<T: Element> Windows<T> {
    fn new(source: BoxCursor<T>, size: usize) -> Self {
        let source: Arc<dyn Cursor<T>> = Arc::from(source);
        let keep = KeepAlive(Arc::new(KeepAliveInner {
            token: CancellationToken::new(),
            source: source.clone(),
        }));
        Self {
            source,
            size,
            keep: Mutex::new(Some(keep)),
            copier: Mutex::new(None),
            ended: AtomicBool::new(false),
        }
    }

    /// Fill `buffer` up to `size` elements. Resolves to whether the source
    /// may have more.
    async fn copy(
        source: Arc<dyn Cursor<T>>,
        buffer: Arc<WindowBuffer<T>>,
        remaining: usize,
        token: CancellationToken,
    ) -> SequenceResult<bool> {
        for _ in 0..remaining {
            match source.next_value(&token).await {
                Ok(Some(value)) => buffer.push(value),
                Ok(None) => {
                    buffer.finish(Ok(()));
                    return Ok(false);
                }
                Err(err) => {
                    buffer.finish(Err(err.clone()));
                    return Err(err);
                }
            }
        }
        buffer.finish(Ok(()));
        Ok(true)
    }
}

#[async_trait]
impl<T: Element> Producer<SequenceRef<T>> for Windows<T> {
    async fn next(&self, cancel: &CancellationToken) -> SequenceResult<Option<SequenceRef<T>>> {
        let previous = self.copier.lock().take();
        if let Some(copy) = previous {
            let more = copy.await.map_err(|_| SequenceError::Cancelled)??;
            if !more {
                self.ended.store(true, Ordering::Release);
            }
        }
        if self.ended.load(Ordering::Acquire) {
            return Ok(None);
        }

        let Some(keep) = self.keep.lock().clone() else {
            return Err(SequenceError::Cancelled);
        };

        let Some(first) = self.source.next_value(cancel).await? else {
            self.ended.store(true, Ordering::Release);
            return Ok(None);
        };

        let buffer = Arc::new(WindowBuffer::new(first));
        let copy = tokio::spawn(Self::copy(
            self.source.clone(),
            buffer.clone(),
            self.size - 1,
            keep.token(),
        ));
        *self.copier.lock() = Some(copy);

        Ok(Some(Arc::new(Window { buffer, keep }) as SequenceRef<T>))
    }

    fn cancel(&self) {
        self.keep.lock().take();
    }

    fn stop(&self) -> Vec<StopFuture> {
        self.cancel();
        self.copier
            .lock()
            .take()
            .map(|copy| {
                async move {
                    let _ = copy.await;
                }
                .boxed()
            })
            .into_iter()
            .collect()
    }
}

/// Split `source` into consecutive windows of at most `size` elements.
pub fn window<T: Element>(source: SequenceRef<T>, size: usize) -> SequenceRef<SequenceRef<T>> {
    let size = size.max(1);
    sequence(move |ctx| ProducerCursor::boxed("window", Windows::new(source.start(ctx), size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sinks::to_list_async;
    use crate::engine::sources::{produce, range};
    use crate::traits::CursorState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_windows_partition_the_source() {
        let ctx = Context::new();
        let windows = to_list_async(&window(range(1, 7), 3), &ctx).await.unwrap();
        assert_eq!(windows.len(), 3);

        let mut contents = Vec::new();
        for w in &windows {
            contents.push(to_list_async(w, &ctx).await.unwrap());
        }
        assert_eq!(contents, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[tokio::test]
    async fn test_window_replays_on_restart() {
        let ctx = Context::new();
        let windows = to_list_async(&window(range(1, 2), 5), &ctx).await.unwrap();
        let first = to_list_async(&windows[0], &ctx).await.unwrap();
        let again = to_list_async(&windows[0], &ctx).await.unwrap();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn test_inner_cursor_waits_for_read_ahead() {
        let ctx = Context::new();
        let slow = crate::engine::elementwise::delay(range(1, 3), Duration::from_millis(10));
        let outer = window(slow, 3).start(&ctx);
        let cancel = CancellationToken::new();

        assert!(outer.advance(&cancel).await.unwrap());
        let first = outer.current().unwrap();
        // the copy task is still filling the window when we read it
        assert_eq!(to_list_async(&first, &ctx).await.unwrap(), vec![1, 2, 3]);
        assert!(!outer.advance(&cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_releasing_every_keep_alive_stops_read_ahead() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = pulls.clone();
        let endless = produce(usize::MAX, move || counter.fetch_add(1, Ordering::SeqCst));
        let slow = crate::engine::elementwise::delay(endless, Duration::from_millis(5));

        let ctx = Context::new();
        let outer = window(slow, 1_000).start(&ctx);
        let cancel = CancellationToken::new();
        assert!(outer.advance(&cancel).await.unwrap());
        let first = outer.current().unwrap();

        outer.cancel();
        assert_eq!(outer.state(), CursorState::Canceled);
        drop(first);
        drop(outer);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = pulls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), settled);
        assert!(settled < 1_000);
    }
}
