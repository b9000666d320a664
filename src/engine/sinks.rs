// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Draining sequences back into host-native values.

use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::engine::context::Context;
use crate::errors::SequenceResult;
use crate::traits::{BoxCursor, Cursor, CursorExt, Element, SequenceRef};

/// Drain a cursor into a vector.
pub async fn to_list<T: Element>(
    cursor: &dyn Cursor<T>,
    cancel: &CancellationToken,
) -> SequenceResult<Vec<T>> {
    let mut items = Vec::new();
    while let Some(item) = cursor.next_value(cancel).await? {
        items.push(item);
    }
    Ok(items)
}

/// Start `sequence` under `context`, drain it, and wait for every cleanup
/// future the cursor hands back before returning.
pub async fn to_list_async<T: Element>(
    sequence: &SequenceRef<T>,
    context: &Context,
) -> SequenceResult<Vec<T>> {
    let cursor = sequence.start(context);
    let cancel = CancellationToken::new();
    let outcome = to_list(cursor.as_ref(), &cancel).await;
    futures::future::join_all(cursor.stop()).await;
    outcome
}

/// Expose a cursor as a `futures::Stream`. The stream ends after the first
/// error, which is yielded as its last item.
pub fn into_stream<T: Element>(cursor: BoxCursor<T>) -> BoxStream<'static, SequenceResult<T>> {
    let cancel = CancellationToken::new();
    stream::unfold(Some((cursor, cancel)), |state| async move {
        let (cursor, cancel) = state?;
        match cursor.next_value(&cancel).await {
            Ok(Some(item)) => Some((Ok(item), Some((cursor, cancel)))),
            Ok(None) => None,
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sources::{fail, from_iter, range};
    use crate::errors::SequenceError;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_into_stream_round_trips_elements() {
        let cursor = range(0, 4).start(&Context::new());
        let items: Vec<i64> = into_stream(cursor).try_collect().await.unwrap();
        assert_eq!(items, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_into_stream_ends_after_error() {
        let cursor = fail::<u8>(SequenceError::msg("bad")).start(&Context::new());
        let items: Vec<SequenceResult<u8>> = into_stream(cursor).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn test_to_list_is_idempotent_across_fresh_contexts() {
        let seq = from_iter(vec![3, 1, 2]);
        let a = to_list_async(&seq, &Context::new()).await.unwrap();
        let b = to_list_async(&seq, &Context::new()).await.unwrap();
        assert_eq!(a, b);
    }
}
