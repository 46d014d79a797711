//! Pull-based record streaming primitives.
//!
//! A [`RecordStream`] is a bounded channel of `Result<T>` with a capacity
//! of one record, so every stage of the transfer pipeline observes strict
//! one-record-at-a-time flow with backpressure: the producer cannot run
//! ahead of the consumer by more than one record.
//!
//! Operators ([`filter`](RecordStream::filter), [`map`](RecordStream::map))
//! spawn a small relay task that pulls from the upstream channel, applies
//! the user function, and pushes downstream through another bounded
//! channel. [`collect`](RecordStream::collect) drains a stream into memory
//! and is reserved for small, bounded streams such as schema descriptors.

use std::future::Future;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;

/// Channel capacity between pipeline operators.
///
/// One in-flight record plus the record the consumer currently holds is
/// the memory bound the whole engine is designed around.
pub const STAGE_BUFFER: usize = 1;

/// A finite, non-restartable stream of typed records.
#[derive(Debug)]
pub struct RecordStream<T> {
    rx: mpsc::Receiver<Result<T>>,
}

/// Content chunks of a single asset.
pub type ByteStream = RecordStream<Bytes>;

impl<T: Send + 'static> RecordStream<T> {
    /// Wrap an existing channel receiver.
    pub fn from_receiver(rx: mpsc::Receiver<Result<T>>) -> Self {
        Self { rx }
    }

    /// Create a bounded channel and the stream reading from it.
    ///
    /// Providers use this to hand the sender to a background producer
    /// task while returning the stream to the pipeline.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<T>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Stream over an in-memory collection.
    ///
    /// A feeder task pushes items through a capacity-one channel, so even
    /// pre-materialized collections observe the flow contract.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send,
    {
        let (tx, stream) = Self::channel(STAGE_BUFFER);
        tokio::spawn(async move {
            for item in items {
                if tx.send(Ok(item)).await.is_err() {
                    // Consumer went away; stop producing.
                    break;
                }
            }
        });
        stream
    }

    /// An immediately exhausted stream.
    pub fn empty() -> Self {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        Self { rx }
    }

    /// Pull the next record, or `None` when the stream is exhausted.
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }

    /// Lazily drop records failing the predicate.
    ///
    /// The predicate may be asynchronous. Records are evaluated one at a
    /// time; a dropped record immediately triggers a pull of the next
    /// upstream record. Stream errors pass through unchanged.
    pub fn filter<P>(mut self, mut predicate: P) -> RecordStream<T>
    where
        P: for<'a> FnMut(&'a T) -> BoxFuture<'a, bool> + Send + 'static,
    {
        let (tx, out) = RecordStream::channel(STAGE_BUFFER);
        tokio::spawn(async move {
            while let Some(item) = self.rx.recv().await {
                match item {
                    Ok(record) => {
                        if predicate(&record).await
                            && tx.send(Ok(record)).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });
        out
    }

    /// Lazily transform each record.
    ///
    /// If `f` fails, the error propagates downstream as a stream failure
    /// and no further upstream records are pulled; the consuming stage
    /// decides whether that is stage-fatal.
    pub fn map<U, F, Fut>(mut self, mut f: F) -> RecordStream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U>> + Send,
    {
        let (tx, out) = RecordStream::channel(STAGE_BUFFER);
        tokio::spawn(async move {
            while let Some(item) = self.rx.recv().await {
                let forwarded = match item {
                    Ok(record) => f(record).await,
                    Err(e) => Err(e),
                };
                let failed = forwarded.is_err();
                if tx.send(forwarded).await.is_err() || failed {
                    break;
                }
            }
        });
        out
    }

    /// Drain the entire stream into an ordered sequence.
    ///
    /// Fails on the first stream error. Only for small, bounded streams;
    /// entities and assets must stay fully streamed.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item?);
        }
        Ok(items)
    }
}
