//! Per-socket ordered write queue (C1): a FIFO of outbound buffers drained by
//! a single task owning the socket, so writes on one connection land on the
//! wire in submission order and never interleave, regardless of how many
//! reactor worker threads are running.

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// Bounded so a stalled peer can't grow memory without limit; overflow is
/// surfaced to the caller as an error rather than silently queuing forever.
pub const WRITE_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum WriteQueueError {
    #[error("write queue overflow: more than {0} writes in flight")]
    Overflow(usize),
    #[error("writer task is gone")]
    Closed,
}

struct QueuedWrite {
    data: Vec<u8>,
    done: oneshot::Sender<std::io::Result<()>>,
}

/// Handle to a spawned write-pump task. Cloning shares the same queue.
#[derive(Clone)]
pub struct OrderedWriter {
    tx: mpsc::Sender<QueuedWrite>,
}

impl OrderedWriter {
    /// Spawn the pump task owning `sink`. The task exits once every handle is
    /// dropped and the queue drains.
    pub fn spawn<W>(mut sink: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<QueuedWrite>(WRITE_QUEUE_CAPACITY);

        tokio::spawn(async move {
            let mut poisoned = false;
            while let Some(item) = rx.recv().await {
                if poisoned {
                    let _ = item.done.send(Err(cancelled_error()));
                    continue;
                }
                let result = async {
                    sink.write_all(&item.data).await?;
                    sink.flush().await
                }
                .await;
                if result.is_err() {
                    poisoned = true;
                }
                let _ = item.done.send(result);
            }
            let _ = sink.shutdown().await;
        });

        Self { tx }
    }

    /// Append `data` to the FIFO. Returns immediately; the returned receiver
    /// resolves once this write (and everything queued before it) has been
    /// attempted.
    pub fn enqueue(&self, data: Vec<u8>) -> Result<oneshot::Receiver<std::io::Result<()>>, WriteQueueError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .try_send(QueuedWrite { data, done: done_tx })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => WriteQueueError::Overflow(WRITE_QUEUE_CAPACITY),
                mpsc::error::TrySendError::Closed(_) => WriteQueueError::Closed,
            })?;
        Ok(done_rx)
    }
}

fn cancelled_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "write queue cancelled after a previous write failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_land_in_submission_order() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let writer = OrderedWriter::spawn(client);

        let mut dones = Vec::new();
        for i in 0..50u32 {
            dones.push(writer.enqueue(format!("{i}\n").into_bytes()).unwrap());
        }
        for done in dones {
            done.await.unwrap().unwrap();
        }
        drop(writer);

        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        server.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<u32> = text.lines().map(|l| l.parse().unwrap()).collect();
        assert_eq!(lines, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn overflow_is_reported_without_blocking() {
        let (client, _server) = tokio::io::duplex(1);
        let writer = OrderedWriter::spawn(client);

        let mut overflowed = false;
        for _ in 0..(WRITE_QUEUE_CAPACITY + 16) {
            if writer.enqueue(vec![0u8; 4096]).is_err() {
                overflowed = true;
                break;
            }
        }
        assert!(overflowed);
    }
}
