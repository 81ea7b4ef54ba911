//! Async streams over tokio broadcast channels

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Turn a broadcast receiver into a stream that ends when the sender is gone
///
/// A subscriber that falls behind skips the overwritten items and keeps
/// going; the gap is logged with `name`.
pub fn broadcast_stream<T>(receiver: broadcast::Receiver<T>, name: &'static str) -> BoxStream<'static, T>
where
    T: Clone + Send + 'static,
{
    futures::stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(item) => return Some((item, receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(stream = name, skipped, "Subscriber lagged behind, items dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_ends_with_sender() {
        let (tx, rx) = broadcast::channel(4);
        let mut stream = broadcast_stream(rx, "test");
        tx.send(1u32).unwrap();
        tx.send(2u32).unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.next().await, Some(2));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_continues() {
        let (tx, rx) = broadcast::channel(2);
        let mut stream = broadcast_stream(rx, "test");
        for i in 0..5u32 {
            tx.send(i).unwrap();
        }
        drop(tx);

        let rest: Vec<u32> = stream.by_ref().collect().await;
        assert_eq!(rest, vec![3, 4]);
    }
}
