//! Bounded channels for backpressure between ingest workers and the sink.

use tokio::sync::mpsc;

use crate::config::PipelineConfig;

/// Create a bounded channel pair with the configured buffer size.
///
/// When the buffer is full, workers block on send until the consumer has
/// flushed a run. Workers keep their pool slot while blocked, so at most
/// `buffer_size + parallel_workers` finished runs wait for the sink.
pub fn bounded_channel<T>(config: &PipelineConfig) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(config.buffer_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_channel_applies_backpressure() {
        let config = PipelineConfig { buffer_size: 1 };
        let (tx, mut rx) = bounded_channel::<i32>(&config);

        tx.send(42).await.unwrap();
        assert!(tx.try_send(43).is_err());

        assert_eq!(rx.recv().await, Some(42));
        tx.try_send(43).unwrap();
        assert_eq!(rx.recv().await, Some(43));
    }
}
