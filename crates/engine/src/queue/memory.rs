//! 인메모리 작업 큐
//!
//! 레인마다 unbounded mpsc 채널 하나를 둡니다. 같은 레인의 워커들은
//! 수신 측을 `tokio::sync::Mutex`로 공유합니다.
//! `nack`된 전달은 지연 후 같은 레인에 다시 넣어집니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use centinela_core::error::QueueError;
use centinela_core::queue::{Delivery, Lane, ModuleTask, TaskConsumer, TaskQueue};

struct LaneChannel {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Mutex<mpsc::UnboundedReceiver<Delivery>>,
}

impl LaneChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

/// 인메모리 [`TaskQueue`] + [`TaskConsumer`] 구현
pub struct MemoryTaskQueue {
    default_lane: LaneChannel,
    heavy_lane: LaneChannel,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self {
            default_lane: LaneChannel::new(),
            heavy_lane: LaneChannel::new(),
            next_id: AtomicU64::new(1),
            closed: CancellationToken::new(),
        }
    }

    fn lane(&self, lane: Lane) -> &LaneChannel {
        match lane {
            Lane::Default => &self.default_lane,
            Lane::Heavy => &self.heavy_lane,
        }
    }

    /// 큐를 닫습니다. 대기 중인 `receive`는 `None`을 반환합니다.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// 큐가 닫혔으면 `true`
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl TaskQueue for MemoryTaskQueue {
    async fn submit(&self, task: ModuleTask) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let delivery = Delivery {
            delivery_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            attempt: 1,
            task,
        };
        self.lane(delivery.task.lane)
            .tx
            .send(delivery)
            .map_err(|_| QueueError::Closed)
    }
}

impl TaskConsumer for MemoryTaskQueue {
    async fn receive(&self, lane: Lane) -> Result<Option<Delivery>, QueueError> {
        if self.is_closed() {
            return Ok(None);
        }
        let mut rx = self.lane(lane).rx.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Ok(None),
            delivery = rx.recv() => Ok(delivery),
        }
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), QueueError> {
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let retry = Delivery {
            attempt: delivery.attempt.saturating_add(1),
            ..delivery.clone()
        };
        let tx = self.lane(retry.task.lane).tx.clone();
        let closed = self.closed.clone();
        debug!(
            execution_id = %retry.task.execution_id,
            attempt = retry.attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling in-memory redelivery"
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = closed.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(retry);
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use centinela_core::types::{ExecutionId, ScanId};

    fn task(lane: Lane) -> ModuleTask {
        ModuleTask {
            execution_id: ExecutionId::new(),
            scan_id: ScanId::new(),
            module: "dns".to_owned(),
            lane,
        }
    }

    #[tokio::test]
    async fn lanes_are_independent() {
        let queue = MemoryTaskQueue::new();
        let heavy = task(Lane::Heavy);
        let default = task(Lane::Default);
        queue.submit(heavy.clone()).await.unwrap();
        queue.submit(default.clone()).await.unwrap();

        let got = queue.receive(Lane::Default).await.unwrap().unwrap();
        assert_eq!(got.task, default);
        assert_eq!(got.attempt, 1);
        let got = queue.receive(Lane::Heavy).await.unwrap().unwrap();
        assert_eq!(got.task, heavy);
    }

    #[tokio::test]
    async fn close_unblocks_receivers_and_rejects_submit() {
        let queue = std::sync::Arc::new(MemoryTaskQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.receive(Lane::Heavy).await })
        };
        tokio::task::yield_now().await;
        queue.close();

        assert!(waiter.await.unwrap().unwrap().is_none());
        assert!(matches!(
            queue.submit(task(Lane::Default)).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn nack_redelivers_with_incremented_attempt() {
        let queue = MemoryTaskQueue::new();
        queue.submit(task(Lane::Default)).await.unwrap();
        let first = queue.receive(Lane::Default).await.unwrap().unwrap();

        queue
            .nack(&first, Duration::from_millis(10))
            .await
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), queue.receive(Lane::Default))
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(second.task, first.task);
        assert_eq!(second.attempt, 2);
        assert!(second.is_redelivery());
    }
}
