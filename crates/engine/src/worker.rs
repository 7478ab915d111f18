//! 레인별 워커 풀
//!
//! 레인마다 `concurrency(lane)`개의 tokio 태스크가 큐에서 전달을 받아
//! [`ModuleRunner`]로 처리합니다. 워커 하나는 한 번에 실행 하나만 처리합니다.
//!
//! - 실행기가 `Ok`를 반환하면 전달을 ack합니다.
//! - 실행기가 `Err`(저장소 에러)를 반환하면 ack하지 않고 `retry_delay` 후
//!   재전달되도록 nack합니다.
//! - 다른 실행기가 선점 중이면(`InFlight`) 그 선점의 임대가 끝날 때쯤
//!   다시 전달되도록 nack합니다. 선점이 끝내 종료되지 않으면 재전달이 인수합니다.
//!
//! 종료 토큰이 취소되면 워커는 새 전달을 받지 않고, 처리 중인 실행은 끝까지 마칩니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use centinela_core::config::WorkerConfig;
use centinela_core::metrics as m;
use centinela_core::queue::{Delivery, Lane, TaskConsumer};
use centinela_core::store::StatusStore;

use crate::runner::{ModuleRunner, RunOutcome};

/// 실행 중인 워커 태스크 묶음
pub struct WorkerPool {
    handles: Vec<(Lane, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// 두 레인의 워커를 모두 시작합니다.
    pub fn spawn<S, C>(
        runner: ModuleRunner<S>,
        consumer: Arc<C>,
        config: &WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self
    where
        S: StatusStore,
        C: TaskConsumer,
    {
        let retry_delay = config.retry_delay();
        let mut handles = Vec::new();

        for lane in Lane::ALL {
            let count = config.concurrency(lane);
            for index in 0..count {
                let worker = Worker {
                    lane,
                    index,
                    runner: runner.clone(),
                    consumer: Arc::clone(&consumer),
                    retry_delay,
                    shutdown: shutdown.clone(),
                };
                handles.push((lane, tokio::spawn(worker.run())));
            }
            info!(lane = %lane, workers = count, "lane workers started");
        }

        Self { handles, shutdown }
    }

    /// 레인별 워커 수
    pub fn workers(&self, lane: Lane) -> usize {
        self.handles.iter().filter(|(l, _)| *l == lane).count()
    }

    /// 아직 실행 중인 레인별 워커 수 (헬스 체크용)
    pub fn live_workers(&self, lane: Lane) -> usize {
        self.handles
            .iter()
            .filter(|(l, handle)| *l == lane && !handle.is_finished())
            .count()
    }

    /// 새 전달 수신을 멈추도록 신호합니다.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// 모든 워커가 끝날 때까지 기다립니다.
    pub async fn join(self) {
        for (lane, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(lane = %lane, error = %e, "worker task terminated abnormally");
            }
        }
        debug!("all workers stopped");
    }
}

struct Worker<S, C> {
    lane: Lane,
    index: usize,
    runner: ModuleRunner<S>,
    consumer: Arc<C>,
    retry_delay: Duration,
    shutdown: CancellationToken,
}

impl<S, C> Worker<S, C>
where
    S: StatusStore,
    C: TaskConsumer,
{
    async fn run(self) {
        debug!(lane = %self.lane, worker = self.index, "worker started");
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = self.consumer.receive(self.lane) => received,
            };

            match received {
                Ok(Some(delivery)) => self.handle(delivery).await,
                Ok(None) => {
                    debug!(lane = %self.lane, worker = self.index, "queue closed");
                    break;
                }
                Err(e) => {
                    warn!(
                        lane = %self.lane,
                        worker = self.index,
                        error = %e,
                        "receive failed, backing off"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
        debug!(lane = %self.lane, worker = self.index, "worker stopped");
    }

    async fn handle(&self, delivery: Delivery) {
        let task = &delivery.task;
        match self.runner.execute(task.execution_id).await {
            Ok(RunOutcome::InFlight { retry_after }) => {
                let delay = retry_after.max(self.retry_delay);
                metrics::counter!(m::QUEUE_TASKS_NACKED_TOTAL, m::LABEL_LANE => self.lane.as_str())
                    .increment(1);
                debug!(
                    execution_id = %task.execution_id,
                    module = %task.module,
                    delay_secs = delay.as_secs(),
                    "execution claimed elsewhere, delivery deferred"
                );
                if let Err(e) = self.consumer.nack(&delivery, delay).await {
                    warn!(execution_id = %task.execution_id, error = %e, "nack failed");
                }
            }
            Ok(outcome) => {
                debug!(
                    execution_id = %task.execution_id,
                    module = %task.module,
                    outcome = ?outcome,
                    "delivery processed"
                );
                if let Err(e) = self.consumer.ack(&delivery).await {
                    warn!(execution_id = %task.execution_id, error = %e, "ack failed");
                }
            }
            Err(e) => {
                metrics::counter!(m::QUEUE_TASKS_NACKED_TOTAL, m::LABEL_LANE => self.lane.as_str())
                    .increment(1);
                warn!(
                    scan_id = %task.scan_id,
                    execution_id = %task.execution_id,
                    module = %task.module,
                    attempt = delivery.attempt,
                    error = %e,
                    "delivery left unacknowledged"
                );
                if let Err(e) = self.consumer.nack(&delivery, self.retry_delay).await {
                    warn!(execution_id = %task.execution_id, error = %e, "nack failed");
                }
            }
        }
    }
}
