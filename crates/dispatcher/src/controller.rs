use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::assignment::AssignmentEngine;
use crate::liveness::LivenessMonitor;
use crate::timeout::TimeoutSweeper;

#[derive(Debug, Clone)]
pub struct SchedulerLoopConfig {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl SchedulerLoopConfig {
    /// 超时清扫周期固定为分配周期的十倍，超时本身是分钟级的
    pub fn sweep_interval(&self) -> Duration {
        self.poll_interval * 10
    }
}

/// 调度驱动器
///
/// 单写者：同一时刻只允许一个实例运行。三个循环在同一个任务上
/// 协作式推进，单轮内的存储操作各自原子，循环间无共享写冲突。
/// 收到关闭信号后不再接受新的tick，当前在途的一轮执行完后返回。
pub struct SchedulerController {
    assignment: AssignmentEngine,
    liveness: LivenessMonitor,
    sweeper: TimeoutSweeper,
    config: SchedulerLoopConfig,
}

impl SchedulerController {
    pub fn new(
        assignment: AssignmentEngine,
        liveness: LivenessMonitor,
        sweeper: TimeoutSweeper,
        config: SchedulerLoopConfig,
    ) -> Self {
        Self {
            assignment,
            liveness,
            sweeper,
            config,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "调度循环启动: 分配周期 {:?}，失联检测周期 {:?}，超时清扫周期 {:?}",
            self.config.poll_interval,
            self.config.heartbeat_interval,
            self.config.sweep_interval()
        );

        let mut assign_tick = tokio::time::interval(self.config.poll_interval);
        let mut liveness_tick = tokio::time::interval(self.config.heartbeat_interval);
        let mut sweep_tick = tokio::time::interval(self.config.sweep_interval());
        // 单轮耗时超过周期时不补发积压的tick
        assign_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        liveness_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = assign_tick.tick() => {
                    if let Err(e) = self.assignment.run_once().await {
                        warn!("分配循环本轮失败，下个周期重试: {}", e);
                    }
                }
                _ = liveness_tick.tick() => {
                    if let Err(e) = self.liveness.run_once().await {
                        warn!("失联检测本轮失败，下个周期重试: {}", e);
                    }
                }
                _ = sweep_tick.tick() => {
                    if let Err(e) = self.sweeper.run_once().await {
                        warn!("超时清扫本轮失败，下个周期重试: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("调度循环收到关闭信号");
                    break;
                }
            }
        }

        info!("调度循环已停止");
    }
}
