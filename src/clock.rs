//! 时钟模块 - 1秒节拍的提示计时器
//!
//! 观察到 Data Start 事件后才启动。每个节拍递增整数秒计数，
//! 推进时间轴游标并上报提示变迁；计数达到名义时长时向会话控制器
//! 发出信号后自行停止。采集是否完整由控制器裁定，时钟不参与。
//!
//! 停止通过关闭通道传递（`recv_timeout` 兼作节拍睡眠与取消点），
//! 不使用裸共享标志。

use crate::session::{ControlSignal, StatusEvent};
use crate::timeline::Timeline;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

/// 运行中时钟的句柄
pub struct ClockHandle {
    shutdown_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ClockHandle {
    /// 停止时钟并等待线程退出
    pub fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// 启动时钟线程
///
/// * `control_tx` - 达到名义时长时发送 `NominalDurationReached`
/// * `status_tx` - 提示变迁与计时到期的状态事件
pub fn spawn(
    timeline: Arc<Timeline>,
    control_tx: Sender<ControlSignal>,
    status_tx: Sender<StatusEvent>,
) -> ClockHandle {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let join = std::thread::Builder::new()
        .name("dsi-clock".to_string())
        .spawn(move || {
            let nominal = timeline.nominal_duration();
            let mut cursor = timeline.cursor();
            let mut seconds: u64 = 0;

            loop {
                // 节拍睡眠，收到停止信号或对端消失则立即退出
                match shutdown_rx.recv_timeout(Duration::from_secs(1)) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }

                seconds += 1;
                debug!("计时 {:02}:{:02}", seconds / 60, seconds % 60);

                if let Some(prompt) = cursor.advance(seconds as f64) {
                    info!("{:02}秒: {}", seconds, prompt);
                    let _ = status_tx.send(StatusEvent::Prompt {
                        second: seconds,
                        label: prompt.to_string(),
                    });
                }

                if seconds as f64 >= nominal {
                    info!("计时到期（名义时长{:.2}秒）", nominal);
                    let _ = status_tx.send(StatusEvent::TimerExpired);
                    let _ = control_tx.send(ControlSignal::NominalDurationReached);
                    break;
                }
            }
        })
        .expect("时钟线程创建失败");

    ClockHandle {
        shutdown_tx,
        join: Some(join),
    }
}
