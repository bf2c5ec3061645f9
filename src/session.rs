//! 会话控制模块 - 连接 → 采集 → 补漏 → 关闭 的状态机
//!
//! 核心正确性: 本地停止信号（墙钟计时到期或外部请求）与数据完整性
//! 是两回事。网络投递是突发的、滞后的，采够没采够由设备自己的时间戳
//! 裁定，而不是墙钟。因此采集环退出后无条件进入补漏阶段，把设备缓冲
//! 里积压的数据追到名义时长为止，除非传输本身先断掉。
//!
//! 线程模型: 采集环（本模块）、时钟线程、外部调用方三方只通过mpsc通道
//! 交换信号。`SessionState` 各字段由控制器独占持有，绝不暴露可变引用。

use crate::clock::{self, ClockHandle};
use crate::protocol::{
    event_name, DecodeError, Packet, PacketDecoder, EVENT_DATA_START,
};
use crate::sink::SampleSink;
use crate::timeline::Timeline;
use crate::transport::{self, CollectorConfig};
use std::io::Read;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Closed,
    /// 连接失败时的中止相。瞬态: 控制器发出`ConnectionRefused`后随即
    /// 回落为`Idle`，外部查询只会看到回落后的状态
    Aborted,
}

/// 跨线程控制信号（经同步通道投递，采集环在每轮迭代边界检查）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// 外部停止请求
    StopRequested,

    /// 时钟报告名义时长已到
    NominalDurationReached,
}

/// 状态事件: 有序的短文本事件流，渲染由外部负责
#[derive(Debug, Clone)]
pub enum StatusEvent {
    Connected,
    ConnectionRefused,
    EventPacket { code: u32, name: &'static str },
    /// 收到 Data Start，采集正式开始（时钟随之启动）
    CollectionStarted,
    ReservedPacket { packet_type: u8 },
    Prompt { second: u64, label: String },
    TimerExpired,
    /// 流耗尽或断裂，不再有新数据
    StreamEnded,
    /// 进入补漏阶段且尚有缺口
    BacklogStart,
    Summary(SessionSummary),
    Closed,
}

/// 会话结束时的统计摘要
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,

    /// 实际捕获的设备时钟跨度（无数据时为0）
    pub captured_seconds: f64,

    /// 补漏阶段追回的跨度
    pub backlog_seconds: f64,

    pub start_timestamp: Option<f32>,
    pub backlog_timestamp: Option<f32>,
    pub end_timestamp: Option<f32>,

    /// 成功落盘的采样条数
    pub samples_written: u64,
}

/// 会话错误类型
///
/// 所有终态都伴随状态事件且文件句柄已关闭，没有错误被吞掉。
/// 本层不做任何自动重试，重连策略属于外部编排层。
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("连接被拒绝: {0}")]
    ConnectionRefused(#[source] std::io::Error),

    #[error("采集不完整: 已捕获{captured:.2}秒, 名义时长{nominal:.2}秒")]
    PartialCapture { captured: f64, nominal: f64 },

    #[error("采样落盘失败: {0}")]
    SinkWrite(#[source] std::io::Error),
}

/// 设备时间戳状态，控制器独占持有
#[derive(Debug, Default)]
struct SessionState {
    start_timestamp: Option<f32>,
    last_timestamp: Option<f32>,
    backlog_timestamp: Option<f32>,
}

impl SessionState {
    // 无数据按0秒计: Data Start后立即断流不得崩溃
    fn captured(&self) -> f64 {
        match (self.start_timestamp, self.last_timestamp) {
            (Some(start), Some(last)) => (last - start) as f64,
            _ => 0.0,
        }
    }

    // 补漏前没有任何数据时，整个捕获跨度都算补漏
    fn backlog(&self) -> f64 {
        match (
            self.backlog_timestamp.or(self.start_timestamp),
            self.last_timestamp,
        ) {
            (Some(mark), Some(last)) => (last - mark) as f64,
            _ => 0.0,
        }
    }

    fn reset(&mut self) {
        self.start_timestamp = None;
        self.last_timestamp = None;
        self.backlog_timestamp = None;
    }
}

/// 会话控制器
pub struct SessionController {
    timeline: Arc<Timeline>,
    status_tx: Sender<StatusEvent>,
    control_tx: Sender<ControlSignal>,
    control_rx: Receiver<ControlSignal>,
    phase: SessionPhase,
    state: SessionState,
    session_id: Uuid,
    samples_written: u64,
    clock: Option<ClockHandle>,
}

impl SessionController {
    /// 创建控制器
    ///
    /// * `timeline` - 本次会话的提示计划表（每次会话重新构建）
    /// * `status_tx` - 状态事件接收端由外部持有并渲染
    pub fn new(timeline: Timeline, status_tx: Sender<StatusEvent>) -> Self {
        let (control_tx, control_rx) = mpsc::channel();
        Self {
            timeline: Arc::new(timeline),
            status_tx,
            control_tx,
            control_rx,
            phase: SessionPhase::Idle,
            state: SessionState::default(),
            session_id: Uuid::new_v4(),
            samples_written: 0,
            clock: None,
        }
    }

    /// 当前阶段
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// 外部停止句柄（可跨线程发送 `ControlSignal::StopRequested`）
    pub fn control_sender(&self) -> Sender<ControlSignal> {
        self.control_tx.clone()
    }

    /// 为后续会话更换新构建的时间轴（Closed → Connecting 的前置步骤）
    pub fn set_timeline(&mut self, timeline: Timeline) {
        self.timeline = Arc::new(timeline);
    }

    /// 连接设备并运行一次完整会话
    pub fn run_tcp<S: SampleSink>(
        &mut self,
        config: &CollectorConfig,
        sink: &mut S,
    ) -> Result<SessionSummary, SessionError> {
        self.phase = SessionPhase::Connecting;
        info!("会话{} 连接 {} ...", self.session_id, config.endpoint);

        let stream = match transport::connect(config) {
            Ok(stream) => stream,
            Err(e) => {
                error!("连接被拒绝: {}", e);
                self.emit(StatusEvent::ConnectionRefused);
                // 中止: 未捕获任何数据，回到Idle等待下次发起
                self.phase = SessionPhase::Idle;
                return Err(SessionError::ConnectionRefused(e));
            }
        };

        self.emit(StatusEvent::Connected);
        self.run_stream(stream, sink)
    }

    /// 在已建立的字节流上运行一次完整会话
    ///
    /// 传输抽象为任意 `io::Read`，测试可直接喂内存字节流。
    pub fn run_stream<R: Read, S: SampleSink>(
        &mut self,
        transport: R,
        sink: &mut S,
    ) -> Result<SessionSummary, SessionError> {
        self.session_id = Uuid::new_v4();
        self.samples_written = 0;
        self.state.reset();

        // 清空上次会话遗留的过期信号: 补漏阶段不消费控制通道，时钟在
        // 补漏期间送达的到时信号（或迟到的外部停止）会滞留到下次会话
        while self.control_rx.try_recv().is_ok() {}

        let mut decoder = PacketDecoder::new(transport);
        let nominal = self.timeline.nominal_duration();
        let mut transport_failed = false;
        let mut sink_failure: Option<std::io::Error> = None;

        // === 采集阶段 ===
        self.phase = SessionPhase::Streaming;
        loop {
            // 停止信号只在迭代边界生效（解码中途不可抢占）
            match self.control_rx.try_recv() {
                Ok(ControlSignal::StopRequested) => {
                    info!("收到停止请求，结束采集环");
                    break;
                }
                Ok(ControlSignal::NominalDurationReached) => {
                    info!("名义时长已到，结束采集环");
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }

            match decoder.decode_next() {
                Ok(packet) => {
                    if let Err(e) = self.handle_packet(packet, sink) {
                        error!("采样落盘失败, 中止会话: {}", e);
                        sink_failure = Some(e);
                        break;
                    }
                }
                Err(e) => {
                    self.report_stream_end(&e);
                    transport_failed = true;
                    break;
                }
            }
        }

        // === 补漏阶段 ===
        // 无条件进入: 设备侧缓冲可能滞后于墙钟，名义时长必须用设备
        // 时间戳核对
        self.phase = SessionPhase::Draining;
        self.state.backlog_timestamp = self.state.last_timestamp;

        if !transport_failed && sink_failure.is_none() && self.state.captured() < nominal {
            info!(
                "已捕获{:.2}秒, 名义{:.2}秒, 开始追补积压数据",
                self.state.captured(),
                nominal
            );
            self.emit(StatusEvent::BacklogStart);
        }

        while !transport_failed && sink_failure.is_none() && self.state.captured() < nominal {
            match decoder.decode_next() {
                Ok(packet) => {
                    if let Err(e) = self.handle_packet(packet, sink) {
                        error!("补漏期间采样落盘失败, 中止会话: {}", e);
                        sink_failure = Some(e);
                    }
                }
                Err(e) => {
                    self.report_stream_end(&e);
                    transport_failed = true;
                }
            }
        }

        // === 关闭 ===
        self.close_session(nominal, transport_failed, sink_failure, sink)
    }

    // 采集与补漏阶段对数据包的处理完全一致。唯一的失败来源是落盘
    fn handle_packet<S: SampleSink>(
        &mut self,
        packet: Packet,
        sink: &mut S,
    ) -> std::io::Result<()> {
        match packet {
            Packet::Event { code } => {
                let name = event_name(code);
                info!("事件包: {} (code={})", name, code);
                self.emit(StatusEvent::EventPacket { code, name });

                if code == EVENT_DATA_START && self.clock.is_none() {
                    info!("设备开始输出数据，启动时钟");
                    self.emit(StatusEvent::CollectionStarted);
                    self.clock = Some(clock::spawn(
                        Arc::clone(&self.timeline),
                        self.control_tx.clone(),
                        self.status_tx.clone(),
                    ));
                }
            }

            Packet::Data {
                timestamp,
                channels,
            } => {
                if self.state.start_timestamp.is_none() {
                    self.state.start_timestamp = Some(timestamp);
                    debug!("首个数据包，设备时间戳{:.2}", timestamp);
                }
                self.state.last_timestamp = Some(timestamp);

                sink.write_sample(timestamp, &channels)?;
                self.samples_written += 1;
            }

            Packet::Reserved { packet_type } => {
                debug!("保留包: 类型{}", packet_type);
                self.emit(StatusEvent::ReservedPacket { packet_type });
            }
        }
        Ok(())
    }

    fn report_stream_end(&mut self, e: &DecodeError) {
        warn!("流已结束: {}", e);
        self.emit(StatusEvent::StreamEnded);
    }

    fn close_session<S: SampleSink>(
        &mut self,
        nominal: f64,
        transport_failed: bool,
        sink_failure: Option<std::io::Error>,
        sink: &mut S,
    ) -> Result<SessionSummary, SessionError> {
        // 时钟可能还在跑（传输先断）或已自行停止，统一收掉
        if let Some(clock) = self.clock.take() {
            clock.stop();
        }

        // 所有退出路径统一关闭落盘句柄
        if let Err(e) = sink.finish() {
            error!("落盘收尾失败: {}", e);
        }

        let captured = self.state.captured();
        let summary = SessionSummary {
            session_id: self.session_id,
            captured_seconds: captured,
            backlog_seconds: self.state.backlog(),
            start_timestamp: self.state.start_timestamp,
            backlog_timestamp: self.state.backlog_timestamp,
            end_timestamp: self.state.last_timestamp,
            samples_written: self.samples_written,
        };

        info!(
            "会话{}关闭: 捕获{:.2}秒, 追补{:.2}秒, 落盘{}条",
            summary.session_id,
            summary.captured_seconds,
            summary.backlog_seconds,
            summary.samples_written
        );
        self.emit(StatusEvent::Summary(summary.clone()));
        self.emit(StatusEvent::Closed);

        self.state.reset();
        self.phase = SessionPhase::Closed;

        // 落盘失败优先上报: 文件已是截断的，时长再完整也不可用
        if let Some(e) = sink_failure {
            return Err(SessionError::SinkWrite(e));
        }

        // 只有传输失败才允许带着缺口关闭，且必须明确上报为不完整采集
        if captured < nominal {
            debug_assert!(transport_failed, "补漏阶段未达名义时长却没有传输失败");
            return Err(SessionError::PartialCapture { captured, nominal });
        }

        Ok(summary)
    }

    fn emit(&self, event: StatusEvent) {
        // 接收端掉线不影响会话本身
        let _ = self.status_tx.send(event);
    }
}
