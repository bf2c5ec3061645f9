//! DSI Collector - EEG实验数据采集核心库
//!
//! 从DSI-Streamer的TCP字节流重建数据包，驱动定时实验流程
//! （放松/动作交替提示），并保证按设备时钟采满名义时长后才判定完成。

/// 传输层: 精确字节读取与TCP连接
pub mod transport;

/// 协议层: DSI帧的构造与解码
pub mod protocol;

/// 实验时间轴
pub mod timeline;

/// 1秒节拍提示时钟
pub mod clock;

/// 会话状态机
pub mod session;

/// 采样落盘
pub mod sink;

/// 重新导出常用类型
pub use protocol::{event_name, Packet, PacketDecoder, CHANNEL_COUNT};
pub use session::{
    ControlSignal, SessionController, SessionError, SessionPhase, SessionSummary, StatusEvent,
};
pub use sink::{CsvSink, MemorySink, SampleSink};
pub use timeline::{ExperimentDefinition, Timeline};
pub use transport::{CollectorConfig, FrameReader, TransportError};

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 日志系统
pub mod logging;
