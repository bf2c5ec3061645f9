//! 协议模块 - DSI二进制帧的构造与解码
//!
//! 帧格式（全部大端序）:
//!
//! ```text
//! [0..5]   魔数 "@ABCD"
//! [5]      包类型 (1=数据, 5=事件, 其余保留)
//! [6..8]   包体长度 N (u16)
//! [8..12]  序号
//! [12..]   N 字节包体
//! ```
//!
//! 数据包体: `[12..16]` 为 float32 设备时间戳，`[23..123]` 为 25 路 float32 通道值。
//! 事件包体: `[12..16]` 为 u32 事件码。
//!
//! 解码器是纯翻译层: 除了阻塞读取没有任何副作用。
//! 残缺帧一律按传输失败处理，不做恢复（短读与连接垂死无法区分）。

use crate::transport::{FrameReader, TransportError};
use std::io::Read;
use thiserror::Error;

/// 帧头固定长度
pub const HEADER_LEN: usize = 12;

/// 帧头中包类型所在偏移
pub const TYPE_OFFSET: usize = 5;

/// 数据包通道数
pub const CHANNEL_COUNT: usize = 25;

/// 通道块在整帧内的起始偏移
pub const CHANNEL_OFFSET: usize = 23;

/// 包类型: 数据
pub const PACKET_TYPE_DATA: u8 = 1;

/// 包类型: 事件
pub const PACKET_TYPE_EVENT: u8 = 5;

/// 事件码: 数据输出开始
pub const EVENT_DATA_START: u32 = 2;

/// 事件码: 数据输出停止
pub const EVENT_DATA_STOP: u32 = 3;

/// 帧头魔数
pub const FRAME_MAGIC: [u8; 5] = *b"@ABCD";

/// 解码错误类型
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("帧不完整: {0}")]
    FrameIncomplete(#[from] TransportError),

    #[error("包体过短: 类型{packet_type}, 整帧需要{needed}字节, 实际{got}字节")]
    ShortBody {
        packet_type: u8,
        needed: usize,
        got: usize,
    },
}

/// 解码后的类型化数据包
///
/// 由一帧构造，交给会话控制器后立即消费，不保留。
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// 一条带时间戳的多通道采样
    Data {
        timestamp: f32,
        channels: [f32; CHANNEL_COUNT],
    },

    /// 控制面事件（设备状态变迁）
    Event { code: u32 },

    /// 保留类型，携带原始类型号仅供记录
    Reserved { packet_type: u8 },
}

/// 已知事件码到可读名称的映射
///
/// 进程级不可变数据，未知事件码统一报告为 "UNKNOWN"（但事件码本身照常携带）。
pub fn event_name(code: u32) -> &'static str {
    match code {
        1 => "Greeting/Version",
        2 => "Data Start",
        3 => "Data Stop",
        4..=8 => "Reserved",
        9 => "Sensor Map",
        10 => "Data Rate",
        _ => "UNKNOWN",
    }
}

/// 包解码器: 从字节流重建类型化数据包
pub struct PacketDecoder<R> {
    reader: FrameReader<R>,
}

impl<R: Read> PacketDecoder<R> {
    /// 包装一个底层传输
    pub fn new(transport: R) -> Self {
        Self {
            reader: FrameReader::new(transport),
        }
    }

    /// 解码下一个数据包
    ///
    /// # 返回
    /// * `Ok(Packet)` - 一个完整的类型化数据包
    /// * `Err(DecodeError)` - 流已耗尽或中途断裂，不产生部分结果
    pub fn decode_next(&mut self) -> Result<Packet, DecodeError> {
        // 1. 固定12字节帧头
        let header = self.reader.read_exactly(HEADER_LEN)?;

        let packet_type = header[TYPE_OFFSET];
        let body_len = u16::from_be_bytes([header[6], header[7]]) as usize;

        // 2. 变长包体，与帧头拼成整帧
        let body = self.reader.read_exactly(body_len)?;
        let mut frame = header;
        frame.extend_from_slice(&body);

        // 3. 按包类型分发
        match packet_type {
            PACKET_TYPE_DATA => decode_data(&frame),
            PACKET_TYPE_EVENT => decode_event(&frame),
            other => Ok(Packet::Reserved { packet_type: other }),
        }
    }
}

fn decode_data(frame: &[u8]) -> Result<Packet, DecodeError> {
    let needed = CHANNEL_OFFSET + CHANNEL_COUNT * 4;
    if frame.len() < needed {
        return Err(DecodeError::ShortBody {
            packet_type: PACKET_TYPE_DATA,
            needed,
            got: frame.len(),
        });
    }

    let timestamp = f32::from_be_bytes(frame[12..16].try_into().unwrap());

    let mut channels = [0.0f32; CHANNEL_COUNT];
    for (i, ch) in channels.iter_mut().enumerate() {
        let at = CHANNEL_OFFSET + i * 4;
        *ch = f32::from_be_bytes(frame[at..at + 4].try_into().unwrap());
    }

    Ok(Packet::Data {
        timestamp,
        channels,
    })
}

fn decode_event(frame: &[u8]) -> Result<Packet, DecodeError> {
    if frame.len() < 16 {
        return Err(DecodeError::ShortBody {
            packet_type: PACKET_TYPE_EVENT,
            needed: 16,
            got: frame.len(),
        });
    }

    let code = u32::from_be_bytes(frame[12..16].try_into().unwrap());
    Ok(Packet::Event { code })
}

fn encode_header(packet_type: u8, body_len: u16) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&FRAME_MAGIC);
    header.push(packet_type);
    header.extend_from_slice(&body_len.to_be_bytes());
    header.extend_from_slice(&0u32.to_be_bytes()); // 序号，解码侧不关心
    header
}

/// 构造一个事件帧（仿真器与测试使用）
pub fn encode_event_frame(code: u32) -> Vec<u8> {
    let mut frame = encode_header(PACKET_TYPE_EVENT, 4);
    frame.extend_from_slice(&code.to_be_bytes());
    frame
}

/// 构造一个数据帧（仿真器与测试使用）
///
/// 包体 = 4字节时间戳 + 7字节计数/状态填充 + 25×4字节通道块，
/// 保证通道块落在整帧偏移 23 处。
pub fn encode_data_frame(timestamp: f32, channels: &[f32; CHANNEL_COUNT]) -> Vec<u8> {
    let body_len = (4 + 7 + CHANNEL_COUNT * 4) as u16;
    let mut frame = encode_header(PACKET_TYPE_DATA, body_len);

    frame.extend_from_slice(&timestamp.to_be_bytes());
    frame.extend_from_slice(&[0u8; 7]);
    for ch in channels {
        frame.extend_from_slice(&ch.to_be_bytes());
    }

    frame
}
