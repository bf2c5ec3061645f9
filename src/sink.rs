//! 采样落盘模块
//!
//! 每个数据包写一行: `时间戳,ch1,ch2,...,ch25`，十进制文本，按到达顺序追加，
//! 无表头，无 fsync 保证。

use crate::protocol::CHANNEL_COUNT;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// 采样接收端抽象
///
/// 会话控制器在会话存续期内独占持有一个实现，所有退出路径上都会调用
/// `finish` 收尾，不会跨会话泄漏句柄。
pub trait SampleSink {
    /// 追加一条采样
    fn write_sample(
        &mut self,
        timestamp: f32,
        channels: &[f32; CHANNEL_COUNT],
    ) -> std::io::Result<()>;

    /// 收尾（冲刷缓冲等），默认空实现
    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// 浮点按最短十进制表示输出，0.0写作"0.0"而不是"0"
fn format_line(timestamp: f32, channels: &[f32; CHANNEL_COUNT]) -> String {
    let mut line = String::with_capacity(8 * (CHANNEL_COUNT + 1));
    line.push_str(&format!("{timestamp:?}"));
    for ch in channels {
        line.push(',');
        line.push_str(&format!("{ch:?}"));
    }
    line
}

/// CSV文件落盘
pub struct CsvSink {
    writer: BufWriter<File>,
    lines_written: u64,
}

impl CsvSink {
    /// 创建（或截断）输出文件
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            lines_written: 0,
        })
    }

    /// 已写入的行数
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

impl SampleSink for CsvSink {
    fn write_sample(
        &mut self,
        timestamp: f32,
        channels: &[f32; CHANNEL_COUNT],
    ) -> std::io::Result<()> {
        self.writer.write_all(format_line(timestamp, channels).as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.lines_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// 内存落盘（测试与调试用）
#[derive(Debug, Default)]
pub struct MemorySink {
    /// 按到达顺序保存的采样
    pub samples: Vec<(f32, [f32; CHANNEL_COUNT])>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按落盘格式渲染全部行
    pub fn lines(&self) -> Vec<String> {
        self.samples
            .iter()
            .map(|(ts, channels)| format_line(*ts, channels))
            .collect()
    }
}

impl SampleSink for MemorySink {
    fn write_sample(
        &mut self,
        timestamp: f32,
        channels: &[f32; CHANNEL_COUNT],
    ) -> std::io::Result<()> {
        self.samples.push((timestamp, *channels));
        Ok(())
    }
}
