//! 传输层模块 - 面向字节流的精确读取
//!
//! FrameReader 只负责从底层传输按字节数精确取数，不理解协议内容。
//! 约定: `read_exactly(n)` 要么返回恰好 n 字节，要么返回错误，
//! 绝不向调用方暴露部分结果。上层（协议解码器）因此可以把一帧视为原子单位。

use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use thiserror::Error;
use tracing::{debug, warn};

/// 传输层错误类型
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("对端已关闭连接: 已读{got}字节, 需要{needed}字节")]
    Closed { got: usize, needed: usize },

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 采集端连接配置
///
/// `recv_buffer` 只是给内核的提示（SO_RCVBUF），不是协议要求。
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 设备端点（DSI-Streamer 默认监听 8844 端口）
    pub endpoint: SocketAddr,

    /// 接收缓冲区提示，单位字节
    pub recv_buffer: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:8844".parse().expect("内置端点必然合法"),
            recv_buffer: 4 * 1024,
        }
    }
}

/// 按配置建立到设备的TCP连接
pub fn connect(config: &CollectorConfig) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(config.endpoint)?;
    set_recv_buffer(&stream, config.recv_buffer);
    debug!("已连接到 {}", config.endpoint);
    Ok(stream)
}

/// 设置接收缓冲区大小提示（仅unix平台；失败只记录，不中断连接）
#[cfg(unix)]
fn set_recv_buffer(stream: &TcpStream, bytes: usize) {
    use std::os::unix::io::AsRawFd;

    let val = bytes as libc::c_int;
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &val as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if rc != 0 {
        warn!(
            "设置SO_RCVBUF为{}字节失败: {}",
            bytes,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn set_recv_buffer(_stream: &TcpStream, _bytes: usize) {}

/// 字节流精确读取器
///
/// 对任意 `io::Read` 生效，读取会一直阻塞到满足字节数为止。
/// 注意: 本设计没有读超时——对端停滞会无限期阻塞采集线程
/// （协议没有心跳机制，这是已接受的限制）。
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    /// 包装一个底层传输
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// 精确读取 n 字节
    ///
    /// # 返回
    /// * `Ok(Vec<u8>)` - 恰好 n 字节
    /// * `Err(TransportError::Closed)` - 对端在凑满 n 字节前关闭
    /// * `Err(TransportError::Io)` - 底层IO故障
    pub fn read_exactly(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; n];
        let mut got = 0;

        while got < n {
            match self.inner.read(&mut buf[got..]) {
                Ok(0) => return Err(TransportError::Closed { got, needed: n }),
                Ok(k) => got += k,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Io(e)),
            }
        }

        Ok(buf)
    }

    /// 取回底层传输
    pub fn into_inner(self) -> R {
        self.inner
    }
}
