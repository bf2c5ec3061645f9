//! DSI设备仿真器 - 按厂商线缆格式输出合成数据的TCP服务端
//!
//! 替代真实的DSI-Streamer做本地回环测试: 问候/传感器映射/采样率事件、
//! Data Start、然后按批次成簇输出数据包（模拟设备缓冲造成的突发投递），
//! 最后 Data Stop 并关闭连接。

use dsi_collector::logging::init;
use dsi_collector::protocol::{
    encode_data_frame, encode_event_frame, CHANNEL_COUNT, EVENT_DATA_START, EVENT_DATA_STOP,
};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;
use tracing::{info, warn};

fn main() {
    // 日志系统初始化
    init();

    let mut args = std::env::args();
    let cmd = args.next().unwrap();
    let args: Vec<String> = args.collect();

    if args.len() > 3 {
        println!("用法: {cmd} [监听地址] [输出时长秒] [采样率Hz]");
        println!("\n默认: 127.0.0.1:8844 30秒 300Hz");
        return;
    }

    let addr = args
        .first()
        .cloned()
        .unwrap_or_else(|| "127.0.0.1:8844".to_string());
    let duration: u32 = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);
    let rate: u32 = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(300)
        .max(1);

    let listener = TcpListener::bind(&addr).expect("监听失败");
    info!(
        "DSI仿真器监听 {}, 每次会话输出{}秒 x {}Hz",
        addr, duration, rate
    );

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                std::thread::spawn(move || serve(stream, duration, rate));
            }
            Err(e) => warn!("接入失败: {}", e),
        }
    }
}

fn serve(mut stream: TcpStream, duration: u32, rate: u32) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    info!("客户端 {} 接入", peer);

    if let Err(e) = run_session(&mut stream, duration, rate) {
        warn!("客户端 {} 会话中断: {}", peer, e);
        return;
    }

    info!("客户端 {} 会话结束", peer);
}

fn run_session(stream: &mut TcpStream, duration: u32, rate: u32) -> std::io::Result<()> {
    // 控制面事件序列与真机一致
    stream.write_all(&encode_event_frame(1))?; // Greeting/Version
    stream.write_all(&encode_event_frame(9))?; // Sensor Map
    stream.write_all(&encode_event_frame(10))?; // Data Rate
    stream.write_all(&encode_event_frame(EVENT_DATA_START))?;

    // 每半秒一批，模拟突发投递
    let total = duration.saturating_mul(rate);
    let batch = (rate / 2).max(1);
    let mut sent = 0u32;

    while sent < total {
        let n = batch.min(total - sent);
        for _ in 0..n {
            let timestamp = sent as f32 / rate as f32;
            stream.write_all(&encode_data_frame(timestamp, &synth_channels(sent)))?;
            sent += 1;
        }
        stream.flush()?;
        std::thread::sleep(Duration::from_millis(500));
    }

    stream.write_all(&encode_event_frame(EVENT_DATA_STOP))?;
    stream.flush()
}

// 微伏级正弦假信号，每路相位错开
fn synth_channels(n: u32) -> [f32; CHANNEL_COUNT] {
    let mut channels = [0.0f32; CHANNEL_COUNT];
    for (i, ch) in channels.iter_mut().enumerate() {
        let phase = n as f32 * 0.05 + i as f32;
        *ch = phase.sin() * 50.0e-6;
    }
    channels
}
