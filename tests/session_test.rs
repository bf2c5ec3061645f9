use dsi_collector::protocol::{encode_data_frame, encode_event_frame, EVENT_DATA_START};
use dsi_collector::{
    CollectorConfig, ControlSignal, CsvSink, ExperimentDefinition, MemorySink, SessionController,
    SessionError, SessionPhase, StatusEvent, Timeline, CHANNEL_COUNT,
};
use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Sender};

fn ramp_channels() -> [f32; CHANNEL_COUNT] {
    let mut channels = [0.0f32; CHANNEL_COUNT];
    for (i, ch) in channels.iter_mut().enumerate() {
        *ch = i as f32;
    }
    channels
}

fn reference_definition() -> ExperimentDefinition {
    // relax=2, action=3, loops=2 => 名义时长12秒
    ExperimentDefinition {
        prompt_text: "Clench Fist".to_string(),
        relax_seconds: 2.0,
        action_seconds: 3.0,
        loop_count: 2,
    }
}

#[test]
fn test_wire_to_csv_line() {
    // 从线缆字节到落盘文本的端到端验证:
    // 时间戳3.5、通道0.0..24.0 必须原样穿过解码与格式化
    let mut stream = Vec::new();
    stream.extend_from_slice(&encode_event_frame(EVENT_DATA_START));
    stream.extend_from_slice(&encode_data_frame(3.5, &ramp_channels()));

    let timeline = Timeline::build(&ExperimentDefinition {
        prompt_text: "Act".to_string(),
        relax_seconds: 0.0,
        action_seconds: 0.0,
        loop_count: 0,
    });

    let (status_tx, _status_rx) = mpsc::channel();
    let mut controller = SessionController::new(timeline, status_tx);
    let mut sink = MemorySink::new();

    controller
        .run_stream(Cursor::new(stream), &mut sink)
        .expect("名义时长为0, 必然完整");

    let expected = {
        let mut fields = vec!["3.5".to_string()];
        fields.extend((0..CHANNEL_COUNT).map(|i| format!("{:?}", i as f32)));
        fields.join(",")
    };
    assert_eq!(sink.lines(), vec![expected]);
}

#[test]
fn test_full_session_over_loopback_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("回环端口绑定失败");
    let endpoint = listener.local_addr().unwrap();

    // 仿真设备: 控制面事件 + 0..=12秒的数据包, 然后关闭连接
    let device = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("等待采集端接入失败");
        stream.write_all(&encode_event_frame(1)).unwrap();
        stream.write_all(&encode_event_frame(EVENT_DATA_START)).unwrap();
        for i in 0..=12u32 {
            stream
                .write_all(&encode_data_frame(i as f32, &ramp_channels()))
                .unwrap();
        }
    });

    let timeline = Timeline::build(&reference_definition());
    assert_eq!(timeline.nominal_duration(), 12.0);

    let (status_tx, status_rx) = mpsc::channel();
    let mut controller = SessionController::new(timeline, status_tx);

    let csv_path = std::env::temp_dir().join(format!(
        "dsi-session-test-{}.csv",
        uuid::Uuid::new_v4()
    ));
    let mut sink = CsvSink::create(&csv_path).unwrap();

    let config = CollectorConfig {
        endpoint,
        ..CollectorConfig::default()
    };
    let summary = controller
        .run_tcp(&config, &mut sink)
        .expect("捕获跨度已达名义时长");

    device.join().unwrap();

    assert_eq!(controller.phase(), SessionPhase::Closed);
    assert_eq!(summary.captured_seconds, 12.0);
    assert_eq!(summary.start_timestamp, Some(0.0));
    assert_eq!(summary.end_timestamp, Some(12.0));
    assert_eq!(summary.samples_written, 13);

    // 落盘内容与到达顺序一致
    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 13);
    assert!(lines[0].starts_with("0.0,0.0,1.0,"));
    assert!(lines[12].starts_with("12.0,"));
    std::fs::remove_file(&csv_path).ok();

    // 状态事件流里必须有连接、采集开始与摘要
    let events: Vec<StatusEvent> = status_rx.try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, StatusEvent::Connected)));
    assert!(events
        .iter()
        .any(|e| matches!(e, StatusEvent::CollectionStarted)));
    assert!(events.iter().any(|e| matches!(e, StatusEvent::Summary(s)
        if s.captured_seconds == 12.0)));

    println!("回环TCP端到端测试通过");
}

/// 吐出指定字节数后发送一次停止请求的传输包装
struct StopAfter<R> {
    inner: R,
    remaining: usize,
    tx: Sender<ControlSignal>,
}

impl<R: Read> Read for StopAfter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if self.remaining > 0 {
            self.remaining = self.remaining.saturating_sub(n);
            if self.remaining == 0 {
                let _ = self.tx.send(ControlSignal::StopRequested);
            }
        }
        Ok(n)
    }
}

#[test]
fn test_drain_completeness_property() {
    // 性质: 会话成功关闭 => 捕获跨度 >= 名义时长（传输存活的前提下），
    // 即便停止信号早早到达
    let timeline = Timeline::build(&reference_definition());
    let nominal = timeline.nominal_duration();

    let mut stream = Vec::new();
    stream.extend_from_slice(&encode_event_frame(EVENT_DATA_START));
    for i in 0..=20u32 {
        stream.extend_from_slice(&encode_data_frame(i as f32, &ramp_channels()));
    }

    let (status_tx, _status_rx) = mpsc::channel();
    let mut controller = SessionController::new(timeline, status_tx);

    // Data Start事件帧（16字节）一读完就停止
    let transport = StopAfter {
        inner: Cursor::new(stream),
        remaining: 16,
        tx: controller.control_sender(),
    };

    let mut sink = MemorySink::new();
    let summary = controller
        .run_stream(transport, &mut sink)
        .expect("数据充足时补漏必须追满");

    assert!(summary.captured_seconds >= nominal);
    assert_eq!(controller.phase(), SessionPhase::Closed);
}

#[test]
fn test_partial_capture_surfaced_over_tcp() {
    // 设备发出 Data Start 后立刻断开: 必须以不完整采集上报, 不崩溃
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = listener.local_addr().unwrap();

    let device = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.write_all(&encode_event_frame(EVENT_DATA_START)).unwrap();
        // 直接掉线
    });

    let timeline = Timeline::build(&reference_definition());
    let (status_tx, _status_rx) = mpsc::channel();
    let mut controller = SessionController::new(timeline, status_tx);
    let mut sink = MemorySink::new();

    let config = CollectorConfig {
        endpoint,
        ..CollectorConfig::default()
    };
    match controller.run_tcp(&config, &mut sink) {
        Err(SessionError::PartialCapture { captured, nominal }) => {
            assert_eq!(captured, 0.0);
            assert_eq!(nominal, 12.0);
        }
        other => panic!("期望PartialCapture, 实际: {other:?}"),
    }

    device.join().unwrap();
    assert!(sink.samples.is_empty());
    assert_eq!(controller.phase(), SessionPhase::Closed);
}
