use dsi_collector::logging::init;
use dsi_collector::{
    CollectorConfig, CsvSink, ExperimentDefinition, SessionController, SessionError, StatusEvent,
    Timeline,
};
use tracing::{error, info};

fn main() {
    // 日志系统初始化
    init();

    let mut args = std::env::args();
    let cmd = args.next().unwrap();
    let args: Vec<String> = args.collect();

    if args.len() < 5 || args.len() > 6 {
        println!("用法: {cmd} URL 输出文件 放松秒数 动作秒数 循环次数 [动作提示]");
        println!("\n示例: {cmd} tcp://localhost:8844 run1.csv 2 3 2 \"Clench Fist\"");
        return;
    }

    // 设备端点
    let url = match url::Url::parse(&args[0]) {
        Ok(url) => url,
        Err(e) => {
            error!("URL解析失败: {}", e);
            return;
        }
    };
    let endpoint = match url.socket_addrs(|| Some(8844)) {
        Ok(addrs) if !addrs.is_empty() => addrs[0],
        _ => {
            error!("无法解析设备端点: {}", url);
            return;
        }
    };

    // 实验定义（数值必须非负）
    let output = args[1].clone();
    let (relax, action, loops) = match (
        args[2].parse::<f64>(),
        args[3].parse::<f64>(),
        args[4].parse::<u32>(),
    ) {
        (Ok(relax), Ok(action), Ok(loops)) if relax >= 0.0 && action >= 0.0 => {
            (relax, action, loops)
        }
        _ => {
            error!("放松/动作秒数必须是非负数字, 循环次数必须是非负整数");
            return;
        }
    };
    let prompt_text = args.get(5).cloned().unwrap_or_else(|| "Action".to_string());

    let definition = ExperimentDefinition {
        prompt_text,
        relax_seconds: relax,
        action_seconds: action,
        loop_count: loops,
    };
    let timeline = Timeline::build(&definition);
    info!(
        "实验计划: {}条提示, 名义时长{:.2}秒",
        timeline.len(),
        timeline.nominal_duration()
    );

    // 状态事件渲染线程
    let (status_tx, status_rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in status_rx {
            render(event);
        }
    });

    let mut sink = match CsvSink::create(&output) {
        Ok(sink) => sink,
        Err(e) => {
            error!("输出文件 {} 创建失败: {}", output, e);
            return;
        }
    };

    let config = CollectorConfig {
        endpoint,
        ..CollectorConfig::default()
    };
    let mut controller = SessionController::new(timeline, status_tx);

    match controller.run_tcp(&config, &mut sink) {
        Ok(summary) => {
            info!(
                "采集完成: 捕获{:.2}秒, 落盘{}条 -> {}",
                summary.captured_seconds, summary.samples_written, output
            );
        }
        Err(SessionError::PartialCapture { captured, nominal }) => {
            // 传输先断了: 文件比请求的实验短，明确告知而不是装作成功
            error!(
                "采集不完整: 只捕获{:.2}秒, 名义时长{:.2}秒, 文件 {} 短于预期",
                captured, nominal, output
            );
        }
        Err(e) => error!("会话失败: {}", e),
    }

    drop(controller); // 关闭状态通道，让渲染线程退出
    let _ = printer.join();
}

// 把状态事件渲染成终端输出
fn render(event: StatusEvent) {
    match event {
        StatusEvent::Connected => println!("Socket connected."),
        StatusEvent::ConnectionRefused => println!("Connection Refused!\n ABORTING..."),
        StatusEvent::EventPacket { name, .. } => println!("Event Packet! Type: {name}"),
        StatusEvent::CollectionStarted => println!("\nBeginning Collection...\n"),
        StatusEvent::ReservedPacket { .. } => println!("Reserved Packet!"),
        StatusEvent::Prompt { second, label } => println!("{second:02}: {label}"),
        StatusEvent::TimerExpired => println!("\nTimer Expired!"),
        StatusEvent::StreamEnded => println!("No Data Remaining in Socket!"),
        StatusEvent::BacklogStart => {
            println!("Capturing Backlog Data from DSI!");
            println!("Do not close window or DSI-Streamer or data will be lost!");
        }
        StatusEvent::Summary(summary) => {
            println!(
                "Received {:.2} seconds of Backlog from DSI!",
                summary.backlog_seconds
            );
            if let Some(start) = summary.start_timestamp {
                println!("Collection began at {start:.2} seconds");
            }
            if let Some(mark) = summary.backlog_timestamp {
                println!("Backlog began at {mark:.2} seconds");
            }
            if let Some(end) = summary.end_timestamp {
                println!("Backlog ended at {end:.2} seconds");
            }
        }
        StatusEvent::Closed => println!("Data collection Loop Ending!"),
    }
}
