//! RFI 서버 - Remote File Inspection
//!
//! 파일 타입, 범위 MD5, 범위 다운로드 요청을 처리하는 서버
//! - TCP: 연결마다 요청 1개
//! - UDP: 슬라이딩 윈도우 + 패킷당 ACK, 손실 모델로 손실 주입 가능
//!
//! 사용법:
//!   cargo run --release --bin rfi-server -- [OPTIONS] <PORT>
//!
//! 예시:
//!   # TCP 서버
//!   cargo run --release --bin rfi-server -- 12000
//!
//!   # UDP 서버, 윈도우 5, 100ms 간격, 손실 모델 적용
//!   cargo run --release --bin rfi-server -- -w 5 -r 100 --loss-model loss.bin 12000

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rfi::{Config, LocalFiles, Server};

/// 허용되는 최소 포트 번호
const MIN_PORT: u16 = 10000;

/// RFI server - file type, range checksum and range download
#[derive(Parser, Debug)]
#[command(name = "rfi-server", version, about)]
struct Args {
    /// Serve over UDP with the windowed-ACK reliability layer
    #[arg(long)]
    udp: bool,

    /// Loss model file (bits consumed LSB-first; 1 = deliver, 0 = drop). Implies --udp
    #[arg(long, value_name = "FILE")]
    loss_model: Option<PathBuf>,

    /// Send window size in packets. Implies --udp
    #[arg(short, long, value_name = "N")]
    window: Option<usize>,

    /// Retransmission interval in milliseconds. Implies --udp
    #[arg(short = 'r', long, value_name = "MS")]
    msinterval: Option<u64>,

    /// Per-packet debug trace
    #[arg(short, long)]
    debug: bool,

    /// Shut down this many seconds after startup (0 = never)
    #[arg(short, long, default_value_t = 300, value_name = "SECONDS")]
    timeout: u64,

    /// Listening port
    #[arg(value_parser = clap::value_parser!(u16).range(MIN_PORT as i64..))]
    port: u16,
}

impl Args {
    fn udp(&self) -> bool {
        self.udp || self.loss_model.is_some() || self.window.is_some() || self.msinterval.is_some()
    }

    fn to_config(&self) -> Config {
        let mut config = Config::default();
        if let Some(window) = self.window {
            config.window_size = window;
        }
        if let Some(interval) = self.msinterval {
            config.retransmit_interval_ms = interval;
        }
        config.loss_model = self.loss_model.clone();
        config.shutdown_after = match self.timeout {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };
        config.normalized()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 로깅 설정
    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let udp = args.udp();
    let config = args.to_config();
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    info!("RFI Server starting...");
    info!("Bind address: {} ({})", bind_addr, if udp { "udp" } else { "tcp" });
    if udp {
        info!("Window size: {} packets", config.window_size);
        info!("Retransmission interval: {} ms", config.retransmit_interval_ms);
        if let Some(path) = &config.loss_model {
            info!("Loss model: {:?}", path);
        }
    }
    if let Some(after) = config.shutdown_after {
        info!("Shutdown after: {} s", after.as_secs());
    }

    let server = Server::new(LocalFiles::new(), config);
    server.run(bind_addr, udp).await?;

    info!("Server stopped");
    Ok(())
}
