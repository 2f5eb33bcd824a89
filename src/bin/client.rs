//! RFI 클라이언트 - Remote File Inspection
//!
//! 서버에 파일 타입, 범위 MD5, 범위 다운로드를 요청
//!
//! 사용법:
//!   cargo run --release --bin rfi-client -- [OPTIONS] <[HOST:]PORT> <COMMAND>
//!
//! 예시:
//!   cargo run --release --bin rfi-client -- 12000 filetype notes.md
//!   cargo run --release --bin rfi-client -- --udp example.com:12000 checksum -o 100 -l 200 data.bin
//!   cargo run --release --bin rfi-client -- 12000 download -o 10 data.bin copy.bin

use std::path::Path;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;

use rfi::client::{self, DownloadReport, Reply};
use rfi::{Config, Error, MessageType, Transport};

/// RFI client - file type, range checksum and range download
#[derive(Parser, Debug)]
#[command(name = "rfi-client", version, about)]
struct Cli {
    /// Use UDP instead of TCP
    #[arg(long, global = true)]
    udp: bool,

    /// Per-packet debug trace
    #[arg(short, long, global = true)]
    debug: bool,

    /// Give up on a request after this many seconds
    #[arg(long, default_value_t = 30, value_name = "SECONDS", global = true)]
    timeout: u64,

    /// Server address: [hostname:]port
    address: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask for the file type
    Filetype {
        file: String,
    },

    /// Ask for the MD5 digest of a byte range
    Checksum {
        #[command(flatten)]
        range: RangeArgs,

        file: String,
    },

    /// Download a byte range
    Download {
        #[command(flatten)]
        range: RangeArgs,

        file: String,

        /// Local file name (default: base name of FILE)
        save_as: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct RangeArgs {
    /// Start offset (>= 0)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..))]
    offset: i32,

    /// Length in bytes, negative for "to end of file" (must not be 0)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    length: i32,
}

/// 명령 실행 결과: 사용자에게 보여줄 한 줄과 성공 여부
struct Outcome {
    line: String,
    success: bool,
}

impl Outcome {
    fn ok(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            success: true,
        }
    }

    fn failed(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            success: false,
        }
    }

    /// 성공이면 `on_success`, 그 외에는 서버가 보낸 응답 종류를 알림
    fn from_reply<T>(reply: Reply<T>, on_success: impl FnOnce(T) -> Self) -> Self {
        match reply {
            Reply::Success(value) => on_success(value),
            Reply::Rejected(kind) => Self::failed(format!("{} received from the server", kind.label())),
            Reply::Unknown => Self::failed(format!(
                "{} received from the server",
                MessageType::UnknownFail.label()
            )),
        }
    }
}

fn default_save_as(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

async fn run(
    transport: &mut dyn Transport,
    command: &Command,
    config: &Config,
) -> rfi::Result<Outcome> {
    match command {
        Command::Filetype { file } => {
            let reply = client::file_type(transport, file).await?;
            Ok(Outcome::from_reply(reply, |description| {
                Outcome::ok(description.trim())
            }))
        }

        Command::Checksum { range, file } => {
            let reply = client::checksum(transport, range.offset, range.length, file).await?;
            Ok(Outcome::from_reply(reply, |digest| Outcome::ok(hex::encode(digest))))
        }

        Command::Download {
            range,
            file,
            save_as,
        } => {
            let save_as = save_as.clone().unwrap_or_else(|| default_save_as(file));
            let mut output = tokio::fs::File::create(&save_as).await?;

            let reply = client::download(
                transport,
                range.offset,
                range.length,
                file,
                &mut output,
                config.download_chunk_size,
            )
            .await?;

            if !matches!(reply, Reply::Success(_)) {
                drop(output);
                if let Err(e) = tokio::fs::remove_file(&save_as).await {
                    debug!("빈 파일 삭제 실패 '{}': {}", save_as, e);
                }
            }

            Ok(Outcome::from_reply(reply, |report: DownloadReport| {
                if report.is_complete() {
                    Outcome::ok(format!(
                        "...Downloaded data have been successfully written into '{}'",
                        save_as
                    ))
                } else {
                    Outcome::failed(format!(
                        "Download incomplete: {} of {} bytes written into '{}'",
                        report.received, report.expected, save_as
                    ))
                }
            }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 설정 (결과 출력과 섞이지 않도록 stderr)
    tracing_subscriber::fmt()
        .with_env_filter(if cli.debug { "debug" } else { "warn" })
        .with_writer(std::io::stderr)
        .init();

    let range_length = match &cli.command {
        Command::Checksum { range, .. } | Command::Download { range, .. } => Some(range.length),
        Command::Filetype { .. } => None,
    };
    if range_length == Some(0) {
        eprintln!("Invalid length: 0");
        std::process::exit(2);
    }

    let config = Config::default();
    let (host, port) = client::parse_address(&cli.address)?;
    let addr = client::resolve(&host, port).await?;
    debug!("server address: {} ({})", addr, if cli.udp { "udp" } else { "tcp" });

    let mut transport = client::connect(addr, cli.udp, &config).await?;

    let outcome = match tokio::time::timeout(
        Duration::from_secs(cli.timeout),
        run(transport.as_mut(), &cli.command, &config),
    )
    .await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(Error::CorruptResponse(text))) => Outcome::failed(text),
        Ok(Err(e)) => Outcome::failed(format!("Error: {}", e)),
        Err(_) => Outcome::failed(format!("No response from {} within {} s", addr, cli.timeout)),
    };

    if let Err(e) = transport.close().await {
        debug!("close: {}", e);
    }

    if outcome.success {
        println!("{}", outcome.line);
        Ok(())
    } else {
        eprintln!("{}", outcome.line);
        std::process::exit(1);
    }
}
