//! # RFI (Remote File Inspection)
//!
//! 원격 파일 조회 프로토콜: 파일 타입, 범위 MD5 체크섬, 범위 다운로드
//!
//! ## 핵심 특징
//! - **단일 프레이밍**: `[type:1][length:4]` 헤더를 TCP/UDP에서 동일하게 사용
//! - **슬라이딩 윈도우**: UDP 위에서 고정 크기 윈도우 + 패킷당 ACK
//! - **타임아웃 재전송**: 가장 낮은 인덱스의 미확인 슬롯을 재전송
//! - **손실 모델**: 비트열 기반의 결정적 손실 주입 (원본 전송에만 적용)
//! - **길이 검증**: 수신 버퍼 용량을 넘는 길이 필드는 프로토콜 위반

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod loss;
pub mod message;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod service;
pub mod stats;
pub mod transport;
pub mod window;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use loss::LossModel;
pub use message::{Message, MessageHeader, MessageType, RangeRequest, Request};
pub use packet::PacketHeader;
pub use receiver::{PeerFilter, ReliableReceiver};
pub use sender::ReliableSender;
pub use server::Server;
pub use service::{FileCommand, FileInspector, LocalFiles, RangeHasher, RangeReader};
pub use stats::TransferStats;
pub use transport::{DatagramTransport, StreamTransport, Transport};

/// 패킷 최대 크기 (헤더 포함, 바이트)
pub const MAX_PACKET_SIZE: usize = 4096;

/// 메시지 헤더 크기: type(1) + length(4)
pub const MESSAGE_HEADER_SIZE: usize = 5;

/// 데이터그램 패킷 헤더 크기: sequence(4) + reserved(4)
pub const PACKET_HEADER_SIZE: usize = 8;

/// 서버 송신 시퀀스 시작값
pub const SERVER_INITIAL_SEQUENCE: u32 = 100_001;

/// 클라이언트 송신 시퀀스 시작값
pub const CLIENT_INITIAL_SEQUENCE: u32 = 123;

/// MD5 다이제스트 길이
pub const DIGEST_SIZE: usize = 16;
