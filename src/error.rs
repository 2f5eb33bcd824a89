//! 에러 타입 정의

use thiserror::Error;

/// RFI 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("메시지 길이 초과: 선언 {declared} bytes, 최대 {max} bytes")]
    MessageTooLarge { declared: usize, max: usize },

    #[error("데이터 부족: 필요 {needed} bytes, 수신 {got} bytes")]
    Truncated { needed: usize, got: usize },

    #[error("길이 불일치: 선언 {declared} bytes, 실제 {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("알 수 없는 메시지 타입: 0x{0:02x}")]
    UnknownMessageType(u8),

    #[error("유효하지 않은 패킷: {len} bytes")]
    InvalidPacket { len: usize },

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("피어 응답 없음: {cycles}회 대기 동안 ACK 없음")]
    PeerUnresponsive { cycles: u32 },

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFileName(String),

    #[error("유효하지 않은 범위: offset={offset}, length={length}, file_len={file_len}")]
    InvalidRange {
        offset: i32,
        length: i32,
        file_len: u64,
    },

    #[error("파일 검사 실패: {0}")]
    Inspection(String),

    #[error("예상하지 못한 응답: request=0x{request:02x}, got=0x{got:02x}")]
    UnexpectedResponse { request: u8, got: u8 },

    #[error("손상된 응답: {0}")]
    CorruptResponse(String),

    #[error("유효하지 않은 주소: {0}")]
    InvalidAddress(String),

    #[error("유효하지 않은 손실 모델: {0}")]
    InvalidLossModel(String),

    #[error("알 수 없는 에러: {0}")]
    Unknown(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
