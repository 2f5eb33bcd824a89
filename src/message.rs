//! 프로토콜 메시지 정의
//!
//! 모든 메시지는 `[type:1][length:4]` 헤더 + `length` 바이트 페이로드.
//! 정수는 모두 네트워크 바이트 순서(big endian).
//!
//! ```text
//! ┌──────────┬───────────┬──────────────────────┐
//! │ Type     │ Length    │ Payload              │
//! │ 1 byte   │ uint32 BE │ Length bytes         │
//! └──────────┴───────────┴──────────────────────┘
//! ```
//!
//! 범위 요청(Checksum / Download) 페이로드:
//! `[offset:i32 BE][length:i32 BE][filename...]`

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result, MESSAGE_HEADER_SIZE};

/// 범위 요청 페이로드의 고정 부분: offset(4) + length(4)
pub const RANGE_FIELDS_SIZE: usize = 8;

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// 파일 타입 요청
    FileTypeRequest = 0xea,

    /// 파일 타입 응답 (성공)
    FileTypeResponse = 0xe9,

    /// 파일 타입 응답 (실패)
    FileTypeError = 0xe8,

    /// 체크섬 요청
    ChecksumRequest = 0xca,

    /// 체크섬 응답 (성공)
    ChecksumResponse = 0xc9,

    /// 체크섬 응답 (실패)
    ChecksumError = 0xc8,

    /// 다운로드 요청
    DownloadRequest = 0xaa,

    /// 다운로드 응답 (성공)
    DownloadResponse = 0xa9,

    /// 다운로드 응답 (실패)
    DownloadError = 0xa8,

    /// 알 수 없는 요청에 대한 응답
    UnknownFail = 0x51,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        let kind = match value {
            0xea => Self::FileTypeRequest,
            0xe9 => Self::FileTypeResponse,
            0xe8 => Self::FileTypeError,
            0xca => Self::ChecksumRequest,
            0xc9 => Self::ChecksumResponse,
            0xc8 => Self::ChecksumError,
            0xaa => Self::DownloadRequest,
            0xa9 => Self::DownloadResponse,
            0xa8 => Self::DownloadError,
            0x51 => Self::UnknownFail,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 로그 출력용 이름
    pub fn label(self) -> &'static str {
        match self {
            Self::FileTypeRequest => "FILETYPE_REQ",
            Self::FileTypeResponse => "FILETYPE_RSP",
            Self::FileTypeError => "FILETYPE_ERR",
            Self::ChecksumRequest => "CHECKSUM_REQ",
            Self::ChecksumResponse => "CHECKSUM_RSP",
            Self::ChecksumError => "CHECKSUM_ERR",
            Self::DownloadRequest => "DOWNLOAD_REQ",
            Self::DownloadResponse => "DOWNLOAD_RSP",
            Self::DownloadError => "DOWNLOAD_ERR",
            Self::UnknownFail => "UNKNOWN_FAIL",
        }
    }
}

/// 메시지 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// 타입 바이트 (알 수 없는 값도 그대로 보존)
    pub msg_type: u8,

    /// 페이로드 길이 (헤더 제외)
    pub length: u32,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, length: u32) -> Self {
        Self {
            msg_type: msg_type.as_u8(),
            length,
        }
    }

    /// 알려진 타입이면 반환
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u8(self.msg_type)
    }

    pub fn encode(&self) -> [u8; MESSAGE_HEADER_SIZE] {
        let mut buf = [0u8; MESSAGE_HEADER_SIZE];
        buf[0] = self.msg_type;
        buf[1..5].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// 헤더 디코딩
    ///
    /// `max_payload`를 넘는 길이 필드는 수신 버퍼를 넘어서므로 거부한다.
    pub fn decode(buf: &[u8], max_payload: usize) -> Result<Self> {
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::Truncated {
                needed: MESSAGE_HEADER_SIZE,
                got: buf.len(),
            });
        }

        let header = Self {
            msg_type: buf[0],
            length: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        };

        if header.length as usize > max_payload {
            return Err(Error::MessageTooLarge {
                declared: header.length as usize,
                max: max_payload,
            });
        }

        Ok(header)
    }
}

/// 완전한 메시지 (헤더 + 페이로드)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: u8,
    pub payload: Bytes,
}

impl Message {
    pub fn new(msg_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type: msg_type.as_u8(),
            payload: payload.into(),
        }
    }

    /// 페이로드 없는 메시지 (에러 응답 등)
    pub fn empty(msg_type: MessageType) -> Self {
        Self::new(msg_type, Bytes::new())
    }

    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_u8(self.msg_type)
    }

    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            msg_type: self.msg_type,
            length: self.payload.len() as u32,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MESSAGE_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header().encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// 하나의 버퍼 전체를 메시지로 해석 (데이터그램 수신용)
    ///
    /// 길이 필드가 버퍼에 실제로 담긴 페이로드 크기와 정확히 같아야 한다.
    pub fn from_bytes(buf: &[u8], max_payload: usize) -> Result<Self> {
        let header = MessageHeader::decode(buf, max_payload)?;
        let declared = header.length as usize;
        let actual = buf.len() - MESSAGE_HEADER_SIZE;

        if actual < declared {
            return Err(Error::Truncated {
                needed: MESSAGE_HEADER_SIZE + declared,
                got: buf.len(),
            });
        }
        if actual > declared {
            return Err(Error::LengthMismatch { declared, actual });
        }

        Ok(Self {
            msg_type: header.msg_type,
            payload: Bytes::copy_from_slice(&buf[MESSAGE_HEADER_SIZE..]),
        })
    }
}

/// 범위 요청 (Checksum / Download 공용)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// 시작 오프셋
    pub offset: i32,

    /// 길이 (음수면 파일 끝까지)
    pub length: i32,

    /// 대상 파일 이름
    pub filename: String,
}

impl RangeRequest {
    pub fn new(offset: i32, length: i32, filename: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            filename: filename.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RANGE_FIELDS_SIZE + self.filename.len());
        buf.put_i32(self.offset);
        buf.put_i32(self.length);
        buf.put_slice(self.filename.as_bytes());
        buf.freeze()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < RANGE_FIELDS_SIZE {
            return Err(Error::Truncated {
                needed: RANGE_FIELDS_SIZE,
                got: payload.len(),
            });
        }

        let offset = i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let length = i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);

        Ok(Self {
            offset,
            length,
            filename: decode_filename(&payload[RANGE_FIELDS_SIZE..]),
        })
    }
}

/// 클라이언트 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    FileType { filename: String },
    Checksum(RangeRequest),
    Download(RangeRequest),
}

impl Request {
    /// 요청 메시지 타입
    pub fn msg_type(&self) -> MessageType {
        match self {
            Request::FileType { .. } => MessageType::FileTypeRequest,
            Request::Checksum(_) => MessageType::ChecksumRequest,
            Request::Download(_) => MessageType::DownloadRequest,
        }
    }

    /// 성공 응답 타입
    pub fn response_type(&self) -> MessageType {
        match self {
            Request::FileType { .. } => MessageType::FileTypeResponse,
            Request::Checksum(_) => MessageType::ChecksumResponse,
            Request::Download(_) => MessageType::DownloadResponse,
        }
    }

    /// 실패 응답 타입
    pub fn error_type(&self) -> MessageType {
        match self {
            Request::FileType { .. } => MessageType::FileTypeError,
            Request::Checksum(_) => MessageType::ChecksumError,
            Request::Download(_) => MessageType::DownloadError,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Request::FileType { filename } => filename,
            Request::Checksum(range) | Request::Download(range) => &range.filename,
        }
    }

    pub fn to_message(&self) -> Message {
        let payload = match self {
            Request::FileType { filename } => Bytes::copy_from_slice(filename.as_bytes()),
            Request::Checksum(range) | Request::Download(range) => range.encode(),
        };
        Message::new(self.msg_type(), payload)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_message().to_bytes()
    }

    /// 수신 메시지를 요청으로 해석
    pub fn from_message(message: &Message) -> Result<Self> {
        match message.kind() {
            Some(MessageType::FileTypeRequest) => Ok(Request::FileType {
                filename: decode_filename(&message.payload),
            }),
            Some(MessageType::ChecksumRequest) => {
                Ok(Request::Checksum(RangeRequest::decode(&message.payload)?))
            }
            Some(MessageType::DownloadRequest) => {
                Ok(Request::Download(RangeRequest::decode(&message.payload)?))
            }
            _ => Err(Error::UnknownMessageType(message.msg_type)),
        }
    }
}

/// 파일 이름 바이트를 문자열로
///
/// ASCII가 아닌 바이트는 대체 문자로 바뀌어 이후 이름 검증에서 거부된다.
fn decode_filename(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
