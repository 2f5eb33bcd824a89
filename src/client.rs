//! 클라이언트 요청
//!
//! 요청 메시지를 만들어 보내고 응답을 해석한다. 응답 손상은 에러로 돌려주며
//! 사용자에게 보여줄 문구는 에러 메시지에 담긴다.

use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::message::{MessageType, RangeRequest, Request};
use crate::transport::{DatagramTransport, StreamTransport, Transport};
use crate::{Config, Error, Result, DIGEST_SIZE};

/// 기본 호스트 이름
pub const DEFAULT_HOST: &str = "localhost";

/// 응답 해석 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    /// 성공 응답
    Success(T),

    /// 타입별 에러 응답 (`*_ERR`)
    Rejected(MessageType),

    /// 서버가 요청 타입을 모름 (`UNKNOWN_FAIL`)
    Unknown,
}

/// 다운로드 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    /// 응답 헤더에 선언된 바이트 수
    pub expected: u64,

    /// 실제로 받아 기록한 바이트 수
    pub received: u64,
}

impl DownloadReport {
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}

/// 응답 타입 분류: 성공이면 `None`, 그 외에는 돌려줄 `Reply`
fn classify<T>(request: &Request, msg_type: u8) -> Result<Option<Reply<T>>> {
    let error_type = request.error_type();
    match MessageType::from_u8(msg_type) {
        Some(kind) if kind == request.response_type() => Ok(None),
        Some(kind) if kind == error_type => Ok(Some(Reply::Rejected(kind))),
        Some(MessageType::UnknownFail) => Ok(Some(Reply::Unknown)),
        _ => Err(Error::UnexpectedResponse {
            request: request.msg_type().as_u8(),
            got: msg_type,
        }),
    }
}

/// 파일 타입 조회
pub async fn file_type<T>(transport: &mut T, filename: &str) -> Result<Reply<String>>
where
    T: Transport + ?Sized,
{
    let request = Request::FileType {
        filename: filename.to_string(),
    };
    transport.send_message(&request.to_message()).await?;

    let response = transport.receive_message().await?;
    if let Some(reply) = classify(&request, response.msg_type)? {
        return Ok(reply);
    }

    if !response.payload.is_ascii() {
        return Err(Error::CorruptResponse(
            "Invalid characters detected in a FILETYPE_RSP message.".to_string(),
        ));
    }

    Ok(Reply::Success(
        String::from_utf8_lossy(&response.payload).into_owned(),
    ))
}

/// 범위 MD5 조회
pub async fn checksum<T>(
    transport: &mut T,
    offset: i32,
    length: i32,
    filename: &str,
) -> Result<Reply<[u8; DIGEST_SIZE]>>
where
    T: Transport + ?Sized,
{
    let request = Request::Checksum(RangeRequest::new(offset, length, filename));
    transport.send_message(&request.to_message()).await?;

    let response = transport.receive_message().await?;
    if let Some(reply) = classify(&request, response.msg_type)? {
        return Ok(reply);
    }

    if response.payload.len() != DIGEST_SIZE {
        return Err(Error::CorruptResponse(
            "Invalid DataLength detected in a CHECKSUM_RSP message.".to_string(),
        ));
    }

    let mut digest = [0u8; DIGEST_SIZE];
    digest.copy_from_slice(&response.payload);
    Ok(Reply::Success(digest))
}

/// 범위 다운로드
///
/// 헤더에 선언된 바이트 수를 채우거나 수신 결과가 비어 있을 때까지 받아 `writer`에 기록한다.
/// 모자란 수신은 재시도하지 않고 [`DownloadReport`]로 알린다.
pub async fn download<T, W>(
    transport: &mut T,
    offset: i32,
    length: i32,
    filename: &str,
    writer: &mut W,
    chunk_size: usize,
) -> Result<Reply<DownloadReport>>
where
    T: Transport + ?Sized,
    W: AsyncWrite + Unpin + Send,
{
    let request = Request::Download(RangeRequest::new(offset, length, filename));
    transport.send_message(&request.to_message()).await?;

    let header = transport.receive_header().await?;
    if let Some(reply) = classify(&request, header.msg_type)? {
        return Ok(reply);
    }

    let expected = u64::from(header.length);
    let mut received = 0u64;

    while received < expected {
        let remaining = expected - received;
        let want = remaining.min(chunk_size.max(1) as u64) as usize;
        let chunk = transport.receive_chunk(want).await?;
        if chunk.is_empty() {
            break;
        }

        let take = chunk.len().min(remaining as usize);
        if take < chunk.len() {
            warn!("선언된 길이를 넘는 데이터 {} bytes 무시", chunk.len() - take);
        }
        writer.write_all(&chunk[..take]).await?;
        received += take as u64;
    }
    writer.flush().await?;

    debug!("다운로드 수신: {}/{} bytes", received, expected);
    Ok(Reply::Success(DownloadReport { expected, received }))
}

/// `[hostname:]port` 해석
pub fn parse_address(address: &str) -> Result<(String, u16)> {
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host, port),
        None => (DEFAULT_HOST, address),
    };

    if host.is_empty() {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::InvalidAddress(address.to_string()))?;

    Ok((host.to_string(), port))
}

/// 호스트 이름 조회 (IPv4 우선)
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::InvalidAddress(format!("{}:{}", host, port)))
}

/// 서버에 연결된 전송 계층 생성
pub async fn connect(addr: SocketAddr, udp: bool, config: &Config) -> Result<Box<dyn Transport>> {
    if udp {
        Ok(Box::new(DatagramTransport::client(config, addr).await?))
    } else {
        Ok(Box::new(StreamTransport::connect(addr, config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::message::{Message, MessageHeader};

    /// 미리 정한 응답을 돌려주는 전송 계층
    #[derive(Default)]
    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        messages: VecDeque<Message>,
        header: Option<MessageHeader>,
        chunks: VecDeque<Bytes>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, data: &[u8]) -> Result<usize> {
            self.sent.push(data.to_vec());
            Ok(data.len())
        }

        async fn receive_message(&mut self) -> Result<Message> {
            self.messages.pop_front().ok_or(Error::ConnectionClosed)
        }

        async fn receive_header(&mut self) -> Result<MessageHeader> {
            self.header.take().ok_or(Error::ConnectionClosed)
        }

        async fn receive_chunk(&mut self, _max: usize) -> Result<Bytes> {
            Ok(self.chunks.pop_front().unwrap_or_default())
        }

        fn kind(&self) -> &'static str {
            "scripted"
        }
    }

    fn replying(message: Message) -> ScriptedTransport {
        ScriptedTransport {
            messages: VecDeque::from([message]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_file_type_success() {
        let mut transport = replying(Message::new(
            MessageType::FileTypeResponse,
            &b"a.txt: ASCII text"[..],
        ));
        let reply = file_type(&mut transport, "a.txt").await.unwrap();

        assert_eq!(reply, Reply::Success("a.txt: ASCII text".to_string()));
        assert_eq!(transport.sent[0][0], 0xea);
        assert_eq!(&transport.sent[0][5..], b"a.txt");
    }

    #[tokio::test]
    async fn test_file_type_rejects_high_bytes() {
        let mut transport = replying(Message::new(
            MessageType::FileTypeResponse,
            vec![b'o', b'k', 0x80],
        ));
        match file_type(&mut transport, "a.txt").await {
            Err(Error::CorruptResponse(text)) => {
                assert_eq!(text, "Invalid characters detected in a FILETYPE_RSP message.")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checksum_length_check() {
        let mut transport = replying(Message::new(MessageType::ChecksumResponse, vec![0u8; 15]));
        assert!(matches!(
            checksum(&mut transport, 0, -1, "a.txt").await,
            Err(Error::CorruptResponse(_))
        ));

        let mut transport = replying(Message::new(MessageType::ChecksumResponse, vec![7u8; 16]));
        assert_eq!(
            checksum(&mut transport, 0, -1, "a.txt").await.unwrap(),
            Reply::Success([7u8; 16])
        );
    }

    #[tokio::test]
    async fn test_error_and_unknown_replies() {
        let mut transport = replying(Message::empty(MessageType::ChecksumError));
        assert_eq!(
            checksum(&mut transport, 0, -1, "a.txt").await.unwrap(),
            Reply::Rejected(MessageType::ChecksumError)
        );

        let mut transport = replying(Message::empty(MessageType::UnknownFail));
        assert_eq!(
            file_type(&mut transport, "a.txt").await.unwrap(),
            Reply::Unknown
        );

        let mut transport = replying(Message::empty(MessageType::DownloadResponse));
        assert!(matches!(
            file_type(&mut transport, "a.txt").await,
            Err(Error::UnexpectedResponse {
                request: 0xea,
                got: 0xa9
            })
        ));
    }

    #[tokio::test]
    async fn test_download_short_receive_is_reported() {
        let mut transport = ScriptedTransport {
            header: Some(MessageHeader::new(MessageType::DownloadResponse, 10)),
            chunks: VecDeque::from([Bytes::from_static(b"abcd")]),
            ..Default::default()
        };
        let mut sink = Vec::new();

        let reply = download(&mut transport, 0, -1, "a.bin", &mut sink, 4096)
            .await
            .unwrap();

        let report = match reply {
            Reply::Success(report) => report,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(report, DownloadReport { expected: 10, received: 4 });
        assert!(!report.is_complete());
        assert_eq!(sink, b"abcd");
    }

    #[tokio::test]
    async fn test_download_writes_declared_bytes_only() {
        let mut transport = ScriptedTransport {
            header: Some(MessageHeader::new(MessageType::DownloadResponse, 6)),
            chunks: VecDeque::from([Bytes::from_static(b"abcd"), Bytes::from_static(b"efgh")]),
            ..Default::default()
        };
        let mut sink = Vec::new();

        let reply = download(&mut transport, 2, 6, "a.bin", &mut sink, 4096)
            .await
            .unwrap();

        assert_eq!(
            reply,
            Reply::Success(DownloadReport {
                expected: 6,
                received: 6
            })
        );
        assert_eq!(sink, b"abcdef");

        // 요청 레이아웃: offset=2, length=6
        let sent = &transport.sent[0];
        assert_eq!(sent[0], 0xaa);
        assert_eq!(&sent[5..13], &[0, 0, 0, 2, 0, 0, 0, 6]);
    }

    #[tokio::test]
    async fn test_download_rejected() {
        let mut transport = ScriptedTransport {
            header: Some(MessageHeader::new(MessageType::DownloadError, 0)),
            ..Default::default()
        };
        let mut sink = Vec::new();

        let reply = download(&mut transport, 10, 100, "a.bin", &mut sink, 4096)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Rejected(MessageType::DownloadError));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("12000").unwrap(),
            ("localhost".to_string(), 12000)
        );
        assert_eq!(
            parse_address("example.com:15000").unwrap(),
            ("example.com".to_string(), 15000)
        );
        assert!(parse_address("host:port").is_err());
        assert!(parse_address(":12000").is_err());
        assert!(parse_address("").is_err());
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let addr = resolve("127.0.0.1", 12000).await.unwrap();
        assert_eq!(addr, "127.0.0.1:12000".parse::<SocketAddr>().unwrap());
    }
}
