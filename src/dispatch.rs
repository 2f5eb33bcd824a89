//! 요청 디스패처 (서버측)
//!
//! 메시지 타입 바이트로 처리기를 고르고, 응답을 만들어 전송 계층으로 보낸다.
//! 프로토콜 수준의 실패는 항상 타입별 에러 응답(페이로드 0바이트)으로 끝난다.

use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::message::{Message, MessageHeader, MessageType, RangeRequest, Request};
use crate::service::{FileInspector, RangeHasher, RangeReader};
use crate::transport::Transport;
use crate::{Config, Error, Result, MESSAGE_HEADER_SIZE};

/// 파일 이름에 허용되는 기호 (영숫자 외)
const FILENAME_SYMBOLS: &[u8] = b"+-_.,/";

/// 파일 이름 검증: `[A-Za-z0-9+-_.,/]*`
pub fn is_valid_filename(name: &str) -> bool {
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || FILENAME_SYMBOLS.contains(&b))
}

/// 요청 타입에 대응하는 에러 응답 타입
fn error_type_for(msg_type: u8) -> Option<MessageType> {
    match MessageType::from_u8(msg_type)? {
        MessageType::FileTypeRequest => Some(MessageType::FileTypeError),
        MessageType::ChecksumRequest => Some(MessageType::ChecksumError),
        MessageType::DownloadRequest => Some(MessageType::DownloadError),
        _ => None,
    }
}

/// 바이트 경계를 넘지 않도록 문자 단위로 자르기
fn truncate_to(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

/// 요청 디스패처
pub struct Dispatcher<S> {
    service: S,
    config: Config,
}

impl<S> Dispatcher<S>
where
    S: FileInspector + RangeHasher + RangeReader,
{
    pub fn new(service: S, config: &Config) -> Self {
        Self {
            service,
            config: config.clone().normalized(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// 파일 타입 설명 최대 길이 (데이터그램 1개에 들어가야 함)
    fn max_description(&self) -> usize {
        self.config
            .max_packet_payload()
            .min(self.config.max_message_size)
            .saturating_sub(MESSAGE_HEADER_SIZE)
    }

    /// 메시지 1개 처리 후 보낸 응답 타입 반환
    pub async fn handle<T>(&self, transport: &mut T, message: &Message) -> Result<MessageType>
    where
        T: Transport + ?Sized,
    {
        let request = match Request::from_message(message) {
            Ok(request) => request,
            Err(Error::UnknownMessageType(msg_type)) => {
                warn!("Message with MessageType = 0x{:02x} received. Ignored.", msg_type);
                return reply_empty(transport, MessageType::UnknownFail).await;
            }
            Err(e) => {
                // 알려진 요청 타입이지만 페이로드가 잘못됨
                warn!("요청 해석 실패: {}", e);
                let kind = error_type_for(message.msg_type).unwrap_or(MessageType::UnknownFail);
                return reply_empty(transport, kind).await;
            }
        };

        match request {
            Request::FileType { filename } => self.file_type(transport, &filename).await,
            Request::Checksum(range) => self.checksum(transport, &range).await,
            Request::Download(range) => self.download(transport, &range).await,
        }
    }

    async fn file_type<T>(&self, transport: &mut T, filename: &str) -> Result<MessageType>
    where
        T: Transport + ?Sized,
    {
        info!("FILETYPE_REQ received: DataLength = {}, filename = '{}'", filename.len(), filename);

        if !is_valid_filename(filename) {
            warn!("{}", Error::InvalidFileName(filename.to_string()));
            return reply_empty(transport, MessageType::FileTypeError).await;
        }

        match self.service.inspect(Path::new(filename)).await {
            Ok(description) => {
                let mut description = description.replace('\t', " ");
                truncate_to(&mut description, self.max_description());

                let response = Message::new(MessageType::FileTypeResponse, description.into_bytes());
                transport.send_message(&response).await?;
                info!(
                    "FILETYPE_RSP sent: DataLength = {}, Data = '{}'",
                    response.payload.len(),
                    String::from_utf8_lossy(&response.payload)
                );
                Ok(MessageType::FileTypeResponse)
            }
            Err(e) => {
                warn!("파일 타입 조회 실패 '{}': {}", filename, e);
                reply_empty(transport, MessageType::FileTypeError).await
            }
        }
    }

    async fn checksum<T>(&self, transport: &mut T, range: &RangeRequest) -> Result<MessageType>
    where
        T: Transport + ?Sized,
    {
        info!(
            "CHECKSUM_REQ received: offset = {}, length = {}, filename = '{}'",
            range.offset, range.length, range.filename
        );

        if !is_valid_filename(&range.filename) || range.offset < 0 {
            warn!(
                "잘못된 체크섬 요청: filename = '{}', offset = {}",
                range.filename, range.offset
            );
            return reply_empty(transport, MessageType::ChecksumError).await;
        }

        let path = Path::new(&range.filename);
        match self.service.hash_range(path, range.offset, range.length).await {
            Ok(digest) => {
                let response = Message::new(MessageType::ChecksumResponse, digest.to_vec());
                transport.send_message(&response).await?;
                info!("CHECKSUM_RSP sent: checksum = {}", hex::encode(digest));
                Ok(MessageType::ChecksumResponse)
            }
            Err(e) => {
                warn!("체크섬 실패 '{}': {}", range.filename, e);
                reply_empty(transport, MessageType::ChecksumError).await
            }
        }
    }

    async fn download<T>(&self, transport: &mut T, range: &RangeRequest) -> Result<MessageType>
    where
        T: Transport + ?Sized,
    {
        info!(
            "DOWNLOAD_REQ received: offset = {}, length = {}, filename = '{}'",
            range.offset, range.length, range.filename
        );

        if !is_valid_filename(&range.filename) || range.offset < 0 {
            warn!(
                "잘못된 다운로드 요청: filename = '{}', offset = {}",
                range.filename, range.offset
            );
            return reply_empty(transport, MessageType::DownloadError).await;
        }

        let path = Path::new(&range.filename);
        let (mut reader, count) = match self.service.open_range(path, range.offset, range.length).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("다운로드 실패 '{}': {}", range.filename, e);
                return reply_empty(transport, MessageType::DownloadError).await;
            }
        };

        let declared = u32::try_from(count).map_err(|_| Error::InvalidRange {
            offset: range.offset,
            length: range.length,
            file_len: count,
        })?;

        // 헤더 먼저, 본문은 청크 단위로 이어서
        let header = MessageHeader::new(MessageType::DownloadResponse, declared);
        transport.send(&header.encode()).await?;

        let mut buf = vec![0u8; self.config.download_chunk_size];
        let mut remaining = count;

        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let filled = fill_buf(&mut reader, &mut buf[..want]).await?;
            if filled == 0 {
                warn!("파일이 예상보다 짧음: {} bytes 남음", remaining);
                return Err(Error::Truncated {
                    needed: count as usize,
                    got: (count - remaining) as usize,
                });
            }
            transport.send(&buf[..filled]).await?;
            remaining -= filled as u64;
        }

        info!("DOWNLOAD_RSP sent: DataLength = {}", count);
        Ok(MessageType::DownloadResponse)
    }
}

/// 버퍼가 찰 때까지 또는 EOF까지 읽기
async fn fill_buf<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// 페이로드 없는 응답 송신
async fn reply_empty<T>(transport: &mut T, kind: MessageType) -> Result<MessageType>
where
    T: Transport + ?Sized,
{
    transport.send_message(&Message::empty(kind)).await?;
    info!("{} sent: DataLength = 0", kind.label());
    Ok(kind)
}
