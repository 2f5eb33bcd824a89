//! 전송 계층 추상화
//!
//! 같은 프레이밍을 TCP 스트림과 UDP 데이터그램 위에서 동일하게 사용한다.
//!
//! - [`StreamTransport`]: 순서/신뢰성은 TCP가 보장, 메시지 경계는 헤더 길이로 구분
//! - [`DatagramTransport`]: 수신 패킷 1개 = 메시지 1개,
//!   서버 송신은 [`ReliableSender`] 윈도우를 거친다

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs, UdpSocket};
use tracing::debug;

use crate::loss::LossModel;
use crate::message::{Message, MessageHeader};
use crate::packet::build_packet;
use crate::receiver::{PeerFilter, ReliableReceiver};
use crate::sender::ReliableSender;
use crate::stats::TransferStats;
use crate::{Config, Error, Result, CLIENT_INITIAL_SEQUENCE, MESSAGE_HEADER_SIZE};

/// 메시지 송수신 인터페이스
#[async_trait]
pub trait Transport: Send {
    /// 버퍼 전체 송신
    async fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// 완전한 메시지 1개 수신 (길이 필드는 수신 용량으로 제한)
    async fn receive_message(&mut self) -> Result<Message>;

    /// 메시지 헤더만 수신 (본문은 [`Transport::receive_chunk`]로 이어서 수신)
    async fn receive_header(&mut self) -> Result<MessageHeader>;

    /// 본문 일부 수신
    ///
    /// 스트림은 최대 `max` 바이트, 데이터그램은 패킷 본문 1개.
    /// 빈 결과는 더 받을 데이터가 없다는 뜻.
    async fn receive_chunk(&mut self, max: usize) -> Result<Bytes>;

    /// 메시지 직렬화 후 송신
    async fn send_message(&mut self, message: &Message) -> Result<usize> {
        let bytes = message.to_bytes();
        self.send(&bytes).await
    }

    /// 연결 정리 (스트림: 쓰기 방향 종료)
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// 전송 종류 이름 (로그용)
    fn kind(&self) -> &'static str;
}

fn map_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

/// TCP 스트림 전송
pub struct StreamTransport {
    stream: TcpStream,
    max_payload: usize,
}

impl StreamTransport {
    /// 서버에 연결
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: &Config) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, config))
    }

    /// 수락된 연결로 생성
    pub fn from_stream(stream: TcpStream, config: &Config) -> Self {
        Self {
            stream,
            max_payload: config.max_message_size.saturating_sub(MESSAGE_HEADER_SIZE),
        }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    async fn read_header(&mut self, max_payload: usize) -> Result<MessageHeader> {
        let mut buf = [0u8; MESSAGE_HEADER_SIZE];
        self.stream.read_exact(&mut buf).await.map_err(map_eof)?;
        MessageHeader::decode(&buf, max_payload)
    }
}

#[async_trait]
impl Transport for StreamTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.stream.write_all(data).await?;
        Ok(data.len())
    }

    async fn receive_message(&mut self) -> Result<Message> {
        let header = self.read_header(self.max_payload).await?;

        let mut payload = vec![0u8; header.length as usize];
        self.stream.read_exact(&mut payload).await.map_err(map_eof)?;

        Ok(Message {
            msg_type: header.msg_type,
            payload: Bytes::from(payload),
        })
    }

    async fn receive_header(&mut self) -> Result<MessageHeader> {
        self.read_header(usize::MAX).await
    }

    async fn receive_chunk(&mut self, max: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max.max(1));
        let n = self.stream.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf.freeze())
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "tcp"
    }
}

/// 데이터그램 송신 방식
enum Outbound {
    /// 클라이언트: 요청 1개를 패킷 1개로, 재전송 없음
    Single {
        peer: SocketAddr,
        next_sequence: u32,
        max_payload: usize,
    },

    /// 서버: 윈도우 기반 신뢰 송신
    Reliable(ReliableSender),
}

/// UDP 데이터그램 전송
pub struct DatagramTransport {
    socket: Arc<UdpSocket>,
    receiver: ReliableReceiver,
    outbound: Outbound,
    max_payload: usize,
}

impl DatagramTransport {
    /// 클라이언트용: 임의 포트에 바인드하고 서버 주소만 수신
    pub async fn client(config: &Config, server_addr: SocketAddr) -> Result<Self> {
        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self::client_with_socket(config, socket, server_addr))
    }

    pub fn client_with_socket(config: &Config, socket: UdpSocket, server_addr: SocketAddr) -> Self {
        let socket = Arc::new(socket);
        Self {
            receiver: ReliableReceiver::with_capacity(
                socket.clone(),
                PeerFilter::Fixed(server_addr),
                config.max_packet_size,
            ),
            outbound: Outbound::Single {
                peer: server_addr,
                next_sequence: CLIENT_INITIAL_SEQUENCE,
                max_payload: config.max_packet_payload(),
            },
            max_payload: config.max_message_size.saturating_sub(MESSAGE_HEADER_SIZE),
            socket,
        }
    }

    /// 서버용: 바인드 후 설정된 손실 모델 로드
    pub async fn server(config: &Config, bind_addr: SocketAddr) -> Result<Self> {
        let loss_model = match &config.loss_model {
            Some(path) => LossModel::from_file(path).await?,
            None => LossModel::none(),
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        Ok(Self::server_with_socket(config, socket, loss_model))
    }

    pub fn server_with_socket(config: &Config, socket: UdpSocket, loss_model: LossModel) -> Self {
        let socket = Arc::new(socket);
        Self {
            receiver: ReliableReceiver::with_capacity(
                socket.clone(),
                PeerFilter::Learn,
                config.max_packet_size,
            ),
            outbound: Outbound::Reliable(ReliableSender::new(config, socket.clone(), loss_model)),
            max_payload: config.max_message_size.saturating_sub(MESSAGE_HEADER_SIZE),
            socket,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 현재 송신 대상
    pub fn peer(&self) -> Option<SocketAddr> {
        match &self.outbound {
            Outbound::Single { peer, .. } => Some(*peer),
            Outbound::Reliable(sender) => sender.peer(),
        }
    }

    /// 신뢰 송신 통계 (서버만)
    pub fn stats(&self) -> Option<&TransferStats> {
        match &self.outbound {
            Outbound::Single { .. } => None,
            Outbound::Reliable(sender) => Some(sender.stats()),
        }
    }

    /// 패킷 1개 수신, 서버는 보낸 쪽을 응답 대상으로 기록
    async fn receive_body(&mut self) -> Result<Bytes> {
        let delivery = self.receiver.receive().await?;
        if let Outbound::Reliable(sender) = &mut self.outbound {
            if sender.peer() != Some(delivery.from) {
                debug!("피어 변경: {}", delivery.from);
            }
            sender.set_peer(delivery.from);
        }
        Ok(delivery.body)
    }
}

#[async_trait]
impl Transport for DatagramTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.outbound {
            Outbound::Reliable(sender) => sender.send(data).await,
            Outbound::Single {
                peer,
                next_sequence,
                max_payload,
            } => {
                if data.len() > *max_payload {
                    return Err(Error::MessageTooLarge {
                        declared: data.len(),
                        max: *max_payload,
                    });
                }

                let packet = build_packet(*next_sequence, data);
                self.socket.send_to(&packet, *peer).await?;
                debug!("transmission: packet seq={}, length={}", next_sequence, packet.len());
                *next_sequence = next_sequence.wrapping_add(1);
                Ok(data.len())
            }
        }
    }

    async fn receive_message(&mut self) -> Result<Message> {
        let body = self.receive_body().await?;
        Message::from_bytes(&body, self.max_payload)
    }

    async fn receive_header(&mut self) -> Result<MessageHeader> {
        let body = self.receive_body().await?;
        if body.len() != MESSAGE_HEADER_SIZE {
            return Err(Error::LengthMismatch {
                declared: MESSAGE_HEADER_SIZE,
                actual: body.len(),
            });
        }
        MessageHeader::decode(&body, usize::MAX)
    }

    async fn receive_chunk(&mut self, _max: usize) -> Result<Bytes> {
        self.receive_body().await
    }

    fn kind(&self) -> &'static str {
        "udp"
    }
}
