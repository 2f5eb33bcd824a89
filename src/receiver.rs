//! 신뢰 수신자 (클라이언트/서버 공용)
//!
//! - 기대한 피어 이외의 데이터그램 폐기
//! - 수신한 패킷마다 헤더 8바이트를 그대로 ACK으로 1회 회신
//!   (보관 한도를 넘어 버린 패킷은 ACK 하지 않음)
//! - 헤더를 제거한 본문 반환

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::packet::PacketHeader;
use crate::{Result, MAX_PACKET_SIZE, PACKET_HEADER_SIZE};

/// 순서가 앞선 패킷을 보관하는 최대 개수
const MAX_HELD_PACKETS: usize = 256;

/// 송신 피어 검증 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerFilter {
    /// 정확히 이 주소:포트에서 온 데이터그램만 수신 (클라이언트)
    Fixed(SocketAddr),

    /// 어느 주소든 수신하고 보낸 쪽을 피어로 기록 (서버)
    Learn,
}

/// 수신된 패킷 하나
#[derive(Debug, Clone)]
pub struct Delivery {
    /// 보낸 주소
    pub from: SocketAddr,

    /// 패킷 시퀀스 번호
    pub sequence: u32,

    /// 헤더를 제외한 본문
    pub body: Bytes,
}

/// 순서 복원 결과
#[derive(Debug)]
enum Placement {
    /// 지금 전달
    Deliver(Delivery),
    /// 앞선 패킷으로 보관
    Held,
    /// 이미 전달한 시퀀스
    Duplicate,
    /// 보관 한도 초과로 폐기 (ACK 하지 않음)
    Overflow,
}

/// 시퀀스 순서 복원 상태 (고정 피어 모드에서만 사용)
#[derive(Debug)]
struct InOrder {
    /// 다음에 전달할 시퀀스 (첫 패킷이 기준)
    next: Option<u32>,

    /// 앞서 도착한 패킷
    held: BTreeMap<u32, Delivery>,

    /// 보관 가능한 최대 개수
    max_held: usize,
}

impl InOrder {
    fn new(max_held: usize) -> Self {
        Self {
            next: None,
            held: BTreeMap::new(),
            max_held,
        }
    }

    fn take_ready(&mut self) -> Option<Delivery> {
        let next = self.next?;
        let delivery = self.held.remove(&next)?;
        self.next = Some(next.wrapping_add(1));
        Some(delivery)
    }

    fn place(&mut self, delivery: Delivery) -> Placement {
        let sequence = delivery.sequence;
        let Some(next) = self.next else {
            self.next = Some(sequence.wrapping_add(1));
            return Placement::Deliver(delivery);
        };

        let distance = sequence.wrapping_sub(next) as i32;
        if distance == 0 {
            self.next = Some(next.wrapping_add(1));
            Placement::Deliver(delivery)
        } else if distance < 0 {
            Placement::Duplicate
        } else if self.held.contains_key(&sequence) {
            Placement::Held
        } else if self.held.len() < self.max_held {
            self.held.insert(sequence, delivery);
            Placement::Held
        } else {
            Placement::Overflow
        }
    }
}

/// 신뢰 수신자
pub struct ReliableReceiver {
    socket: Arc<UdpSocket>,
    filter: PeerFilter,
    buf: Vec<u8>,
    order: InOrder,
    max_held: usize,
}

impl ReliableReceiver {
    pub fn new(socket: Arc<UdpSocket>, filter: PeerFilter) -> Self {
        Self::with_capacity(socket, filter, MAX_PACKET_SIZE)
    }

    /// 수신 버퍼 크기 지정
    pub fn with_capacity(socket: Arc<UdpSocket>, filter: PeerFilter, max_packet_size: usize) -> Self {
        Self {
            socket,
            filter,
            buf: vec![0u8; max_packet_size.max(PACKET_HEADER_SIZE)],
            order: InOrder::new(MAX_HELD_PACKETS),
            max_held: MAX_HELD_PACKETS,
        }
    }

    /// 순서가 앞서 도착한 패킷의 보관 한도 지정
    ///
    /// 한도를 넘는 패킷은 ACK 없이 폐기되어 송신자가 재전송한다.
    pub fn with_hold_limit(mut self, max_held: usize) -> Self {
        self.max_held = max_held;
        self.order = InOrder::new(max_held);
        self
    }

    pub fn filter(&self) -> PeerFilter {
        self.filter
    }

    /// 순서 복원 기준 초기화
    pub fn reset_order(&mut self) {
        self.order = InOrder::new(self.max_held);
    }

    /// 다음 패킷 본문 수신
    ///
    /// 다른 피어, 헤더보다 짧은 데이터그램, 본문 없는 데이터그램(늦게 도착한 ACK)은
    /// 폐기하고 계속 대기한다. 본문 없는 데이터그램에는 ACK을 보내지 않는다.
    pub async fn receive(&mut self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.order.take_ready() {
                return Ok(delivery);
            }

            let (len, from) = self.socket.recv_from(&mut self.buf).await?;

            if let PeerFilter::Fixed(expected) = self.filter {
                if from != expected {
                    warn!("예상하지 않은 피어의 패킷 폐기: {} (expected {})", from, expected);
                    continue;
                }
            }

            if len < PACKET_HEADER_SIZE {
                warn!("헤더보다 짧은 패킷 폐기: {} bytes from {}", len, from);
                continue;
            }

            let header = PacketHeader::decode(&self.buf[..len])?;

            if len == PACKET_HEADER_SIZE {
                debug!("본문 없는 패킷 무시: seq={} from {}", header.sequence, from);
                continue;
            }

            let delivery = Delivery {
                from,
                sequence: header.sequence,
                body: Bytes::copy_from_slice(&self.buf[PACKET_HEADER_SIZE..len]),
            };
            debug!(
                "recv packet, seq={}, length={}",
                delivery.sequence,
                delivery.body.len()
            );

            let placement = match self.filter {
                PeerFilter::Learn => Placement::Deliver(delivery),
                PeerFilter::Fixed(_) => self.order.place(delivery),
            };

            if let Placement::Overflow = placement {
                warn!("보관 한도 초과, ACK 없이 폐기: seq={}", header.sequence);
                continue;
            }

            // ACK: 받은 헤더 그대로 1회 회신
            if let Err(e) = self
                .socket
                .send_to(&self.buf[..PACKET_HEADER_SIZE], from)
                .await
            {
                warn!("ACK 전송 실패: seq={}, {}", header.sequence, e);
            }

            match placement {
                Placement::Deliver(delivery) => return Ok(delivery),
                Placement::Held => debug!("순서 앞선 패킷 보관: seq={}", header.sequence),
                Placement::Duplicate => debug!("중복 패킷 폐기: seq={}", header.sequence),
                Placement::Overflow => {}
            }
        }
    }
}
