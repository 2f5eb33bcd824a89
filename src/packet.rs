//! 데이터그램 패킷 헤더
//!
//! ```text
//! ┌───────────┬───────────┬────────────┐
//! │ Sequence  │ Reserved  │ Body       │
//! │ uint32 BE │ 4 bytes 0 │ ...        │
//! └───────────┴───────────┴────────────┘
//! ```
//!
//! ACK은 본문 없이 헤더 8바이트만 그대로 되돌려 보낸다.

use crate::{Error, Result, PACKET_HEADER_SIZE};

/// ACK 패킷 크기
pub const ACK_SIZE: usize = PACKET_HEADER_SIZE;

/// 패킷 헤더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// 시퀀스 번호
    pub sequence: u32,

    /// 예약 필드 (항상 0으로 송신)
    pub reserved: [u8; 4],
}

impl PacketHeader {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            reserved: [0u8; 4],
        }
    }

    pub fn encode(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// 기존 버퍼 앞부분에 헤더 기록
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= PACKET_HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.reserved);
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < PACKET_HEADER_SIZE {
            return Err(Error::InvalidPacket { len: buf.len() });
        }
        Ok(Self {
            sequence: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            reserved: [buf[4], buf[5], buf[6], buf[7]],
        })
    }
}

/// 헤더 + 본문으로 패킷 생성
pub fn build_packet(sequence: u32, body: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; PACKET_HEADER_SIZE + body.len()];
    PacketHeader::new(sequence).encode_into(&mut packet);
    packet[PACKET_HEADER_SIZE..].copy_from_slice(body);
    packet
}

/// 정확히 ACK 크기인 데이터그램만 ACK으로 해석
pub fn parse_ack(datagram: &[u8]) -> Option<u32> {
    if datagram.len() != ACK_SIZE {
        return None;
    }
    PacketHeader::decode(datagram).ok().map(|h| h.sequence)
}
