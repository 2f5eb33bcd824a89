//! 신뢰 송신자 (서버측)
//!
//! - 고정 크기 윈도우 안에서 패킷 전송
//! - 고정 간격 대기 후 ACK 1개 비차단 수신
//! - ACK이 없으면 가장 낮은 인덱스의 사용 중 슬롯 재전송
//! - 손실 모델은 원본 전송에만 적용

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::loss::LossModel;
use crate::packet::{parse_ack, PacketHeader};
use crate::stats::TransferStats;
use crate::window::SendWindow;
use crate::{Config, Error, Result, SERVER_INITIAL_SEQUENCE};

/// 기록해 두는 최근 손실 주입 시퀀스 수
const RECENT_DROPS: usize = 64;

/// 대기 주기 한 번의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    /// 슬롯과 일치한 ACK
    Acked(u32),
    /// 피어의 ACK이지만 일치하는 슬롯 없음
    Unmatched(u32),
    /// ACK 없음 -> 재전송 (재전송 대상이 없으면 `None`)
    Retransmitted(Option<u32>),
}

/// 신뢰 송신자
pub struct ReliableSender {
    /// 공유 소켓 (수신자와 같은 소켓)
    socket: Arc<UdpSocket>,

    /// 현재 피어 주소
    peer: Option<SocketAddr>,

    /// 송신 윈도우
    window: SendWindow,

    /// 다음 시퀀스 번호
    next_sequence: u32,

    /// ACK 대기 간격
    interval: Duration,

    /// 패킷당 본문 최대 크기
    max_payload: usize,

    /// 연속 무응답 허용 주기
    max_idle_cycles: u32,

    /// 손실 모델
    loss_model: LossModel,

    /// 전송 통계
    stats: TransferStats,

    /// 손실 모델로 버린 최근 시퀀스 (오래된 것부터)
    recent_drops: VecDeque<u32>,

    /// ACK 수신 버퍼 (ACK보다 큰 데이터그램도 잘리지 않도록 패킷 크기)
    ack_buf: Vec<u8>,
}

impl ReliableSender {
    /// 새 송신자 생성
    pub fn new(config: &Config, socket: Arc<UdpSocket>, loss_model: LossModel) -> Self {
        let config = config.clone().normalized();
        Self {
            window: SendWindow::new(config.window_size, config.max_packet_size),
            next_sequence: SERVER_INITIAL_SEQUENCE,
            interval: config.retransmit_interval(),
            max_payload: config.max_packet_payload().max(1),
            max_idle_cycles: config.max_idle_cycles,
            ack_buf: vec![0u8; config.max_packet_size],
            stats: TransferStats::new(),
            recent_drops: VecDeque::with_capacity(RECENT_DROPS),
            socket,
            peer: None,
            loss_model,
        }
    }

    /// 송신 대상 설정
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    /// 다음에 사용할 시퀀스 번호
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// 통계 반환
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// 손실 모델로 버린 최근 시퀀스 번호
    pub fn recent_drops(&self) -> impl Iterator<Item = u32> + '_ {
        self.recent_drops.iter().copied()
    }

    /// 버퍼 전체를 패킷으로 나눠 전송하고 모든 ACK을 받을 때까지 대기
    pub async fn send(&mut self, data: &[u8]) -> Result<usize> {
        let peer = self.peer.ok_or(Error::ConnectionClosed)?;

        match self.send_to_peer(data, peer).await {
            Ok(()) => {
                self.stats.completed_sends += 1;
                debug!("신뢰 송신 완료: {} bytes -> {}", data.len(), peer);
                debug!("{}", self.stats.summary());
                Ok(data.len())
            }
            Err(e) => {
                // 다음 송신에 이전 슬롯이 섞이지 않도록 비움
                self.window.reset();
                Err(e)
            }
        }
    }

    async fn send_to_peer(&mut self, data: &[u8], peer: SocketAddr) -> Result<()> {
        let mut remaining = data;
        let mut idle_cycles = 0u32;

        while !remaining.is_empty() {
            match self.window.find_empty() {
                Some(index) => {
                    let take = remaining.len().min(self.max_payload);
                    let (chunk, rest) = remaining.split_at(take);
                    self.transmit_original(index, chunk, peer).await?;
                    remaining = rest;
                }
                None => self.wait_cycle(peer, &mut idle_cycles).await?,
            }
        }

        while !self.window.is_drained() {
            self.wait_cycle(peer, &mut idle_cycles).await?;
        }

        Ok(())
    }

    /// 빈 슬롯에 새 패킷을 채우고 손실 모델에 따라 전송
    async fn transmit_original(
        &mut self,
        index: usize,
        chunk: &[u8],
        peer: SocketAddr,
    ) -> Result<()> {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let deliver = self.loss_model.next_bit();

        self.stats.original_packets += 1;
        self.stats.total_bytes += chunk.len() as u64;

        let packet = self
            .window
            .occupy(index, sequence, chunk)
            .ok_or_else(|| Error::Unknown(format!("슬롯 {} 사용 중", index)))?;
        let packet_len = packet.len();

        if deliver {
            self.socket.send_to(packet, peer).await?;
            debug!("transmission: packet seq={}, length={}", sequence, packet_len);
        } else {
            self.stats.dropped_originals += 1;
            if self.recent_drops.len() == RECENT_DROPS {
                self.recent_drops.pop_front();
            }
            self.recent_drops.push_back(sequence);
            debug!("lost transmission: packet seq={}, length={}", sequence, packet_len);
        }

        self.stats.record_in_flight(self.window.occupied());
        Ok(())
    }

    /// 대기 -> ACK 확인 -> 없으면 재전송
    async fn wait_cycle(&mut self, peer: SocketAddr, idle_cycles: &mut u32) -> Result<()> {
        match self.wait_ack_or_retransmit(peer).await? {
            WaitOutcome::Acked(_) | WaitOutcome::Unmatched(_) => {
                *idle_cycles = 0;
            }
            WaitOutcome::Retransmitted(_) => {
                *idle_cycles += 1;
                if *idle_cycles >= self.max_idle_cycles {
                    warn!("피어 {} 응답 없음: {}회 대기", peer, idle_cycles);
                    return Err(Error::PeerUnresponsive {
                        cycles: *idle_cycles,
                    });
                }
            }
        }
        Ok(())
    }

    async fn wait_ack_or_retransmit(&mut self, peer: SocketAddr) -> Result<WaitOutcome> {
        tokio::time::sleep(self.interval).await;
        self.stats.wait_cycles += 1;

        if let Some(sequence) = self.try_recv_ack(peer) {
            return Ok(match self.window.acknowledge(sequence) {
                Some(index) => {
                    self.stats.acks_matched += 1;
                    debug!("recv ack: packet seq={}, slot={}", sequence, index);
                    WaitOutcome::Acked(sequence)
                }
                None => {
                    self.stats.acks_ignored += 1;
                    debug!("ACK 무시 (일치 슬롯 없음): seq={}", sequence);
                    WaitOutcome::Unmatched(sequence)
                }
            });
        }

        // 재전송: 가장 낮은 인덱스의 사용 중 슬롯 (손실 모델 미적용)
        let Some(index) = self.window.first_occupied() else {
            return Ok(WaitOutcome::Retransmitted(None));
        };
        let Some(slot) = self.window.slot(index) else {
            return Ok(WaitOutcome::Retransmitted(None));
        };

        let sequence = PacketHeader::decode(slot.packet())?.sequence;
        self.socket.send_to(slot.packet(), peer).await?;
        self.stats.retransmissions += 1;
        debug!("retransmission: packet seq={}, length={}", sequence, slot.len());

        Ok(WaitOutcome::Retransmitted(Some(sequence)))
    }

    /// 데이터그램 1개 비차단 수신 후 피어의 ACK이면 시퀀스 반환
    fn try_recv_ack(&mut self, peer: SocketAddr) -> Option<u32> {
        match self.socket.try_recv_from(&mut self.ack_buf) {
            Ok((len, from)) => {
                if from != peer {
                    self.stats.acks_ignored += 1;
                    debug!("다른 피어의 데이터그램 무시: {}", from);
                    return None;
                }
                let ack = parse_ack(&self.ack_buf[..len]);
                if ack.is_none() {
                    self.stats.acks_ignored += 1;
                    debug!("잘못된 ACK 크기: {} bytes", len);
                }
                ack
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("ACK 수신 에러: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::PACKET_HEADER_SIZE;

    type Delivered = Arc<Mutex<BTreeMap<u32, Vec<u8>>>>;

    /// 받은 모든 패킷에 ACK을 보내는 테스트 피어
    async fn spawn_acking_peer() -> (SocketAddr, Delivered, tokio::task::JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let delivered: Delivered = Arc::new(Mutex::new(BTreeMap::new()));
        let sink = delivered.clone();

        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let header = PacketHeader::decode(&buf[..len]).unwrap();
                sink.lock()
                    .unwrap()
                    .insert(header.sequence, buf[PACKET_HEADER_SIZE..len].to_vec());
                let _ = socket.send_to(&buf[..PACKET_HEADER_SIZE], from).await;
            }
        });

        (addr, delivered, handle)
    }

    async fn sender_with(loss_model: LossModel, config: Config) -> ReliableSender {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        ReliableSender::new(&config, socket, loss_model)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_send_splits_into_sequenced_packets() {
        let (peer, delivered, handle) = spawn_acking_peer().await;
        let mut sender = sender_with(LossModel::none(), Config::loopback()).await;
        sender.set_peer(peer);

        let data = payload(20_000);
        assert_eq!(sender.send(&data).await.unwrap(), 20_000);
        handle.abort();

        let delivered = delivered.lock().unwrap();
        let sequences: Vec<u32> = delivered.keys().copied().collect();
        assert_eq!(sequences, (100_001..100_006).collect::<Vec<_>>());

        let joined: Vec<u8> = delivered.values().flatten().copied().collect();
        assert_eq!(joined, data);
        assert!(delivered.values().all(|b| b.len() <= 4088));

        assert!(sender.window().is_drained());
        assert_eq!(sender.next_sequence(), 100_006);
        assert_eq!(sender.stats().original_packets, 5);
        assert!(sender.stats().peak_in_flight <= 3);
    }

    #[tokio::test]
    async fn test_loss_applies_only_to_original_sends() {
        let (peer, delivered, handle) = spawn_acking_peer().await;
        let mut sender =
            sender_with(LossModel::from_bits([true, true, false]), Config::loopback()).await;
        sender.set_peer(peer);

        let data = payload(5 * 4088);
        sender.send(&data).await.unwrap();
        handle.abort();

        // 비트 1,1,0,1,1 -> 세 번째 원본만 버려짐
        let stats = sender.stats();
        assert_eq!(stats.original_packets, 5);
        assert_eq!(stats.dropped_originals, 1);
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(sender.recent_drops().collect::<Vec<_>>(), vec![100_003]);

        // 버려진 패킷도 재전송으로 결국 도착
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 5);
        assert!(delivered.contains_key(&100_003));
        let joined: Vec<u8> = delivered.values().flatten().copied().collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_same_bits_drop_same_sequences() {
        let bits = [true, false, true, true, false, false, true];
        let data = payload(9 * 4088 + 17);

        let mut runs = Vec::new();
        for _ in 0..2 {
            let (peer, delivered, handle) = spawn_acking_peer().await;
            let mut sender = sender_with(LossModel::from_bits(bits), Config::loopback()).await;
            sender.set_peer(peer);

            sender.send(&data).await.unwrap();
            handle.abort();

            assert_eq!(delivered.lock().unwrap().len(), 10);
            runs.push(sender.recent_drops().collect::<Vec<_>>());
        }

        // 원본 10개에 비트 1,0,1,1,0,0,1,1,0,1 적용
        let expected = vec![100_002, 100_005, 100_006, 100_009];
        assert_eq!(runs[0], expected);
        assert_eq!(runs[1], expected);
    }

    #[tokio::test]
    async fn test_all_dropped_still_delivered_by_retransmission() {
        let (peer, delivered, handle) = spawn_acking_peer().await;
        let mut sender = sender_with(LossModel::from_bits([false]), Config::loopback()).await;
        sender.set_peer(peer);

        sender.send(&payload(3 * 4088)).await.unwrap();
        handle.abort();

        assert_eq!(sender.stats().dropped_originals, 3);
        assert!(sender.stats().retransmissions >= 3);
        assert_eq!(delivered.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unresponsive_peer() {
        // ACK을 보내지 않는 피어
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = Config {
            max_idle_cycles: 3,
            ..Config::loopback()
        };
        let mut sender = sender_with(LossModel::none(), config).await;
        sender.set_peer(silent.local_addr().unwrap());

        let result = sender.send(b"hello").await;
        assert!(matches!(result, Err(Error::PeerUnresponsive { cycles: 3 })));
        assert!(sender.window().is_drained());
        assert_eq!(sender.stats().retransmissions, 3);
    }

    #[tokio::test]
    async fn test_send_without_peer() {
        let mut sender = sender_with(LossModel::none(), Config::loopback()).await;
        assert!(matches!(
            sender.send(b"x").await,
            Err(Error::ConnectionClosed)
        ));
    }
}
