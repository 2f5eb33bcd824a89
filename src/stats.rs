//! 전송 통계

use std::time::{Duration, Instant};

/// 신뢰 송신 통계 (송신자 수명 동안 누적)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 완료된 신뢰 송신 호출 수
    pub completed_sends: u64,

    /// 슬롯에 담긴 페이로드 총 바이트 (헤더 제외)
    pub total_bytes: u64,

    /// 원본 패킷 수 (손실 모델로 버려진 것 포함)
    pub original_packets: u64,

    /// 손실 모델로 버려진 원본 패킷 수
    pub dropped_originals: u64,

    /// 재전송 수
    pub retransmissions: u64,

    /// 슬롯과 일치한 ACK 수
    pub acks_matched: u64,

    /// 무시된 데이터그램 수 (불일치 ACK, 잘못된 크기, 다른 피어)
    pub acks_ignored: u64,

    /// ACK 대기 주기 수
    pub wait_cycles: u64,

    /// 동시에 사용된 슬롯 수의 최대값
    pub peak_in_flight: usize,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            completed_sends: 0,
            total_bytes: 0,
            original_packets: 0,
            dropped_originals: 0,
            retransmissions: 0,
            acks_matched: 0,
            acks_ignored: 0,
            wait_cycles: 0,
            peak_in_flight: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 사용 중 슬롯 수 기록
    pub fn record_in_flight(&mut self, in_flight: usize) {
        self.peak_in_flight = self.peak_in_flight.max(in_flight);
    }

    /// 주입된 손실률
    pub fn injected_loss_rate(&self) -> f64 {
        if self.original_packets == 0 {
            return 0.0;
        }
        self.dropped_originals as f64 / self.original_packets as f64
    }

    /// 실제 송신된 패킷 수
    pub fn packets_on_wire(&self) -> u64 {
        self.original_packets - self.dropped_originals + self.retransmissions
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Sends: {} | Bytes: {} | Packets: {} (dropped {}, {:.1}%) | Retransmissions: {} | ACKs: {} matched, {} ignored | Peak in flight: {}",
            self.elapsed().as_secs_f64(),
            self.completed_sends,
            self.total_bytes,
            self.original_packets,
            self.dropped_originals,
            self.injected_loss_rate() * 100.0,
            self.retransmissions,
            self.acks_matched,
            self.acks_ignored,
            self.peak_in_flight,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
