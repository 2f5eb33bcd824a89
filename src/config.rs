//! 프로토콜 설정

use std::path::PathBuf;
use std::time::Duration;

use crate::{MAX_PACKET_SIZE, PACKET_HEADER_SIZE};

/// 재전송 대기 간격 하한 (밀리초)
pub const MIN_RETRANSMIT_INTERVAL_MS: u64 = 1;

/// 재전송 대기 간격 상한 (밀리초)
pub const MAX_RETRANSMIT_INTERVAL_MS: u64 = 5000;

/// RFI 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 송신 윈도우 슬롯 수 (동시에 확인 대기 가능한 패킷 수)
    pub window_size: usize,

    /// ACK 대기 / 재전송 간격 (밀리초)
    pub retransmit_interval_ms: u64,

    /// 데이터그램 최대 크기 (패킷 헤더 포함)
    pub max_packet_size: usize,

    /// 수신 메시지 최대 크기 (헤더 포함)
    /// 이보다 긴 길이 필드는 프로토콜 위반으로 처리
    pub max_message_size: usize,

    /// ACK 없이 연속으로 허용하는 대기 주기 수
    /// 초과하면 송신을 포기하고 `PeerUnresponsive` 반환
    pub max_idle_cycles: u32,

    /// 손실 모델 파일 (없으면 항상 전달)
    pub loss_model: Option<PathBuf>,

    /// 서버 자동 종료 시간 (시작 시점 기준)
    pub shutdown_after: Option<Duration>,

    /// 다운로드 본문 읽기 단위 (바이트)
    pub download_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: 3,
            retransmit_interval_ms: 250,           // 250ms
            max_packet_size: MAX_PACKET_SIZE,
            max_message_size: MAX_PACKET_SIZE,
            max_idle_cycles: 240,                  // 250ms 기준 약 60초
            loss_model: None,
            shutdown_after: Some(Duration::from_secs(300)),
            download_chunk_size: 1 << 16,          // 64KB
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 패킷 하나에 실을 수 있는 본문 크기
    pub fn max_packet_payload(&self) -> usize {
        self.max_packet_size.saturating_sub(PACKET_HEADER_SIZE)
    }

    /// 재전송 간격
    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms)
    }

    /// 범위를 벗어난 값 보정
    pub fn normalized(mut self) -> Self {
        self.window_size = self.window_size.max(1);
        self.retransmit_interval_ms = self
            .retransmit_interval_ms
            .clamp(MIN_RETRANSMIT_INTERVAL_MS, MAX_RETRANSMIT_INTERVAL_MS);
        self.max_idle_cycles = self.max_idle_cycles.max(1);
        self.download_chunk_size = self.download_chunk_size.max(1);
        self
    }

    /// 루프백 테스트용 설정
    pub fn loopback() -> Self {
        Self {
            retransmit_interval_ms: 5,
            max_idle_cycles: 400,                  // 5ms 기준 약 2초
            shutdown_after: None,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_clamps() {
        let config = Config {
            window_size: 0,
            retransmit_interval_ms: 60_000,
            ..Config::default()
        }
        .normalized();

        assert_eq!(config.window_size, 1);
        assert_eq!(config.retransmit_interval_ms, MAX_RETRANSMIT_INTERVAL_MS);

        let config = Config {
            retransmit_interval_ms: 0,
            ..Config::default()
        }
        .normalized();
        assert_eq!(config.retransmit_interval_ms, MIN_RETRANSMIT_INTERVAL_MS);
    }

    #[test]
    fn test_packet_payload() {
        assert_eq!(Config::default().max_packet_payload(), 4088);
    }
}
