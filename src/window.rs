//! 송신 윈도우
//!
//! 고정 개수의 슬롯 배열. 슬롯 하나가 확인 대기 중인 패킷 하나를 보관한다.
//! 슬롯 배열은 송신자 수명 동안 재사용된다.

use crate::packet::PacketHeader;
use crate::PACKET_HEADER_SIZE;

/// 윈도우 슬롯
#[derive(Debug, Clone)]
pub struct WindowSlot {
    /// 헤더 포함 패킷 바이트 (길이 = 패킷 길이)
    data: Vec<u8>,

    /// 비어 있음 여부
    empty: bool,
}

impl WindowSlot {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            empty: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// 보관 중인 패킷 길이
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn packet(&self) -> &[u8] {
        &self.data
    }

    /// 보관 중인 패킷의 시퀀스 번호
    pub fn sequence(&self) -> Option<u32> {
        if self.empty {
            return None;
        }
        PacketHeader::decode(&self.data).ok().map(|h| h.sequence)
    }

    fn fill(&mut self, sequence: u32, body: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(&PacketHeader::new(sequence).encode());
        self.data.extend_from_slice(body);
        self.empty = false;
    }

    fn clear(&mut self) {
        self.data.clear();
        self.empty = true;
    }
}

/// 슬라이딩 윈도우
#[derive(Debug, Clone)]
pub struct SendWindow {
    slots: Vec<WindowSlot>,
}

impl SendWindow {
    /// `size`개의 빈 슬롯 생성
    pub fn new(size: usize, max_packet_size: usize) -> Self {
        let size = size.max(1);
        let capacity = max_packet_size.max(PACKET_HEADER_SIZE);
        Self {
            slots: (0..size).map(|_| WindowSlot::new(capacity)).collect(),
        }
    }

    /// 슬롯 수
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// 가장 낮은 인덱스의 빈 슬롯
    pub fn find_empty(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.empty)
    }

    /// 가장 낮은 인덱스의 사용 중 슬롯 (재전송 대상)
    pub fn first_occupied(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.empty)
    }

    /// 빈 슬롯에 패킷을 채우고 패킷 바이트 반환
    ///
    /// 이미 사용 중인 슬롯이면 `None`.
    pub fn occupy(&mut self, index: usize, sequence: u32, body: &[u8]) -> Option<&[u8]> {
        let slot = self.slots.get_mut(index)?;
        if !slot.empty {
            return None;
        }
        slot.fill(sequence, body);
        Some(slot.packet())
    }

    /// 시퀀스 번호가 일치하는 사용 중 슬롯을 비움
    ///
    /// 비운 슬롯 인덱스를 반환. 빈 슬롯에 남은 이전 데이터와는 비교하지 않으므로
    /// 같은 ACK이 두 번 와도 다른 슬롯에 영향이 없다.
    pub fn acknowledge(&mut self, sequence: u32) -> Option<usize> {
        let index = self
            .slots
            .iter()
            .position(|s| s.sequence() == Some(sequence))?;
        self.slots[index].clear();
        Some(index)
    }

    pub fn slot(&self, index: usize) -> Option<&WindowSlot> {
        self.slots.get(index)
    }

    /// 사용 중 슬롯 수
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| !s.empty).count()
    }

    /// 모든 슬롯이 비었는지
    pub fn is_drained(&self) -> bool {
        self.slots.iter().all(|s| s.empty)
    }

    /// 모든 슬롯 비우기
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(WindowSlot::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_until_full() {
        let mut window = SendWindow::new(3, 64);
        for seq in 0..3u32 {
            let index = window.find_empty().unwrap();
            assert_eq!(index, seq as usize);
            window.occupy(index, 100 + seq, b"data").unwrap();
            assert!(window.occupied() <= window.size());
        }

        assert_eq!(window.find_empty(), None);
        assert_eq!(window.occupied(), 3);
        assert!(window.occupy(1, 999, b"x").is_none());
    }

    #[test]
    fn test_duplicate_ack_is_harmless() {
        let mut window = SendWindow::new(3, 64);
        window.occupy(0, 10, b"a").unwrap();
        window.occupy(1, 11, b"b").unwrap();
        window.occupy(2, 12, b"c").unwrap();

        assert_eq!(window.acknowledge(11), Some(1));
        assert_eq!(window.acknowledge(11), None);
        assert_eq!(window.occupied(), 2);
        assert_eq!(window.slot(0).unwrap().sequence(), Some(10));
        assert_eq!(window.slot(2).unwrap().sequence(), Some(12));

        // 비운 슬롯이 재사용된 뒤에도 이전 시퀀스 ACK은 무시
        window.occupy(1, 13, b"d").unwrap();
        assert_eq!(window.acknowledge(11), None);
        assert_eq!(window.slot(1).unwrap().sequence(), Some(13));
    }

    #[test]
    fn test_first_occupied_is_lowest_index() {
        let mut window = SendWindow::new(3, 64);
        window.occupy(0, 20, b"a").unwrap();
        window.occupy(1, 21, b"b").unwrap();
        window.acknowledge(20);
        window.occupy(0, 22, b"c").unwrap();

        // 시퀀스 21이 더 오래되었지만 인덱스 0이 우선
        assert_eq!(window.first_occupied(), Some(0));
        assert_eq!(window.slot(0).unwrap().sequence(), Some(22));
    }

    #[test]
    fn test_packet_contents() {
        let mut window = SendWindow::new(1, 64);
        let packet = window.occupy(0, 5, b"body").unwrap().to_vec();
        assert_eq!(packet.len(), 12);
        assert_eq!(window.slot(0).unwrap().len(), 12);
        assert_eq!(&packet[8..], b"body");

        window.reset();
        assert!(window.is_drained());
        assert_eq!(window.first_occupied(), None);
    }
}
