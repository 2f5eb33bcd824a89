//! 손실 모델 (테스트용 결정적 손실 주입)
//!
//! 비트열을 순서대로 소비한다. 1이면 전달, 0이면 버림.
//! 원본 전송 1회당 1비트, 재전송에는 적용하지 않는다.
//! 비트열 끝에 도달하면 처음으로 돌아간다.

use std::path::Path;

use tracing::debug;

use crate::{Error, Result};

/// 손실 모델
#[derive(Debug, Clone, Default)]
pub struct LossModel {
    /// 비트열 (비어 있으면 항상 전달)
    bits: Vec<bool>,

    /// 다음에 소비할 위치
    cursor: usize,
}

impl LossModel {
    /// 손실 없음
    pub fn none() -> Self {
        Self::default()
    }

    /// 비트열로 생성
    pub fn from_bits(bits: impl Into<Vec<bool>>) -> Self {
        Self {
            bits: bits.into(),
            cursor: 0,
        }
    }

    /// 바이트열로 생성 (각 바이트의 최하위 비트부터)
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let bits = bytes
            .iter()
            .flat_map(|&byte| (0..8).map(move |i| (byte >> i) & 1 == 1))
            .collect::<Vec<_>>();
        Self::from_bits(bits)
    }

    /// 파일에서 로드
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::InvalidLossModel(format!("{}: {}", path.display(), e)))?;

        debug!("손실 모델 로드: {:?}, {} bits", path, bytes.len() * 8);
        Ok(Self::from_bytes(&bytes))
    }

    /// 손실 주입 여부
    pub fn is_active(&self) -> bool {
        !self.bits.is_empty()
    }

    /// 비트열 길이
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// 다음 원본 전송을 실제로 보낼지 여부
    pub fn next_bit(&mut self) -> bool {
        if self.bits.is_empty() {
            return true;
        }
        if self.cursor >= self.bits.len() {
            self.cursor = 0;
        }
        let bit = self.bits[self.cursor];
        self.cursor += 1;
        bit
    }

    /// 처음 위치로 되돌림
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_no_model_always_delivers() {
        let mut model = LossModel::none();
        assert!((0..100).all(|_| model.next_bit()));
        assert!(!model.is_active());
    }

    #[test]
    fn test_bytes_are_lsb_first() {
        // 0b0000_0110 -> 0,1,1,0,0,0,0,0
        let mut model = LossModel::from_bytes(&[0x06]);
        let bits: Vec<bool> = (0..8).map(|_| model.next_bit()).collect();
        assert_eq!(
            bits,
            vec![false, true, true, false, false, false, false, false]
        );
    }

    #[test]
    fn test_wraps_over_whole_sequence() {
        let mut model = LossModel::from_bytes(&[0xff, 0x00]);
        let first: Vec<bool> = (0..16).map(|_| model.next_bit()).collect();
        let second: Vec<bool> = (0..16).map(|_| model.next_bit()).collect();

        assert_eq!(first, second);
        assert!(first[..8].iter().all(|&b| b));
        assert!(first[8..].iter().all(|&b| !b));
    }

    #[test]
    fn test_deterministic_across_instances() {
        let pattern = [true, true, false, true, false];
        let mut a = LossModel::from_bits(pattern);
        let mut b = LossModel::from_bits(pattern);

        let run_a: Vec<bool> = (0..37).map(|_| a.next_bit()).collect();
        let run_b: Vec<bool> = (0..37).map(|_| b.next_bit()).collect();
        assert_eq!(run_a, run_b);

        a.rewind();
        assert_eq!(a.next_bit(), pattern[0]);
    }

    #[tokio::test]
    async fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x01]).unwrap();

        let mut model = LossModel::from_file(file.path()).await.unwrap();
        assert_eq!(model.len(), 8);
        assert!(model.next_bit());
        assert!(!model.next_bit());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = LossModel::from_file("/nonexistent/loss.bin").await;
        assert!(matches!(result, Err(Error::InvalidLossModel(_))));
    }
}
