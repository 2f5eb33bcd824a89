//! 파일 조회 서비스
//!
//! 디스패처가 호출하는 좁은 인터페이스와 로컬 파일 시스템 구현.
//! 파일 이름 검증은 디스패처에서 끝난 뒤에만 호출된다.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use md5::{Digest, Md5};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, Take};
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result, DIGEST_SIZE, MAX_PACKET_SIZE};

/// 파일 타입 조회
#[async_trait]
pub trait FileInspector: Send + Sync {
    /// 사람이 읽을 수 있는 파일 타입 설명
    async fn inspect(&self, path: &Path) -> Result<String>;
}

/// 범위 MD5
#[async_trait]
pub trait RangeHasher: Send + Sync {
    async fn hash_range(&self, path: &Path, offset: i32, length: i32) -> Result<[u8; DIGEST_SIZE]>;
}

/// 범위 읽기
#[async_trait]
pub trait RangeReader: Send + Sync {
    type Reader: AsyncRead + Unpin + Send;

    /// 범위를 확인하고 읽기 위치를 맞춘 리더와 정확한 바이트 수 반환
    async fn open_range(&self, path: &Path, offset: i32, length: i32) -> Result<(Self::Reader, u64)>;
}

/// 체크섬 범위 계산: `(시작, 길이)`
///
/// - `offset >= file_len` 에러
/// - `length < 0` 이면 파일 끝까지
/// - `offset + length > file_len` 에러
/// - `length == 0` 은 빈 범위
pub fn checksum_range(offset: i32, length: i32, file_len: u64) -> Result<(u64, u64)> {
    let invalid = || Error::InvalidRange {
        offset,
        length,
        file_len,
    };

    let start = u64::try_from(offset).map_err(|_| invalid())?;
    if start >= file_len {
        return Err(invalid());
    }

    match u64::try_from(length) {
        Err(_) => Ok((start, file_len - start)),
        Ok(count) if start + count > file_len => Err(invalid()),
        Ok(count) => Ok((start, count)),
    }
}

/// 다운로드 범위 계산: `(시작, 길이)`
///
/// 체크섬과 달리 `length == 0` 도 에러. 길이는 응답 헤더에 실리므로 `u32` 범위여야 한다.
pub fn download_range(offset: i32, length: i32, file_len: u64) -> Result<(u64, u64)> {
    let invalid = || Error::InvalidRange {
        offset,
        length,
        file_len,
    };

    if length == 0 {
        return Err(invalid());
    }
    let start = u64::try_from(offset).map_err(|_| invalid())?;
    if start >= file_len {
        return Err(invalid());
    }

    let count = match u64::try_from(length) {
        Err(_) => file_len - start,
        Ok(count) if start + count > file_len => return Err(invalid()),
        Ok(count) => count,
    };

    if count > u64::from(u32::MAX) {
        return Err(invalid());
    }
    Ok((start, count))
}

/// 외부 `file` 명령으로 파일 타입 조회 (셸을 거치지 않음)
#[derive(Debug, Clone)]
pub struct FileCommand {
    program: PathBuf,
}

impl FileCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FileCommand {
    fn default() -> Self {
        Self::new("/usr/bin/file")
    }
}

#[async_trait]
impl FileInspector for FileCommand {
    async fn inspect(&self, path: &Path) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--")
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::Inspection(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(Error::Inspection(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let description = String::from_utf8_lossy(&output.stdout);
        Ok(description.trim_end().to_string())
    }
}

/// 로컬 파일 시스템 구현
#[derive(Debug, Clone, Default)]
pub struct LocalFiles<I = FileCommand> {
    inspector: I,
}

impl LocalFiles {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I> LocalFiles<I> {
    /// 파일 타입 조회기 교체
    pub fn with_inspector(inspector: I) -> Self {
        Self { inspector }
    }
}

async fn open_with_len(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).await?;
    let file_len = file.metadata().await?.len();
    Ok((file, file_len))
}

#[async_trait]
impl<I: FileInspector> FileInspector for LocalFiles<I> {
    async fn inspect(&self, path: &Path) -> Result<String> {
        self.inspector.inspect(path).await
    }
}

#[async_trait]
impl<I: Send + Sync> RangeHasher for LocalFiles<I> {
    async fn hash_range(&self, path: &Path, offset: i32, length: i32) -> Result<[u8; DIGEST_SIZE]> {
        let (mut file, file_len) = open_with_len(path).await?;
        let (start, count) = checksum_range(offset, length, file_len)?;
        file.seek(SeekFrom::Start(start)).await?;

        let mut hasher = Md5::new();
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut remaining = count;

        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = file.read(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            remaining -= n as u64;
        }

        debug!("MD5 계산: {:?} [{}, +{})", path, start, count);

        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&hasher.finalize());
        Ok(digest)
    }
}

#[async_trait]
impl<I: Send + Sync> RangeReader for LocalFiles<I> {
    type Reader = Take<File>;

    async fn open_range(&self, path: &Path, offset: i32, length: i32) -> Result<(Self::Reader, u64)> {
        let (mut file, file_len) = open_with_len(path).await?;
        let (start, count) = download_range(offset, length, file_len)?;
        file.seek(SeekFrom::Start(start)).await?;
        Ok((file.take(count), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_checksum_range_rules() {
        assert_eq!(checksum_range(0, -1, 50).unwrap(), (0, 50));
        assert_eq!(checksum_range(10, -5, 50).unwrap(), (10, 40));
        assert_eq!(checksum_range(10, 40, 50).unwrap(), (10, 40));
        assert_eq!(checksum_range(10, 0, 50).unwrap(), (10, 0));

        assert!(checksum_range(50, -1, 50).is_err());
        assert!(checksum_range(10, 41, 50).is_err());
        assert!(checksum_range(-1, 1, 50).is_err());
        assert!(checksum_range(0, -1, 0).is_err());
    }

    #[test]
    fn test_download_range_rules() {
        assert_eq!(download_range(0, -1, 50).unwrap(), (0, 50));
        assert_eq!(download_range(10, 40, 50).unwrap(), (10, 40));

        assert!(download_range(10, 0, 50).is_err());
        assert!(download_range(-3, 5, 50).is_err());
        assert!(download_range(50, 1, 50).is_err());
        match download_range(10, 100, 50) {
            Err(Error::InvalidRange {
                offset,
                length,
                file_len,
            }) => assert_eq!((offset, length, file_len), (10, 100, 50)),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hash_whole_file() {
        let file = temp_file(b"The quick brown fox jumps over the lazy dog");
        let digest = LocalFiles::new().hash_range(file.path(), 0, -1).await.unwrap();
        assert_eq!(hex::encode(digest), "9e107d9d372bb6826bd81d3542a419d6");
    }

    #[tokio::test]
    async fn test_hash_subrange_and_empty_range() {
        let file = temp_file(b"xxxxabcxxxx");
        let files = LocalFiles::new();

        let digest = files.hash_range(file.path(), 4, 3).await.unwrap();
        assert_eq!(hex::encode(digest), "900150983cd24fb0d6963f7d28e17f72");

        let empty = files.hash_range(file.path(), 4, 0).await.unwrap();
        assert_eq!(hex::encode(empty), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn test_hash_missing_file() {
        let result = LocalFiles::new()
            .hash_range(Path::new("/nonexistent/rfi-missing"), 0, -1)
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_open_range_reads_exact_bytes() {
        let content: Vec<u8> = (0..200u8).collect();
        let file = temp_file(&content);

        let (mut reader, count) = LocalFiles::new().open_range(file.path(), 10, 100).await.unwrap();
        assert_eq!(count, 100);

        let mut read = Vec::new();
        reader.read_to_end(&mut read).await.unwrap();
        assert_eq!(read, &content[10..110]);
    }

    #[tokio::test]
    async fn test_open_range_past_end() {
        let file = temp_file(&[0u8; 50]);
        let result = LocalFiles::new().open_range(file.path(), 10, 100).await;
        assert!(matches!(result, Err(Error::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_file_command_missing_program() {
        let inspector = FileCommand::new("/nonexistent/file-program");
        let result = inspector.inspect(Path::new("a.txt")).await;
        assert!(matches!(result, Err(Error::Inspection(_))));
    }

    #[tokio::test]
    async fn test_file_command_passes_path_after_separator() {
        let inspector = FileCommand::new("echo");
        let output = inspector.inspect(Path::new("notes.md")).await.unwrap();
        assert!(output.ends_with("notes.md"));
    }
}
