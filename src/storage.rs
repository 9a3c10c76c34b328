use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{info, warn};

/// Marker embedded in staging file names, see [`crate::atomic::AtomicFile`].
pub const STAGING_MARKER: &str = ".tmp.";

const NAME_MAX: usize = 255;
/// Leading dot, marker and hyphenated UUID added to a staging file name.
const STAGING_OVERHEAD: usize = 1 + STAGING_MARKER.len() + 36;
/// Longest storage name whose staging file still fits in `NAME_MAX` bytes.
pub const MAX_STORAGE_NAME_LEN: usize = NAME_MAX - STAGING_OVERHEAD;
const MAX_KEPT_EXTENSION: usize = 16;

#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    last_stamp: AtomicU64,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            last_stamp: AtomicU64::new(0),
        }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Millisecond stamp, strictly increasing for the lifetime of this storage.
    pub fn next_stamp(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Returns the on-disk leaf name for a declared name: `<stamp>-<flattened>`,
    /// shortened to at most [`MAX_STORAGE_NAME_LEN`] bytes.
    pub fn storage_name(&self, declared: &DeclaredName) -> String {
        let stamp = self.next_stamp().to_string();
        let budget = MAX_STORAGE_NAME_LEN.saturating_sub(stamp.len() + 1);
        format!("{stamp}-{}", declared.flattened_within(budget))
    }

    pub fn target_path(&self, storage_name: &str) -> PathBuf {
        self.root.join(storage_name)
    }

    /// Removes staging files older than `ttl` left behind by interrupted uploads.
    pub async fn sweep_stale_staging(&self, ttl: Duration) -> io::Result<usize> {
        if ttl.is_zero() {
            return Ok(0);
        }

        let now = SystemTime::now();
        let mut removed = 0;
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with('.') || !name.contains(STAGING_MARKER) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(age) = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
            else {
                continue;
            };
            if age < ttl {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    info!(path = ?path, "removed stale staging file");
                }
                Err(err) => warn!(path = ?path, error = %err, "failed to remove staging file"),
            }
        }

        Ok(removed)
    }
}

/// 客户端声明的相对路径，已规范化并拒绝路径穿越。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredName {
    segments: Vec<String>,
}

impl DeclaredName {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let invalid = || StorageError::InvalidName(raw.to_string());

        if raw.contains('\0') {
            return Err(invalid());
        }
        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(invalid()),
                _ => segments.push(segment.to_string()),
            }
        }

        let Some(first) = segments.first() else {
            return Err(invalid());
        };
        if has_drive_prefix(first) {
            return Err(invalid());
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_path(&self) -> String {
        self.segments.join("/")
    }

    /// 单层文件名：目录层级只用于日志树，不在磁盘上创建。
    pub fn flattened(&self) -> String {
        self.segments.join("_")
    }

    /// 不超过 `max_len` 字节的单层文件名；过长时截断前部并保留扩展名。
    pub fn flattened_within(&self, max_len: usize) -> String {
        let flat = self.flattened();
        if flat.len() <= max_len {
            return flat;
        }

        let leaf = self.segments.last().map(String::as_str).unwrap_or_default();
        let extension = match leaf.rfind('.') {
            Some(dot) if dot > 0 && leaf.len() - dot <= MAX_KEPT_EXTENSION => &leaf[dot..],
            _ => "",
        };
        let mut end = max_len.saturating_sub(extension.len()).min(flat.len());
        while !flat.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{extension}", &flat[..end])
    }
}

/// Windows 盘符段（如 `C:`）；`a:b.txt` 之类的普通文件名不受影响。
fn has_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName(String),
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
