//! 临时写入与原子落盘的辅助方法。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use uuid::Uuid;

use crate::storage::STAGING_MARKER;

/// 写入完成前位于同目录隐藏临时文件中的目标文件。
pub struct AtomicFile {
    target: PathBuf,
    temp: RemoveOnDrop,
    file: File,
}

impl AtomicFile {
    /// 在目标路径同目录创建临时文件。
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_name = format!(".{base}{STAGING_MARKER}{}", Uuid::new_v4());
        let temp_path = parent.join(temp_name);
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp: RemoveOnDrop::new(vec![temp_path]),
            file,
        })
    }

    /// 返回临时文件的可写句柄。
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        self.temp.remove_now().await;
    }

    /// 同步并重命名为目标文件；失败时临时文件已被清理。
    pub async fn finalize(self) -> io::Result<PathBuf> {
        let AtomicFile {
            target,
            temp,
            file,
        } = self;
        if let Err(err) = file.sync_all().await {
            drop(file);
            temp.remove_now().await;
            return Err(err);
        }
        drop(file);

        if let Err(err) = fs::rename(temp.first(), &target).await {
            temp.remove_now().await;
            return Err(err);
        }
        temp.disarm();

        Ok(target)
    }
}

/// 在被丢弃时同步删除所持路径（请求被取消时兜底），`disarm` 后不再删除。
pub struct RemoveOnDrop {
    paths: Vec<PathBuf>,
}

impl RemoveOnDrop {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn first(&self) -> &Path {
        self.paths.first().map(PathBuf::as_path).unwrap_or(Path::new(""))
    }

    /// 立即删除全部路径。
    pub async fn remove_now(mut self) {
        for path in std::mem::take(&mut self.paths) {
            let _ = fs::remove_file(&path).await;
        }
    }

    pub fn disarm(mut self) {
        self.paths.clear();
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// 将目录项变更刷入磁盘。
pub async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}
