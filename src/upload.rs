//! multipart 批量上传处理器：暂存、整批落盘、目录树日志与完成通知。

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Extension, Multipart};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::atomic::{AtomicFile, RemoveOnDrop, sync_dir};
use crate::error::ApiError;
use crate::notify::{Notifier, UploadSummary};
use crate::storage::{DeclaredName, Storage, StorageError};
use crate::tree::{format_kib, log_tree};

#[derive(Debug)]
pub struct UploadConfig {
    pub max_files: usize,
    pub temp_ttl: Duration,
}

/// 单个已落盘的上传文件。
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub declared_name: DeclaredName,
    pub storage_name: String,
    pub storage_path: PathBuf,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug)]
pub enum UploadError {
    NoFilesProvided,
    TooManyFiles(usize),
    InvalidMultipart(String),
    PayloadTooLarge,
    Storage(StorageError),
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        UploadError::Storage(err)
    }
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::PayloadTooLarge
        } else {
            UploadError::InvalidMultipart(err.body_text())
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileManifest {
    name: String,
    original_name: String,
    path: String,
    size: u64,
    mimetype: String,
}

impl From<&UploadedFile> for FileManifest {
    fn from(file: &UploadedFile) -> Self {
        Self {
            name: file.storage_name.clone(),
            original_name: file.declared_name.as_path(),
            path: file.storage_path.to_string_lossy().into_owned(),
            size: file.size,
            mimetype: file.content_type.clone(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct UploadResponse {
    success: bool,
    message: String,
    files: Vec<FileManifest>,
}

struct StagedFile {
    atomic: AtomicFile,
    file: UploadedFile,
}

/// 接收一批文件并返回文件清单。
pub async fn upload_files(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    Extension(notifier): Extension<Arc<Notifier>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|rejection| UploadError::InvalidMultipart(rejection.body_text()))?;

    let files = match receive(&storage, &upload, &mut multipart).await {
        Ok(files) => files,
        Err(UploadError::NoFilesProvided) => {
            warn!("⚠️ Upload attempted but no files were sent");
            return Err(UploadError::NoFilesProvided.into());
        }
        Err(err) => {
            warn!(error = ?err, "upload rejected");
            return Err(err.into());
        }
    };

    info!("📥 Received {} file(s):", files.len());
    for file in &files {
        info!(
            " - {} ({} KB, {})",
            file.storage_name,
            format_kib(file.size),
            file.content_type
        );
    }
    log_tree(&files);

    let response = UploadResponse {
        success: true,
        message: format!("{} file(s) uploaded successfully", files.len()),
        files: files.iter().map(FileManifest::from).collect(),
    };
    notifier.notify(UploadSummary {
        files_uploaded: files.len(),
    });
    Ok(JsonResponse(response))
}

/// 读取全部文件分段；任一失败则整批丢弃，磁盘上不留下该批次的文件。
pub async fn receive(
    storage: &Storage,
    config: &UploadConfig,
    multipart: &mut Multipart,
) -> Result<Vec<UploadedFile>, UploadError> {
    let mut staged = Vec::new();
    if let Err(err) = stage_parts(storage, config, multipart, &mut staged).await {
        discard(staged).await;
        drain(multipart).await;
        return Err(err);
    }
    if staged.is_empty() {
        return Err(UploadError::NoFilesProvided);
    }
    commit(storage, staged).await
}

async fn stage_parts(
    storage: &Storage,
    config: &UploadConfig,
    multipart: &mut Multipart,
    staged: &mut Vec<StagedFile>,
) -> Result<(), UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        let raw_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                debug!(field = field.name().unwrap_or_default(), "skipping non-file part");
                continue;
            }
        };
        if staged.len() >= config.max_files {
            return Err(UploadError::TooManyFiles(config.max_files));
        }

        let declared_name = DeclaredName::parse(&raw_name)?;
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(declared_name.as_path())
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
        let storage_name = storage.storage_name(&declared_name);
        let storage_path = storage.target_path(&storage_name);

        let mut atomic = AtomicFile::new(&storage_path)
            .await
            .map_err(StorageError::from)?;
        let size = match write_part(&mut field, atomic.file_mut()).await {
            Ok(size) => size,
            Err(err) => {
                atomic.cleanup().await;
                return Err(err);
            }
        };
        debug!(name = storage_name, size, "upload part staged");

        staged.push(StagedFile {
            atomic,
            file: UploadedFile {
                declared_name,
                storage_name,
                storage_path,
                size,
                content_type,
            },
        });
    }
    Ok(())
}

async fn write_part(field: &mut Field<'_>, file: &mut File) -> Result<u64, UploadError> {
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk).await.map_err(StorageError::from)?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

async fn commit(
    storage: &Storage,
    staged: Vec<StagedFile>,
) -> Result<Vec<UploadedFile>, UploadError> {
    // 请求在提交中途被取消时，已重命名的文件随守卫一起删除。
    let mut committed = RemoveOnDrop::new(Vec::with_capacity(staged.len()));
    let mut files = Vec::with_capacity(staged.len());
    let mut pending = staged.into_iter();

    while let Some(StagedFile { atomic, file }) = pending.next() {
        match atomic.finalize().await {
            Ok(path) => {
                committed.push(path);
                files.push(file);
            }
            Err(err) => {
                warn!(
                    name = file.storage_name,
                    error = %err,
                    "commit failed, rolling back batch"
                );
                discard(pending.collect()).await;
                committed.remove_now().await;
                return Err(StorageError::Io(err).into());
            }
        }
    }
    committed.disarm();

    if let Err(err) = sync_dir(storage.root_path()).await {
        debug!(error = %err, "storage root sync failed");
    }
    Ok(files)
}

async fn discard(staged: Vec<StagedFile>) {
    for StagedFile { atomic, file } in staged {
        debug!(target_path = ?atomic.target(), name = file.storage_name, "discard staged part");
        atomic.cleanup().await;
    }
}

/// 读完剩余请求体，避免浏览器因连接被重置而看不到错误响应。
async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}
