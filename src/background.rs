//! 上传暂存文件的后台清理任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::UPLOAD_CLEAN_INTERVAL_SECS;
use crate::storage::Storage;
use crate::upload::UploadConfig;

/// 启动后台任务（过期暂存文件清理）。
pub fn spawn_background_tasks(storage: Arc<Storage>, upload: Arc<UploadConfig>) {
    if upload.temp_ttl.is_zero() {
        debug!("staging sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(UPLOAD_CLEAN_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match storage.sweep_stale_staging(upload.temp_ttl).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "staging sweep finished"),
                Err(err) => warn!(error = %err, "staging sweep failed"),
            }
        }
    });
}
