//! 存活探测与健康指标处理器。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::time::Instant;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// 进程启动时刻，用于计算运行时长。
#[derive(Clone, Copy, Debug)]
pub struct StartedAt(pub Instant);

#[derive(Serialize)]
pub(crate) struct PingResponse {
    message: &'static str,
    server: &'static str,
    timestamp: String,
}

#[derive(Serialize, Default, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProcessMemory {
    rss: u64,
    virtual_memory: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HealthReport {
    status: &'static str,
    uptime: String,
    memory: ProcessMemory,
    cpu_load: [f64; 3],
    free_memory: String,
    total_memory: String,
    platform: &'static str,
    runtime_version: &'static str,
    timestamp: String,
}

/// 系统指标快照；读取失败的项保持为 0。
#[derive(Default, Debug, Clone, Copy)]
struct SystemSnapshot {
    memory: ProcessMemory,
    load: [f64; 3],
    free_bytes: u64,
    total_bytes: u64,
}

pub async fn root() -> &'static str {
    "Backend is running successfully!"
}

pub async fn ping() -> JsonResponse<PingResponse> {
    JsonResponse(PingResponse {
        message: "pong",
        server: "alive and well",
        timestamp: now_iso(),
    })
}

/// 返回进程与主机的健康指标，指标不可用时降级为 0。
pub async fn health(Extension(started): Extension<StartedAt>) -> JsonResponse<HealthReport> {
    let snapshot = match tokio::task::spawn_blocking(collect_snapshot).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "system metrics collection failed");
            SystemSnapshot::default()
        }
    };

    JsonResponse(HealthReport {
        status: "✅ healthy",
        uptime: format!("{:.2}s", started.0.elapsed().as_secs_f64()),
        memory: snapshot.memory,
        cpu_load: snapshot.load,
        free_memory: format_mib(snapshot.free_bytes),
        total_memory: format_mib(snapshot.total_bytes),
        platform: std::env::consts::OS,
        runtime_version: crate::build::RUST_VERSION,
        timestamp: now_iso(),
    })
}

fn collect_snapshot() -> SystemSnapshot {
    let mut system = System::new();
    system.refresh_memory();

    let memory = match sysinfo::get_current_pid() {
        Ok(pid) => {
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                false,
                ProcessRefreshKind::nothing().with_memory(),
            );
            system
                .process(pid)
                .map(|process| ProcessMemory {
                    rss: process.memory(),
                    virtual_memory: process.virtual_memory(),
                })
                .unwrap_or_default()
        }
        Err(err) => {
            debug!(error = err, "current pid unavailable");
            ProcessMemory::default()
        }
    };
    let load = System::load_average();

    SystemSnapshot {
        memory,
        load: [load.one, load.five, load.fifteen],
        free_bytes: system.available_memory(),
        total_bytes: system.total_memory(),
    }
}

fn format_mib(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
