//! 日志初始化：支持 `RUST_LOG` 覆盖，默认输出本服务与请求追踪的 info 日志。

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 未设置 `RUST_LOG` 时使用的过滤规则。
fn default_filter() -> String {
    format!("{}=info,tower_http=info,warn", env!("CARGO_CRATE_NAME"))
}

/// 初始化 tracing 日志订阅。
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[cfg(test)]
mod tests {
    use super::default_filter;
    use tracing_subscriber::EnvFilter;

    #[test]
    fn default_filter_parses() {
        let filter = default_filter();
        assert!(filter.starts_with("axo_upload=info"));
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}
