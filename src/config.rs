//! CLI arguments and server configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_STORAGE_DIR: &str = "uploads";
pub const DEFAULT_UPLOAD_MAX_FILES: usize = 50;
pub const DEFAULT_UPLOAD_MAX_BODY: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_UPLOAD_TEMP_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 5;
pub const UPLOAD_CLEAN_INTERVAL_SECS: u64 = 900;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "axo-upload", version = VERSION_INFO, about = "AxoUpload server")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "AXO_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Directory uploaded files are written to"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "AXO_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP"
    )]
    pub bind: String,
    #[arg(
        short = 'p',
        long,
        env = "AXO_PORT",
        default_value_t = DEFAULT_HTTP_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "AXO_CORS_ORIGINS",
        help = "Comma separated CORS origins (unset or * allows any origin)"
    )]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "AXO_NOTIFY_URL",
        help = "Webhook notified after each successful upload"
    )]
    pub notify_url: Option<String>,
    #[arg(
        long,
        env = "AXO_NOTIFY_TIMEOUT_SECS",
        default_value_t = DEFAULT_NOTIFY_TIMEOUT_SECS,
        help = "Webhook request timeout in seconds"
    )]
    pub notify_timeout_secs: u64,
    #[arg(
        long,
        env = "AXO_UPLOAD_MAX_FILES",
        default_value_t = DEFAULT_UPLOAD_MAX_FILES,
        help = "Max files accepted in a single upload request"
    )]
    pub upload_max_files: usize,
    #[arg(
        long,
        env = "AXO_UPLOAD_MAX_BODY",
        default_value_t = DEFAULT_UPLOAD_MAX_BODY,
        help = "Max upload request body in bytes (0 to disable)"
    )]
    pub upload_max_body: u64,
    #[arg(
        long,
        env = "AXO_UPLOAD_TEMP_TTL_SECS",
        default_value_t = DEFAULT_UPLOAD_TEMP_TTL_SECS,
        help = "Stale staging file cleanup threshold in seconds (0 to disable)"
    )]
    pub upload_temp_ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let args = Args::try_parse_from(["axo-upload"]).expect("parse defaults");
        assert_eq!(args.port, DEFAULT_HTTP_PORT);
        assert_eq!(args.storage_dir, DEFAULT_STORAGE_DIR);
        assert_eq!(args.upload_max_files, DEFAULT_UPLOAD_MAX_FILES);
        assert_eq!(args.bind, "0.0.0.0");
        assert!(args.notify_url.is_none());
    }

    #[test]
    fn bind_flag_sets_listen_address() {
        let long =
            Args::try_parse_from(["axo-upload", "--bind", "127.0.0.1"]).expect("parse --bind");
        assert_eq!(long.bind, "127.0.0.1");
        let short = Args::try_parse_from(["axo-upload", "-b", "::1"]).expect("parse -b");
        assert_eq!(short.bind, "::1");
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "axo-upload",
            "-p",
            "8080",
            "--storage-dir",
            "/srv/drop",
            "--notify-url",
            "http://hooks.local/upload",
            "--upload-max-files",
            "10",
        ])
        .expect("parse flags");
        assert_eq!(args.port, 8080);
        assert_eq!(args.storage_dir, "/srv/drop");
        assert_eq!(args.notify_url.as_deref(), Some("http://hooks.local/upload"));
        assert_eq!(args.upload_max_files, 10);
    }
}
