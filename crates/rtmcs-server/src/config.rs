//! Config - コマンドライン引数と環境変数
//!
//! すべての値は `--flag` か環境変数で渡せます（flag が優先）。

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rtmcs_core::store::ReconcilePolicy;

#[derive(Parser, Debug, Clone)]
#[command(name = "rtmcs-server")]
#[command(version, about = "RTMCS admin backend", long_about = None)]
pub struct Config {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3004)]
    pub port: u16,

    /// Directory backing the blob store
    #[arg(long, env = "DATA_DIR", default_value = "./data-store")]
    pub data_dir: PathBuf,

    /// Externally reachable origin, used to build signed upload URLs
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:3004")]
    pub public_base_url: String,

    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "ADMIN_USER")]
    pub admin_user: String,

    #[arg(long, env = "ADMIN_PASS", hide_env_values = true)]
    pub admin_pass: String,

    /// Secret for signing image upload URLs (defaults to JWT_SECRET)
    #[arg(long, env = "UPLOAD_SECRET", hide_env_values = true)]
    pub upload_secret: Option<String>,

    #[arg(long, env = "DRAIN_INTERVAL_MS", default_value_t = 500)]
    pub drain_interval_ms: u64,

    /// fetch-remote | reset-to-baseline
    #[arg(long, env = "RECONCILE_POLICY", default_value = "fetch-remote")]
    pub reconcile_policy: ReconcilePolicy,

    /// Seed document used when the store is empty
    #[arg(long, env = "BASELINE")]
    pub baseline: Option<PathBuf>,
}

impl Config {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn upload_secret(&self) -> &str {
        self.upload_secret.as_deref().unwrap_or(&self.jwt_secret)
    }

    /// 署名付き URL のベース（`PUT {base}/{key}` で受ける）
    pub fn upload_base_url(&self) -> String {
        format!("{}/uploads", self.public_base_url.trim_end_matches('/'))
    }
}
