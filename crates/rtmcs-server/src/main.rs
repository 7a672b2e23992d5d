//! rtmcs-server - RTMCS 管理画面用 API サーバ
//!
//! # 起動の流れ
//! 1. Config（flag / 環境変数）を読む
//! 2. LocalBlobStore と App を組み立て、初回 reconcile
//! 3. DrainLoop を起動して axum で待ち受け
//! 4. Ctrl-C で停止要求 → 残りの mutation を commit してから終了

mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use rtmcs_core::app::AppBuilder;
use rtmcs_core::impls::LocalBlobStore;
use rtmcs_core::ports::SystemClock;
use tokio::net::TcpListener;

use crate::auth::{AdminCredentials, AuthState, JwtManager};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();

    let blob = Arc::new(LocalBlobStore::new(
        &config.data_dir,
        config.upload_base_url(),
        config.upload_secret().as_bytes(),
        Arc::new(SystemClock),
    ));

    let mut builder = AppBuilder::new(blob.clone())
        .policy(config.reconcile_policy)
        .drain_interval(config.drain_interval());
    if let Some(path) = &config.baseline {
        builder = builder.baseline_json(tokio::fs::read_to_string(path).await?);
    }
    let app = builder.build()?;

    if let Err(e) = app.store.reconcile().await {
        warn!("initial load failed, retrying on first request: {e}");
    }
    let drain = app.spawn_drain_loop();

    let auth = AuthState {
        jwt: JwtManager::new(&config.jwt_secret),
        admin: AdminCredentials {
            username: config.admin_user.clone(),
            password: config.admin_pass.clone(),
        },
    };
    let router = routes::router(app.clone(), auth, Some(blob));

    let listener = TcpListener::bind(config.socket_addr()).await?;
    info!(
        "RTMCS server listening on {} (data: {}, policy: {:?})",
        listener.local_addr()?,
        config.data_dir.display(),
        config.reconcile_policy
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down; flushing queued mutations");
    app.shutdown(drain).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
