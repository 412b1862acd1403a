//! 主应用程序入口
//!
//! 加载配置、选择存储后端、启动后台清理任务与 Axum Web API 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{EventFanout, PartyService};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    if config.uses_development_secret() {
        tracing::warn!("using the development JWT secret, set APP_JWT__SECRET before deploying");
    }
    tracing::info!(config = %config.sanitize(), "configuration loaded");

    let infrastructure = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
    })
    .await
    .context("failed to initialise storage")?;
    tracing::info!(backend = infrastructure.backend, "storage selected");

    let state = AppState::build(&config, infrastructure.profiles, infrastructure.parties);

    // 启动时修复上次异常退出留下的半写入好友关系
    match state.friend_service.reconcile().await {
        Ok(repaired) => tracing::info!(repaired, "friend graph reconciled"),
        Err(err) => tracing::warn!(error = %err, "friend graph reconciliation failed"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(run_expiry_sweeper(
        state.party_service.clone(),
        state.fanout.clone(),
        config.party.sweep_interval(),
        shutdown_rx,
    ));

    let app = router(state);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!("派对协调服务启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = sweeper.await {
        tracing::warn!(error = %err, "expiry sweeper did not stop cleanly");
    }
    tracing::info!("server stopped");
    Ok(())
}

/// 定期删除超过存活时间的派对，并回收空闲的在线状态锁
async fn run_expiry_sweeper(
    parties: Arc<PartyService>,
    fanout: Arc<EventFanout>,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    // 第一次 tick 立即返回，跳过
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = parties.sweep_expired().await {
                    tracing::warn!(error = %err, "party sweep failed");
                }
                fanout.prune_transitions();
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
