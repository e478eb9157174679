//! `mdl serve` – run the RPC server and the download workers.

use anyhow::{Context, Result};
use mdl_core::config::MdlConfig;
use mdl_core::rpc::RpcDispatcher;
use mdl_core::store::{spawn_autopersist, JobStore};
use mdl_core::worker::ToolRunner;
use mdl_core::Dispatcher;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::gate;
use crate::cli::server::{self, AppState};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub port: Option<u16>,
    pub download_dir: Option<PathBuf>,
    pub tool: Option<String>,
    pub jobs: Option<usize>,
}

pub fn apply_overrides(cfg: &mut MdlConfig, overrides: ServeOverrides) {
    if let Some(port) = overrides.port {
        cfg.port = port;
    }
    if let Some(dir) = overrides.download_dir {
        cfg.download_dir = dir;
    }
    if let Some(tool) = overrides.tool {
        cfg.tool_path = tool;
    }
    if let Some(jobs) = overrides.jobs {
        cfg.max_concurrent_jobs = jobs;
    }
}

pub async fn run_serve(cfg: MdlConfig) -> Result<()> {
    let snapshot_path = cfg.resolved_snapshot_path()?;
    let store = JobStore::new(Some(snapshot_path.clone()));
    match store.restore() {
        Ok(summary) => {
            if summary.restored > 0 {
                tracing::info!(
                    restored = summary.restored,
                    supervision_lost = summary.supervision_lost,
                    "restored jobs from {}",
                    snapshot_path.display()
                );
            }
        }
        Err(e) => tracing::warn!("could not restore snapshot, starting empty: {}", e),
    }

    let runner = ToolRunner::from_config(&cfg);
    let dispatcher = Dispatcher::new(store.clone(), Arc::new(runner), cfg.slots());
    dispatcher.start();
    let autopersist = spawn_autopersist(store.clone(), cfg.persist_interval());

    let rpc = Arc::new(RpcDispatcher::new(
        dispatcher.clone(),
        &cfg.tool_path,
        cfg.spawn_timeout(),
    ));
    let app = server::router(AppState {
        rpc,
        gate: gate::from_secret(cfg.rpc_secret.clone()),
    });

    let addr = format!("{}:{}", cfg.listen_addr, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    let local = listener.local_addr()?;
    tracing::info!(
        addr = %local,
        slots = cfg.slots(),
        tool = %cfg.tool_path,
        download_dir = %cfg.download_dir.display(),
        "server listening"
    );
    println!("mdl listening on http://{}", local);

    let shutdown = {
        let dispatcher = dispatcher.clone();
        let store = store.clone();
        async move {
            shutdown_signal().await;
            dispatcher.shutdown();
            persist_now(&store).await;
        }
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server")?;

    autopersist.abort();
    persist_now(&store).await;
    tracing::info!("server stopped");
    Ok(())
}

async fn persist_now(store: &JobStore) {
    let s = store.clone();
    match tokio::task::spawn_blocking(move || s.persist()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("persist on shutdown failed: {}", e),
        Err(e) => tracing::warn!("persist task: {}", e),
    }
}

/// Resolves on SIGINT or (unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let mut cfg = MdlConfig::default();
        apply_overrides(
            &mut cfg,
            ServeOverrides {
                port: Some(8080),
                download_dir: Some(PathBuf::from("/srv/media")),
                tool: None,
                jobs: Some(4),
            },
        );
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.download_dir, PathBuf::from("/srv/media"));
        assert_eq!(cfg.tool_path, "yt-dlp");
        assert_eq!(cfg.slots(), 4);
    }

    #[test]
    fn no_overrides_keep_config() {
        let mut cfg = MdlConfig::default();
        apply_overrides(&mut cfg, ServeOverrides::default());
        assert_eq!(cfg.port, 3033);
        assert_eq!(cfg.max_concurrent_jobs, 2);
    }
}
