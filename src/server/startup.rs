// Server startup: open and validate every backend before the listener
// starts, then serve until interrupted.

use crate::constants;
use crate::lookup::{BackendPaths, Backends};
use crate::server::{ServerConfig, ServerState};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Open all configured backends, building or loading TOCs when requested.
/// Every file is mapped and validated here so a corrupt database refuses
/// startup instead of failing queries later.
pub fn prepare_backends(paths: &BackendPaths, config: &ServerConfig) -> Result<Backends> {
    anyhow::ensure!(
        paths.any_configured(),
        "no backend configured; pass at least one of --sha1-db, --ntlm-db, \
         --sha1t64-db, --binfuse8-filter, --binfuse16-filter"
    );
    let toc_bits = config.toc.then_some(config.toc_bits);
    if let Some(bits) = toc_bits {
        anyhow::ensure!(
            (constants::TOC_BITS_MIN..=constants::TOC_BITS_MAX).contains(&bits),
            "--toc-bits must be in {}..={}",
            constants::TOC_BITS_MIN,
            constants::TOC_BITS_MAX
        );
    }
    Backends::open(paths, toc_bits).context("failed to open backends")
}

/// Bind and serve until SIGINT.
pub async fn serve(backends: Backends, config: ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let state = ServerState::new(Arc::new(backends), config);
    let router = state.router();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    eprintln!("[Server] listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            eprintln!("[Server] shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
