// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::future::{Future, IntoFuture};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::config::Config;
use crate::proxy::{self, ProxyService};

/// Bind the configured address and serve the proxy until a shutdown signal
pub async fn serve(config: &Config) -> io::Result<()> {
    let service = ProxyService::from_config(config);
    let app = match config
        .app_dir()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
    {
        Some(dir) => {
            tracing::info!(app = %dir.display(), "serving web app");
            proxy::router_with_app(service, dir)
        }
        None => proxy::router(service),
    };

    let listener = TcpListener::bind(config.addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        encoder = %config.ffmpeg_path.display(),
        "poddle server listening"
    );

    run(listener, app, config.wait_timeout, shutdown_signal()).await?;
    tracing::info!("Goodbye...");
    Ok(())
}

/// Serve `app` on `listener` until `shutdown` resolves
///
/// Once `shutdown` resolves no new connections are accepted and in-flight
/// requests get `drain` to finish. Whatever is still running after that is
/// abandoned and torn down with the runtime.
pub async fn run<F>(listener: TcpListener, app: Router, drain: Duration, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let signalled = Arc::new(Notify::new());
    let notify = signalled.clone();
    let graceful = async move {
        shutdown.await;
        tracing::info!(drain = ?drain, "shutting down, draining in-flight requests");
        notify.notify_one();
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = signalled.notified() => {}
    }

    match tokio::time::timeout(drain, server).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(drain = ?drain, "drain timed out, closing remaining connections");
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
