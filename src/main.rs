use chrono::{Datelike, Local};
use days_of_year::local_store::{FileStorage, LocalStore};
use days_of_year::remote::{HttpRemoteKv, MemoryRemoteKv, RemoteKv};
use days_of_year::{AppState, Config, Tracker, router};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();

    let remote: Arc<dyn RemoteKv> = match &config.remote_url {
        Some(url) => {
            info!("mirroring to remote storage at {url}");
            Arc::new(HttpRemoteKv::new(url.clone(), config.remote_token.clone()))
        }
        None => {
            info!("no remote storage configured; using in-process store");
            Arc::new(MemoryRemoteKv::new())
        }
    };

    let local = LocalStore::new(FileStorage::new(&config.data_path));
    let year = Local::now().year();
    let tracker = Tracker::new(local, remote, config.sync_debounce, year);
    let state = AppState::new(tracker);
    state.tracker.ensure_hydrated(year).await;
    let app = router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("flushing pending remote writes");
    state.tracker.flush_all().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
