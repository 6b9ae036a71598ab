use std::{error::Error, future::IntoFuture, sync::Arc};

use anyhow::Context as _;
use crate::config::load_config;
use domain::{model::crd_manifest, ReconciliationService};
use infra::{controller::Context, kubernetes::KubeObjectStore, web::router};
use kube::Client;
use log::{info, warn};
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};
use tokio_util::sync::CancellationToken;

mod config;
mod domain;
mod infra;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if std::env::args().nth(1).as_deref() == Some("crd") {
        print!("{}", crd_manifest().context("Can't serialize the Application CRD")?);
        return Ok(());
    }

    info!("Start applicationmgr - Application convergence controller");
    let config = load_config()?;
    info!("Loaded config {:?}", config);
    let client = Client::try_default()
        .await
        .context("Can't connect to kubernetes cluster")?;

    let mut service = ReconciliationService::new(Box::new(KubeObjectStore {
        client: client.clone(),
    }));
    service.failure_policy = config.failure_policy;
    service.resync_interval = config.resync_interval();

    let shutdown = CancellationToken::new();
    let context = Arc::new(Context::new(
        service,
        config.error_backoff(),
        config.conflict_backoff(),
        shutdown.clone(),
    ));
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .context(format!("Can't listen on {}", config.listen_address))?;
    let server = tokio::spawn(
        axum::serve(listener, router(context.clone()))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );

    infra::controller::run(client, context, config.namespace.clone()).await;
    shutdown.cancel();
    server.await??;
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Can't listen for SIGTERM {:?}", e);
                std::future::pending::<()>().await
            }
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
    shutdown.cancel();
}
