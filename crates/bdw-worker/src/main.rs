mod config;
mod convert;
mod engine;
mod service;
mod watchdog;

use std::sync::Arc;

use bdw_core::{lease::wait_for_shutdown, Gateway, GatewayConfig, Token};
use bdw_proto::bdw::v1::build_worker_server::BuildWorkerServer;
use bdw_util::{init_tracing, serve_grpc_until, TOKEN_ENV};
use config::WorkerConfig;
use engine::LocalEngineFactory;
use service::Svc;
use tracing::{error, info, warn};
use watchdog::HostProcessWatchdog;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing()?;
    std::panic::set_hook(Box::new(|panic| {
        error!("bdw-worker panicked: {panic}");
    }));

    let token = std::env::var(TOKEN_ENV).map_err(|_| format!("{TOKEN_ENV} must be set"))?;
    if token.trim().is_empty() {
        return Err(format!("{TOKEN_ENV} must not be empty").into());
    }

    let cfg = WorkerConfig::load();
    let session_defaults = cfg.session_defaults();
    let gateway_config = GatewayConfig::default().with_poll_interval(cfg.poll_interval());
    let factory = Arc::new(LocalEngineFactory::new(cfg.local_repository()));

    let mut gateway = Gateway::new(Token::new(token), factory, gateway_config);
    match cfg.host_pid {
        Some(pid) => {
            info!("watching host process {pid}");
            gateway = gateway.with_watchdog(Arc::new(HostProcessWatchdog::new(pid)));
        }
        None => warn!("no host pid configured; ping will report the host as gone"),
    }
    let gateway = Arc::new(gateway);

    let shutdown = {
        let leases = gateway.shutdown_signal();
        async move {
            tokio::select! {
                _ = wait_for_shutdown(leases) => info!("all leases released"),
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => info!("interrupted"),
                    Err(err) => warn!("failed to listen for ctrl-c: {err}"),
                },
            }
        }
    };

    let svc = Svc::new(Arc::clone(&gateway), session_defaults);
    let router = tonic::transport::Server::builder().add_service(BuildWorkerServer::new(svc));
    serve_grpc_until("bdw-worker", &cfg.addr, router, shutdown).await
}
