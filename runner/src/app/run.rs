//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::deploy::executor::LocalExecutor;
use crate::deploy::ssh::SshConnector;
use crate::errors::RunnerError;
use crate::http::client::HttpClient;
use crate::http::jobs::ControlPlane;
use crate::workers::deployer::{DeployContext, JobController};
use crate::workers::poller;

/// Run the Deployr runner until the shutdown signal resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RunnerError> {
    info!("Initializing Deployr runner...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start runner: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), RunnerError> {
    options.layout.setup().await?;

    let http_client = HttpClient::new(&options.backend_base_url, options.token.clone())?;
    info!("Using control plane at {}", http_client.base_url());
    let control_plane: Arc<dyn ControlPlane> = Arc::new(http_client);

    let ctx = DeployContext {
        control_plane: control_plane.clone(),
        local_executor: Arc::new(LocalExecutor::new(options.command_timeout)),
        connector: Arc::new(SshConnector::new(options.command_timeout)),
        layout: options.layout.clone(),
        composer_bin: options.composer_bin.clone(),
    };

    init_poller_worker(
        options.poller.clone(),
        control_plane,
        JobController::new(ctx),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )
}

fn init_poller_worker(
    options: poller::Options,
    control_plane: Arc<dyn ControlPlane>,
    controller: JobController,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RunnerError> {
    info!("Initializing poller worker...");

    let poller_handle = tokio::spawn(async move {
        poller::run(
            &options,
            control_plane,
            controller,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_poller_worker_handle(poller_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    poller_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            poller_worker_handle: None,
        }
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), RunnerError> {
        if self.poller_worker_handle.is_some() {
            return Err(RunnerError::ShutdownError("poller_handle already set".to_string()));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), RunnerError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.lifecycle_options.max_shutdown_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), RunnerError> {
        info!("Shutting down Deployr runner...");

        // the poller only stops between jobs
        if let Some(handle) = self.poller_worker_handle.take() {
            if !handle.is_finished() {
                info!("Waiting for the current job to finish...");
            }
            handle.await.map_err(|e| RunnerError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
