//! The daemon entry point. Reads its layout from environment variables only —
//! no flag parsing — reconciles any persisted sockets from a prior run,
//! starts the management surface, and blocks until told to shut down.

use docker_proxy::config::{self, ProxyPaths};
use docker_proxy::manager::SocketManager;
use docker_proxy::repository::FileRepository;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  config::init_tracing();

  let paths = ProxyPaths::from_env()?;
  tracing::info!(root = %paths.root.display(), "starting docker-proxyd");

  let repository = Arc::new(FileRepository::new(paths.configs_dir.clone())?);
  let manager = SocketManager::new(repository, paths.sockets_dir.clone());
  manager.reconcile().await?;

  let _ = std::fs::remove_file(&paths.management_socket);
  let management_listener = tokio::net::UnixListener::bind(&paths.management_socket)?;
  std::fs::set_permissions(&paths.management_socket, std::fs::Permissions::from_mode(0o660))?;

  let (shutdown_tx, shutdown_rx) = oneshot::channel();
  let management_task = tokio::spawn(docker_proxy::management::serve(management_listener, manager.clone(), shutdown_rx));

  tokio::signal::ctrl_c().await?;
  tracing::info!("shutdown signal received, draining sockets");
  let _ = shutdown_tx.send(());
  let _ = management_task.await?;

  manager.clean().await.ok();

  Ok(())
}
