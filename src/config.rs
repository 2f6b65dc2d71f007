//! Filesystem layout and ambient process wiring: where sockets, socket
//! files, and persisted configs live on disk, and how the daemon sets up
//! structured logging.

use anyhow::Context;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

const DEFAULT_SOCKET_DIR: &str = "/var/run/docker-proxy";

#[derive(Clone, Debug)]
pub struct ProxyPaths {
  pub root: PathBuf,
  pub sockets_dir: PathBuf,
  pub configs_dir: PathBuf,
  pub management_socket: PathBuf,
}

impl ProxyPaths {
  /// Resolve from `DOCKER_PROXY_SOCKET_DIR`, defaulting to
  /// `/var/run/docker-proxy`.
  pub fn from_env() -> anyhow::Result<Self> {
    let root = std::env::var("DOCKER_PROXY_SOCKET_DIR")
      .map(PathBuf::from)
      .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_DIR));
    Self::ensure(root)
  }

  fn ensure(root: PathBuf) -> anyhow::Result<Self> {
    let sockets_dir = root.join("sockets");
    let configs_dir = root.join("configs");
    let management_socket = root.join("management.sock");

    for dir in [&root, &sockets_dir, &configs_dir] {
      std::fs::create_dir_all(dir).with_context(|| format!("creating dir {}", dir.display()))?;
      std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("setting permissions on {}", dir.display()))?;
    }

    Ok(Self {
      root,
      sockets_dir,
      configs_dir,
      management_socket,
    })
  }
}

/// Set up `tracing` with an `EnvFilter` and a permissive default, logging
/// compact text to stdout: a supervised daemon's process supervisor
/// collects stdout directly, so there's no need to rotate log files to disk.
pub fn init_tracing() {
  let env_filter = tracing_subscriber::EnvFilter::try_from_env("DOCKER_PROXY_LOG")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
}
