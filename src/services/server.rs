use crate::config::ServerConfig;
use crate::error::{ModpilotError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::{Instant, sleep, timeout};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Start/stop control over the game server process.
#[async_trait]
pub trait ServerLifecycle: Send + Sync {
    async fn start(&self) -> bool;
    async fn stop(&self) -> bool;
    async fn is_running(&self) -> bool;
}

/// Post-update health check run by the executor.
#[async_trait]
pub trait StartupProbe: Send + Sync {
    async fn verify(&self) -> Result<()>;
}

/// Server running inside a detached GNU screen session.
pub struct ScreenServer {
    config: ServerConfig,
    server_dir: PathBuf,
}

impl ScreenServer {
    pub fn new(config: ServerConfig, server_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            server_dir: server_dir.into(),
        }
    }

    fn session(&self) -> &str {
        &self.config.session_name
    }

    /// Wait until `is_running` equals `wanted` or `limit` passes.
    async fn wait_for(&self, wanted: bool, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.is_running().await == wanted {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

/// Whether `screen -ls` output lists a session named `session`.
fn session_listed(output: &str, session: &str) -> bool {
    let suffix = format!(".{session}");
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name.ends_with(&suffix))
}

#[async_trait]
impl ServerLifecycle for ScreenServer {
    async fn start(&self) -> bool {
        if self.is_running().await {
            tracing::warn!("server is already running");
            return true;
        }

        let jar = self.server_dir.join(&self.config.jar_name);
        if !jar.is_file() {
            tracing::error!(jar = %jar.display(), "server jar not found");
            return false;
        }

        tracing::info!(session = self.session(), "starting server");
        let status = Command::new("screen")
            .args(["-dmS", self.session(), "java"])
            .args(&self.config.java_flags)
            .arg("-jar")
            .arg(&self.config.jar_name)
            .arg("nogui")
            .current_dir(&self.server_dir)
            .stdin(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                tracing::error!(%status, "screen exited with failure");
                return false;
            }
            Err(e) => {
                tracing::error!("failed to launch screen: {e}");
                return false;
            }
        }

        if self.wait_for(true, self.config.startup_timeout()).await {
            tracing::info!("server started");
            true
        } else {
            tracing::error!("server did not come up within {:?}", self.config.startup_timeout());
            false
        }
    }

    async fn stop(&self) -> bool {
        if !self.is_running().await {
            tracing::warn!("server is not running");
            return true;
        }

        tracing::info!(session = self.session(), "stopping server");
        let command = format!("{}\n", self.config.stop_command);
        let sent = Command::new("screen")
            .args(["-S", self.session(), "-X", "stuff", command.as_str()])
            .stdin(Stdio::null())
            .status()
            .await;
        if let Err(e) = sent {
            tracing::error!("failed to send stop command: {e}");
            return false;
        }

        if self.wait_for(false, self.config.max_stop_wait()).await {
            tracing::info!("server stopped");
            true
        } else {
            tracing::error!("server failed to stop within {:?}", self.config.max_stop_wait());
            false
        }
    }

    async fn is_running(&self) -> bool {
        let output = Command::new("screen")
            .arg("-ls")
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => session_listed(&String::from_utf8_lossy(&output.stdout), self.session()),
            Err(e) => {
                tracing::error!("failed to query screen sessions: {e}");
                false
            }
        }
    }
}

/// Verifies a mod change by booting the server and checking it stays up.
///
/// The server is always stopped again afterwards.
pub struct LifecycleProbe {
    server: Arc<dyn ServerLifecycle>,
    startup_timeout: Duration,
    settle: Duration,
}

impl LifecycleProbe {
    pub fn new(server: Arc<dyn ServerLifecycle>, startup_timeout: Duration, settle: Duration) -> Self {
        Self {
            server,
            startup_timeout,
            settle,
        }
    }

    async fn observe(&self) -> Result<()> {
        match timeout(self.startup_timeout, self.server.start()).await {
            Ok(true) => {}
            Ok(false) => return Err(ModpilotError::Verification("server failed to start".into())),
            Err(_) => {
                return Err(ModpilotError::Verification(format!(
                    "server did not start within {}s",
                    self.startup_timeout.as_secs()
                )));
            }
        }

        sleep(self.settle).await;
        if self.server.is_running().await {
            Ok(())
        } else {
            Err(ModpilotError::Verification(
                "server stopped shortly after start".into(),
            ))
        }
    }
}

#[async_trait]
impl StartupProbe for LifecycleProbe {
    async fn verify(&self) -> Result<()> {
        let result = self.observe().await;
        if !self.server.stop().await {
            tracing::warn!("server did not stop cleanly after verification");
        }
        result
    }
}
