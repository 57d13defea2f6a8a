//! Downstream listener and fatal-shutdown policy.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::client::serve_client;
use crate::core::{ProxyError, SessionFault};
use crate::upstream::{SessionState, UpstreamSession};

/// How long to wait for client tasks to finish after shutdown is signalled.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// The proxy front end.
///
/// Accepts downstream connections and serves each from its own task; from a
/// client's perspective the listener is indistinguishable from a direct EPP
/// server connection. All tasks share one [`UpstreamSession`] and one
/// cancellation token; the token fires on the first session-fatal condition
/// and tears the whole proxy down.
pub struct ProxyServer {
    listener: TcpListener,
    session: Arc<UpstreamSession>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl ProxyServer {
    /// Bind the downstream listener.
    pub async fn bind(addr: &str, session: Arc<UpstreamSession>) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening for clients");
        Ok(Self {
            listener,
            session,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Local address of the listener.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the accept loop and every client task when
    /// cancelled. Cancelling it externally performs a clean shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept and serve clients until the upstream session breaks or the
    /// shutdown token fires.
    ///
    /// Returns `Err(ProxyError::SessionFatal)` after a session-fatal
    /// condition: the triggering client has already received its response
    /// (or synthesized error), every other connection is closed, and the
    /// caller is expected to terminate the process and leave the restart to
    /// a supervisor.
    pub async fn run(self) -> Result<(), ProxyError> {
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = self.shutdown.cancelled() => break,
            };

            let (socket, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            debug!(%peer, "client connected");

            let session = self.session.clone();
            let shutdown = self.shutdown.clone();
            self.tasks.spawn(async move {
                match serve_client(socket, session, shutdown).await {
                    Ok(()) => debug!(%peer, "client disconnected"),
                    // Framing errors and socket failures are local to this client.
                    Err(e) => warn!(%peer, error = %e, "client connection closed"),
                }
            });
        }

        // Drain client tasks; anything still open is cut off with the process.
        self.tasks.close();
        if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, self.tasks.wait())
            .await
            .is_err()
        {
            debug!(remaining = self.tasks.len(), "client tasks still open at shutdown");
        }

        if self.session.state().await == SessionState::SessionBroken {
            let fault = self
                .session
                .fault()
                .await
                .unwrap_or(SessionFault::Transport("session broken".to_string()));
            return Err(ProxyError::SessionFatal(fault));
        }

        self.session.close().await;
        info!("proxy shut down cleanly");
        Ok(())
    }
}
