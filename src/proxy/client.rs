//! Per-client serving loop.
//!
//! Each accepted connection runs this loop in its own task:
//! `Connected → AwaitingRequest → Dispatched → AwaitingRequest → … → Closed`.
//! The client owns nothing but its socket; every request goes through the
//! shared [`UpstreamSession`] and the response (or a synthesized error) is
//! relayed back before the next request is read.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{ExchangeError, FrameError, SessionFault};
use crate::envelope::{self, Envelope, synthesize};
use crate::transport::{read_frame, write_frame};
use crate::upstream::UpstreamSession;

/// Serve one downstream client until it disconnects, violates framing, or
/// the proxy shuts down.
///
/// A returned error is connection-local (framing violation, socket failure);
/// session-fatal conditions are signalled through the cancellation token
/// instead, after the synthesized error frame has been flushed to this
/// client.
pub(crate) async fn serve_client(
    mut socket: TcpStream,
    session: Arc<UpstreamSession>,
    shutdown: CancellationToken,
) -> Result<(), FrameError> {
    // A new client hears the cached greeting before anything else, exactly
    // as if it had connected to the real server.
    write_frame(&mut socket, session.greeting()).await?;

    loop {
        let request = tokio::select! {
            request = read_frame(&mut socket) => request?,
            _ = shutdown.cancelled() => {
                debug!("closing client at shutdown");
                return Ok(());
            }
        };
        debug!(len = request.len(), "client request");

        match session.exchange(&request).await {
            Ok(response) if response.is_empty() => {
                // Upstream state is unknown after an empty frame; handled
                // like a session-fatal result code.
                let fault = SessionFault::EmptyResponse;
                session.mark_broken(fault.clone()).await;
                deliver_error(&mut socket, &request, &fault.to_string()).await;
                shutdown.cancel();
                return Ok(());
            }
            Ok(response) => {
                // Relay verbatim, even when the code turns out to be
                // session-fatal: the server's own words reach the client
                // that triggered them.
                write_frame(&mut socket, &response).await?;

                let code = Envelope::parse(&response).result_code();
                if envelope::is_session_fatal(code) {
                    warn!(code, "upstream reported session-fatal result");
                    session.mark_broken(SessionFault::ResultCode(code)).await;
                    shutdown.cancel();
                    return Ok(());
                }
            }
            Err(ExchangeError::Timeout(elapsed)) => {
                let fault = SessionFault::Timeout(elapsed);
                deliver_error(&mut socket, &request, &fault.to_string()).await;
                shutdown.cancel();
                return Ok(());
            }
            Err(ExchangeError::Transport(e)) => {
                let fault = SessionFault::Transport(e.to_string());
                deliver_error(&mut socket, &request, &fault.to_string()).await;
                shutdown.cancel();
                return Ok(());
            }
            Err(ExchangeError::Unavailable(fault)) => {
                // The session broke before this request reached the wire;
                // the synthesized message names the original fault.
                deliver_error(&mut socket, &request, &fault.to_string()).await;
                shutdown.cancel();
                return Ok(());
            }
            Err(ExchangeError::NotReady) => {
                deliver_error(&mut socket, &request, "proxy session is not ready").await;
                return Ok(());
            }
        }
    }
}

/// Synthesize an error frame and flush it to the client. Best effort: a
/// client that vanished mid-failure only costs a debug line.
async fn deliver_error(socket: &mut TcpStream, request: &[u8], error_text: &str) {
    let payload = synthesize(request, error_text);
    if let Err(e) = write_frame(socket, &payload).await {
        debug!(error = %e, "failed to deliver synthesized error");
    }
}
