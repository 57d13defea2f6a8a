//! Upstream session management.
//!
//! One [`UpstreamSession`] owns the single connection to the remote EPP
//! server for the lifetime of the process. Establishment happens once at
//! startup (connect, capture greeting, login); afterwards the session does
//! exactly one thing: serialized request/response exchanges under a deadline.
//!
//! The session never recovers from a fault. A timeout or transport error
//! leaves the connection desynchronized. A stray late response would be
//! attributed to the wrong request, so the only safe transition is
//! [`SessionState::SessionBroken`], terminal until the supervisor restarts
//! the process.

use std::io;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::login::build_login;
use crate::core::constants::RESULT_SUCCESS;
use crate::core::{ExchangeError, FrameError, ProxyConfig, ProxyError, SessionFault};
use crate::envelope::{self, Envelope, transaction_id};
use crate::transport::{UpstreamStream, read_frame, write_frame};

/// Upstream session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport yet.
    Disconnected,
    /// TCP (and optionally TLS) connect in progress.
    Connecting,
    /// Greeting captured, login not yet acknowledged.
    Authenticating,
    /// Login succeeded; exchanges may proceed.
    Ready,
    /// A fatal fault occurred; terminal until process restart.
    SessionBroken,
    /// Shut down deliberately.
    Closed,
}

/// Connection state guarded by the exchange lock.
struct Inner {
    stream: UpstreamStream,
    state: SessionState,
    fault: Option<SessionFault>,
}

/// The single, pre-authenticated connection to the remote EPP server.
///
/// The greeting is immutable after capture and may be read by any number of
/// concurrent tasks. The connection itself lives behind a fair async mutex:
/// concurrent [`exchange`](Self::exchange) callers queue and are serviced
/// strictly in arrival order, so at most one request is ever in flight and
/// frames are never interleaved.
pub struct UpstreamSession {
    config: ProxyConfig,
    greeting: Vec<u8>,
    inner: Mutex<Inner>,
}

impl UpstreamSession {
    /// Open the transport and capture the server's greeting.
    ///
    /// The server speaks first: one greeting frame is read before anything
    /// is sent. Each step is bounded by the configured timeout. Failure here
    /// is a startup error, and the proxy must not begin accepting clients.
    pub async fn connect(config: ProxyConfig) -> Result<Self, ProxyError> {
        info!(
            host = %config.remote_host,
            port = config.remote_port,
            tls = config.use_tls,
            "connecting to upstream"
        );

        let mut stream = timeout(
            config.timeout,
            UpstreamStream::connect(&config.remote_host, config.remote_port, config.use_tls),
        )
        .await
        .map_err(|_| timed_out("upstream connect"))??;

        let greeting = timeout(config.timeout, read_frame(&mut stream))
            .await
            .map_err(|_| timed_out("upstream greeting"))?
            .map_err(ProxyError::Frame)?;
        debug!(bytes = greeting.len(), "captured upstream greeting");

        Ok(Self {
            config,
            greeting,
            inner: Mutex::new(Inner {
                stream,
                state: SessionState::Authenticating,
                fault: None,
            }),
        })
    }

    /// Send the login command and return the parsed `(code, message)`.
    ///
    /// Service URIs come from the configuration, or, when none are
    /// configured, from the greeting's service menu. A `1000` result moves
    /// the session to [`SessionState::Ready`]; any other code leaves it
    /// unauthenticated, and callers must treat that as fatal before serving.
    pub async fn login(&self) -> Result<(u16, String), ProxyError> {
        let uris = if self.config.service_uris.is_empty() {
            envelope::service_uris(&self.greeting)
        } else {
            self.config.service_uris.clone()
        };
        let cl_trid = transaction_id(&format!("eppmux-login-{}", self.config.client_id));
        let request = build_login(&self.config.client_id, &self.config.password, &uris, &cl_trid);

        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Authenticating {
            return Err(ProxyError::Config(format!(
                "login attempted in state {:?}",
                inner.state
            )));
        }

        let response = timeout(self.config.timeout, async {
            write_frame(&mut inner.stream, &request).await?;
            read_frame(&mut inner.stream).await
        })
        .await
        .map_err(|_| timed_out("upstream login"))?
        .map_err(ProxyError::Frame)?;

        let parsed = Envelope::parse(&response);
        let code = parsed.result_code();
        let message = parsed.result_message().to_string();
        if code == RESULT_SUCCESS {
            inner.state = SessionState::Ready;
            info!(declared_uris = uris.len(), "upstream login accepted");
        } else {
            warn!(code, %message, "upstream login rejected");
        }
        Ok((code, message))
    }

    /// Connect and authenticate in one step.
    ///
    /// Any login result other than `1000` is a startup failure.
    pub async fn establish(config: ProxyConfig) -> Result<Self, ProxyError> {
        let session = Self::connect(config).await?;
        let (code, message) = session.login().await?;
        if code != RESULT_SUCCESS {
            return Err(ProxyError::LoginRejected { code, message });
        }
        Ok(session)
    }

    /// Execute one request/response exchange.
    ///
    /// This is the single point of upstream traffic. The lock is fair, so
    /// queued callers are serviced in FIFO arrival order with the whole
    /// write-then-read cycle as one critical section. The configured timeout
    /// bounds the cycle; expiry or a transport failure marks the session
    /// broken before the error is returned. A call that finds the session
    /// already broken fails without touching the wire.
    pub async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Ready => {}
            SessionState::SessionBroken => {
                let fault = inner
                    .fault
                    .clone()
                    .unwrap_or(SessionFault::Transport("session broken".to_string()));
                return Err(ExchangeError::Unavailable(fault));
            }
            _ => return Err(ExchangeError::NotReady),
        }

        debug!(len = request.len(), "forwarding request upstream");
        let deadline = self.config.timeout;
        let result = timeout(deadline, async {
            write_frame(&mut inner.stream, request).await?;
            read_frame(&mut inner.stream).await
        })
        .await;

        match result {
            Ok(Ok(response)) => {
                debug!(len = response.len(), "upstream response received");
                Ok(response)
            }
            Ok(Err(FrameError::Io(e))) => {
                inner.state = SessionState::SessionBroken;
                inner.fault = Some(SessionFault::Transport(e.to_string()));
                warn!(error = %e, "upstream transport failed mid-exchange");
                Err(ExchangeError::Transport(e))
            }
            Ok(Err(FrameError::BadLength { declared })) => {
                // The stream position is unknowable after a framing
                // violation; the session cannot be trusted.
                let text = format!("bad upstream frame length {declared}");
                inner.state = SessionState::SessionBroken;
                inner.fault = Some(SessionFault::Transport(text.clone()));
                warn!(declared, "upstream framing violation");
                Err(ExchangeError::Transport(io::Error::new(
                    io::ErrorKind::InvalidData,
                    text,
                )))
            }
            Err(_elapsed) => {
                inner.state = SessionState::SessionBroken;
                inner.fault = Some(SessionFault::Timeout(deadline));
                warn!(timeout = ?deadline, "upstream exchange timed out");
                Err(ExchangeError::Timeout(deadline))
            }
        }
    }

    /// Record a fault observed outside the exchange path (session-fatal
    /// result code, empty response).
    pub async fn mark_broken(&self, fault: SessionFault) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::SessionBroken {
            warn!(%fault, "marking upstream session broken");
            inner.state = SessionState::SessionBroken;
            inner.fault = Some(fault);
        }
    }

    /// Mark the session closed on a deliberate shutdown path.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::SessionBroken {
            inner.state = SessionState::Closed;
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// The fault that broke the session, if any.
    pub async fn fault(&self) -> Option<SessionFault> {
        self.inner.lock().await.fault.clone()
    }

    /// The greeting captured at connect time, replayed to every new client.
    pub fn greeting(&self) -> &[u8] {
        &self.greeting
    }

    /// The configured exchange deadline.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

fn timed_out(what: &str) -> ProxyError {
    ProxyError::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{what} timed out"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProxyConfigBuilder;
    use crate::transport::encode;
    use std::net::SocketAddr;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    const GREETING: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<epp xmlns="urn:ietf:params:xml:ns:epp-1.0"><greeting>
  <svID>Test EPP server</svID>
  <svcMenu>
    <version>1.0</version><lang>en</lang>
    <objURI>urn:ietf:params:xml:ns:domain-1.0</objURI>
    <objURI>urn:ietf:params:xml:ns:contact-1.0</objURI>
  </svcMenu>
</greeting></epp>"#;

    fn response_with_code(code: u16) -> Vec<u8> {
        format!(
            r#"<epp xmlns="urn:ietf:params:xml:ns:epp-1.0"><response><result code="{code}"><msg>test</msg></result><trID><svTRID>sv-1</svTRID></trID></response></epp>"#
        )
        .into_bytes()
    }

    fn test_config(addr: SocketAddr) -> ProxyConfig {
        ProxyConfigBuilder::new()
            .remote_host("127.0.0.1")
            .remote_port(addr.port())
            .credentials("registrar-1", "hunter2")
            .timeout(Duration::from_millis(500))
            .build()
    }

    /// Upstream that sends the greeting, accepts a login, then echoes each
    /// request payload back inside a 1000 response.
    async fn spawn_echo_upstream(login_code: u16) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&encode(GREETING)).await.unwrap();

            let login = read_frame(&mut socket).await.unwrap();
            assert!(String::from_utf8_lossy(&login).contains("<login>"));
            socket
                .write_all(&encode(&response_with_code(login_code)))
                .await
                .unwrap();

            while let Ok(request) = read_frame(&mut socket).await {
                let cl_trid = Envelope::parse(&request)
                    .client_transaction_id()
                    .unwrap_or_default()
                    .to_string();
                let response = format!(
                    r#"<epp xmlns="urn:ietf:params:xml:ns:epp-1.0"><response><result code="1000"><msg>ok</msg></result><trID><clTRID>{cl_trid}</clTRID><svTRID>sv-2</svTRID></trID></response></epp>"#
                );
                socket.write_all(&encode(response.as_bytes())).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_connect_captures_greeting_verbatim() {
        let addr = spawn_echo_upstream(1000).await;
        let session = UpstreamSession::connect(test_config(addr)).await.unwrap();
        assert_eq!(session.greeting(), GREETING);
        assert_eq!(session.state().await, SessionState::Authenticating);
    }

    #[tokio::test]
    async fn test_login_success_enables_exchanges() {
        let addr = spawn_echo_upstream(1000).await;
        let session = UpstreamSession::connect(test_config(addr)).await.unwrap();

        let (code, message) = session.login().await.unwrap();
        assert_eq!(code, 1000);
        assert_eq!(message, "test");
        assert_eq!(session.state().await, SessionState::Ready);

        let request = br#"<epp><command><poll op="req"/><clTRID>t-1</clTRID></command></epp>"#;
        let response = session.exchange(request).await.unwrap();
        assert_eq!(Envelope::parse(&response).client_transaction_id(), Some("t-1"));
    }

    #[tokio::test]
    async fn test_login_rejection_blocks_serving() {
        let addr = spawn_echo_upstream(2200).await;
        match UpstreamSession::establish(test_config(addr)).await {
            Err(ProxyError::LoginRejected { code, .. }) => assert_eq!(code, 2200),
            other => panic!("expected LoginRejected, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_exchange_refused_before_login() {
        let addr = spawn_echo_upstream(1000).await;
        let session = UpstreamSession::connect(test_config(addr)).await.unwrap();
        assert!(matches!(
            session.exchange(b"<epp/>").await,
            Err(ExchangeError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_timeout_breaks_session() {
        // Upstream that greets, accepts login, then never answers again.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&encode(GREETING)).await.unwrap();
            let _login = read_frame(&mut socket).await.unwrap();
            socket
                .write_all(&encode(&response_with_code(1000)))
                .await
                .unwrap();
            // Swallow the next request and stall.
            let _request = read_frame(&mut socket).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = ProxyConfigBuilder::new()
            .remote_host("127.0.0.1")
            .remote_port(addr.port())
            .credentials("registrar-1", "hunter2")
            .timeout(Duration::from_millis(100))
            .build();
        let session = UpstreamSession::establish(config).await.unwrap();

        match session.exchange(b"<epp/>").await {
            Err(ExchangeError::Timeout(d)) => assert_eq!(d, Duration::from_millis(100)),
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }
        assert_eq!(session.state().await, SessionState::SessionBroken);
        assert_eq!(
            session.fault().await,
            Some(SessionFault::Timeout(Duration::from_millis(100)))
        );

        // Subsequent exchanges fail without touching the wire.
        assert!(matches!(
            session.exchange(b"<epp/>").await,
            Err(ExchangeError::Unavailable(SessionFault::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_upstream_disconnect_breaks_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&encode(GREETING)).await.unwrap();
            let _login = read_frame(&mut socket).await.unwrap();
            socket
                .write_all(&encode(&response_with_code(1000)))
                .await
                .unwrap();
            // Drop the connection on the next request.
            let _request = read_frame(&mut socket).await.unwrap();
        });

        let session = UpstreamSession::establish(test_config(addr)).await.unwrap();
        assert!(matches!(
            session.exchange(b"<epp/>").await,
            Err(ExchangeError::Transport(_))
        ));
        assert_eq!(session.state().await, SessionState::SessionBroken);
    }

    #[tokio::test]
    async fn test_concurrent_exchanges_never_interleave() {
        // The mock reads each request as one frame; interleaved writes from
        // the proxy side would corrupt the framing and fail the test.
        let addr = spawn_echo_upstream(1000).await;
        let session =
            std::sync::Arc::new(UpstreamSession::establish(test_config(addr)).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                let request = format!(
                    r#"<epp><command><poll op="req"/><clTRID>req-{i}</clTRID></command></epp>"#
                );
                let response = session.exchange(request.as_bytes()).await.unwrap();
                let envelope = Envelope::parse(&response);
                assert_eq!(envelope.client_transaction_id(), Some(format!("req-{i}").as_str()));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_startup_error() {
        let config = ProxyConfigBuilder::new()
            .remote_host("127.0.0.1")
            .remote_port(1)
            .timeout(Duration::from_millis(500))
            .build();
        assert!(UpstreamSession::connect(config).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_broken_is_sticky() {
        let addr = spawn_echo_upstream(1000).await;
        let session = UpstreamSession::establish(test_config(addr)).await.unwrap();

        session.mark_broken(SessionFault::ResultCode(2501)).await;
        assert_eq!(session.state().await, SessionState::SessionBroken);

        // A later fault must not overwrite the original cause.
        session.mark_broken(SessionFault::EmptyResponse).await;
        assert_eq!(session.fault().await, Some(SessionFault::ResultCode(2501)));
    }

    #[tokio::test]
    async fn test_greeting_sent_before_client_speaks() {
        let addr = spawn_echo_upstream(1000).await;
        let mut raw = TcpStream::connect(addr).await.unwrap();
        let greeting = read_frame(&mut raw).await.unwrap();
        assert_eq!(greeting, GREETING);
    }
}
