//! Upstream transport: plain TCP or TLS over TCP.
//!
//! TLS support is deliberately thin: the proxy delegates "use TLS" as a
//! boolean and otherwise treats the connection as an opaque byte stream.
//! Certificate roots come from the system store.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::warn;

use crate::core::ProxyError;

/// Install the rustls crypto provider. Safe to call more than once.
pub fn init_crypto_provider() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();
    });
}

/// The connection to the remote EPP server.
#[derive(Debug)]
pub enum UpstreamStream {
    /// Plain TCP.
    Plain(TcpStream),
    /// TLS over TCP.
    Tls(Box<TlsStream<TcpStream>>),
}

impl UpstreamStream {
    /// Connect to `host:port`, upgrading to TLS when requested.
    pub async fn connect(host: &str, port: u16, use_tls: bool) -> Result<Self, ProxyError> {
        let tcp = TcpStream::connect((host, port)).await?;
        if !use_tls {
            return Ok(Self::Plain(tcp));
        }

        init_crypto_provider();
        let connector = tls_connector(native_root_store()?);
        Self::upgrade_to_tls(tcp, host, &connector).await
    }

    /// Upgrade an established TCP connection to TLS, using `host` for SNI
    /// and certificate verification.
    async fn upgrade_to_tls(
        tcp: TcpStream,
        host: &str,
        connector: &TlsConnector,
    ) -> Result<Self, ProxyError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ProxyError::Tls(format!("invalid server name {host}: {e}")))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ProxyError::Tls(format!("handshake with {host} failed: {e}")))?;
        Ok(Self::Tls(Box::new(tls)))
    }
}

/// Load the system's native root certificates.
///
/// Individual unreadable certificates are logged and skipped; an entirely
/// empty store is an error, since every upstream handshake would fail.
fn native_root_store() -> Result<RootCertStore, ProxyError> {
    let native_certs = rustls_native_certs::load_native_certs();
    for error in &native_certs.errors {
        warn!(%error, "error loading a system root certificate");
    }
    if native_certs.certs.is_empty() {
        return Err(ProxyError::Tls(
            "no system root certificates found".to_string(),
        ));
    }

    let mut root_store = RootCertStore::empty();
    for cert in native_certs.certs {
        root_store
            .add(cert)
            .map_err(|e| ProxyError::Tls(format!("failed to add root certificate: {e}")))?;
    }
    Ok(root_store)
}

/// Build a TLS connector trusting the given roots.
fn tls_connector(root_store: RootCertStore) -> TlsConnector {
    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

impl AsyncRead for UpstreamStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for UpstreamStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
