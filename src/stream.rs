//! Pluggable byte streams: the dialer abstraction the session uses for
//! its control and data connections, and the TLS wrapper applied to both
//! when the session is secured.

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use rustls::{ClientConfig, ServerName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::{FtpError, FtpResult};

/// The shape of stream the session operates on.
pub trait StreamConn: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> StreamConn for T {}

/// A boxed bidirectional byte stream, as produced by a [`Dialer`].
pub type BoxStream = Box<dyn StreamConn>;

/// Which address family the default dialer may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// Either family, first address wins.
    #[default]
    Tcp,
    /// IPv4 only.
    Tcp4,
    /// IPv6 only.
    Tcp6,
}

impl Network {
    fn admits(&self, ip: IpAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => ip.is_ipv4(),
            Network::Tcp6 => ip.is_ipv6(),
        }
    }
}

/// Produces the byte streams a session runs over. Implement this to route
/// connections through a proxy or to hand the session pre-connected
/// streams in tests; the default implementation dials plain TCP.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Opens a stream to `host:port`.
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxStream>;
}

/// The default TCP dialer, optionally pinned to one address family.
pub(crate) struct TcpDialer {
    pub(crate) network: Network,
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxStream> {
        let mut last_err = None;
        for addr in tokio::net::lookup_host((host, port)).await? {
            if !self.network.admits(addr.ip()) {
                continue;
            }
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Box::new(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no suitable address for host")
        }))
    }
}

/// The future returned by a dial function.
pub type DialFuture = Pin<Box<dyn Future<Output = io::Result<BoxStream>> + Send>>;

/// Adapts a closure into a [`Dialer`].
pub(crate) struct FnDialer<F>(pub(crate) F);

#[async_trait]
impl<F> Dialer for FnDialer<F>
where
    F: Fn(&str, u16) -> DialFuture + Send + Sync,
{
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxStream> {
        (self.0)(host, port).await
    }
}

/// The TLS half of a secured session: the connector shared by the control
/// channel and every data channel, so data connections resume the control
/// connection's TLS session where the server supports it.
#[derive(Clone)]
pub(crate) struct TlsParams {
    connector: TlsConnector,
    server_name: ServerName,
}

impl TlsParams {
    pub(crate) fn new(config: Arc<ClientConfig>, domain: &str) -> FtpResult<Self> {
        let server_name = ServerName::try_from(domain).map_err(|_| FtpError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid TLS server name: {}", domain),
        )))?;
        Ok(TlsParams {
            connector: TlsConnector::from(config),
            server_name,
        })
    }

    /// Wraps a freshly dialed stream in TLS.
    pub(crate) async fn wrap(&self, stream: BoxStream) -> io::Result<BoxStream> {
        let tls = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await?;
        Ok(Box::new(tls))
    }
}
