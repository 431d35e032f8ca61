//! Construction of a session: the dial builder and the settings it
//! collects. Settings are applied in call order, later calls override
//! earlier ones, and become immutable once the session exists.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use rustls::ClientConfig;
use tokio_util::sync::CancellationToken;

use crate::client::FtpClient;
use crate::error::{FtpError, FtpResult};
use crate::stream::{DialFuture, Dialer, FnDialer, Network, TcpDialer, TlsParams};

const DEFAULT_SHUT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum TlsMode {
    Off,
    /// Wrap the socket before the first byte is read.
    Implicit,
    /// Upgrade after the greeting with AUTH TLS + PBSZ 0 + PROT P.
    Explicit,
}

pub(crate) struct Settings {
    pub(crate) timeout: Option<Duration>,
    pub(crate) shut_timeout: Duration,
    pub(crate) dialer: Arc<dyn Dialer>,
    pub(crate) tls: Option<TlsParams>,
    pub(crate) tls_mode: TlsMode,
    pub(crate) disable_epsv: bool,
    pub(crate) disable_utf8: bool,
    pub(crate) disable_mlsd: bool,
    pub(crate) force_list_hidden: bool,
    pub(crate) writing_mdtm: bool,
    pub(crate) use_pret: bool,
    pub(crate) location: FixedOffset,
    pub(crate) cancel: CancellationToken,
}

/// Builds a session. Obtained from [`FtpClient::builder`]; finished with
/// [`connect`](DialBuilder::connect).
pub struct DialBuilder {
    addr: String,
    network: Network,
    tls_config: Option<(Arc<ClientConfig>, Option<String>)>,
    tls_mode: TlsMode,
    dialer: Option<Arc<dyn Dialer>>,
    timeout: Option<Duration>,
    shut_timeout: Duration,
    disable_epsv: bool,
    disable_utf8: bool,
    disable_mlsd: bool,
    force_list_hidden: bool,
    writing_mdtm: bool,
    use_pret: bool,
    location: FixedOffset,
    cancel: CancellationToken,
}

impl DialBuilder {
    pub(crate) fn new(addr: &str) -> Self {
        DialBuilder {
            addr: addr.to_string(),
            network: Network::Tcp,
            tls_config: None,
            tls_mode: TlsMode::Off,
            dialer: None,
            timeout: None,
            shut_timeout: DEFAULT_SHUT_TIMEOUT,
            disable_epsv: false,
            disable_utf8: false,
            disable_mlsd: false,
            force_list_hidden: false,
            writing_mdtm: false,
            use_pret: false,
            location: FixedOffset::east_opt(0).expect("zero offset is valid"),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the timeout applied to dialing and to every control-channel
    /// exchange.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how long teardown paths wait for the server's final transfer
    /// reply before giving up.
    pub fn shut_timeout(mut self, timeout: Duration) -> Self {
        self.shut_timeout = timeout;
        self
    }

    /// Restricts the default dialer to one address family.
    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Replaces the TCP dialer with a custom [`Dialer`].
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Replaces the TCP dialer with a dial function.
    pub fn dial_func<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u16) -> DialFuture + Send + Sync + 'static,
    {
        self.dialer = Some(Arc::new(FnDialer(f)));
        self
    }

    /// Secures the session with explicit TLS: after the greeting the
    /// control channel is upgraded via `AUTH TLS`, and every data channel
    /// is wrapped with the same configuration. The certificate is checked
    /// against `domain`, or against the dialed host name when `None`.
    pub fn explicit_tls(mut self, config: Arc<ClientConfig>, domain: Option<&str>) -> Self {
        self.tls_config = Some((config, domain.map(str::to_string)));
        self.tls_mode = TlsMode::Explicit;
        self
    }

    /// Secures the session with implicit TLS: the socket is wrapped before
    /// the greeting is read.
    pub fn implicit_tls(mut self, config: Arc<ClientConfig>, domain: Option<&str>) -> Self {
        self.tls_config = Some((config, domain.map(str::to_string)));
        self.tls_mode = TlsMode::Implicit;
        self
    }

    /// Never issue EPSV, even when the server advertises it.
    pub fn disable_epsv(mut self) -> Self {
        self.disable_epsv = true;
        self
    }

    /// Never issue `OPTS UTF8 ON`, even when the server advertises UTF8.
    pub fn disable_utf8(mut self) -> Self {
        self.disable_utf8 = true;
        self
    }

    /// List directories with LIST even when the server supports MLSD.
    pub fn disable_mlsd(mut self) -> Self {
        self.disable_mlsd = true;
        self
    }

    /// Appends `-a` to LIST so servers include hidden entries.
    pub fn force_list_hidden(mut self) -> Self {
        self.force_list_hidden = true;
        self
    }

    /// Uses the two-argument MDTM form to set file times on servers, such
    /// as vsftpd, that support that instead of MFMT.
    pub fn writing_mdtm(mut self) -> Self {
        self.writing_mdtm = true;
        self
    }

    /// Sends PRET ahead of passive negotiation on servers that advertise
    /// it, as distributed servers require.
    pub fn use_pret(mut self) -> Self {
        self.use_pret = true;
        self
    }

    /// Sets the time zone listing dates without zone information are
    /// interpreted in. Defaults to UTC.
    pub fn location(mut self, offset: FixedOffset) -> Self {
        self.location = offset;
        self
    }

    /// Attaches a cancellation token; cancelling it fails the blocked
    /// operation and tears the session down.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Dials, greets and negotiates features, returning the live session.
    pub async fn connect(self) -> FtpResult<FtpClient> {
        let (host, port) = split_host_port(&self.addr)?;

        let tls = match &self.tls_config {
            Some((config, domain)) => Some(TlsParams::new(
                Arc::clone(config),
                domain.as_deref().unwrap_or(&host),
            )?),
            None => None,
        };
        if self.tls_mode != TlsMode::Off && tls.is_none() {
            return Err(FtpError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "TLS mode requires a TLS configuration",
            )));
        }

        let settings = Settings {
            timeout: self.timeout,
            shut_timeout: self.shut_timeout,
            dialer: self
                .dialer
                .unwrap_or_else(|| Arc::new(TcpDialer { network: self.network })),
            tls,
            tls_mode: self.tls_mode,
            disable_epsv: self.disable_epsv,
            disable_utf8: self.disable_utf8,
            disable_mlsd: self.disable_mlsd,
            force_list_hidden: self.force_list_hidden,
            writing_mdtm: self.writing_mdtm,
            use_pret: self.use_pret,
            location: self.location,
            cancel: self.cancel,
        };

        FtpClient::handshake(host, port, settings).await
    }
}

/// Splits `host:port`, handling bracketed IPv6 literals.
pub(crate) fn split_host_port(addr: &str) -> FtpResult<(String, u16)> {
    let bad = |msg: &str| {
        FtpError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{}: {}", msg, addr),
        ))
    };

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| bad("unclosed bracket in address"))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| bad("missing port in address"))?;
        (host.to_string(), port)
    } else {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| bad("missing port in address"))?;
        (host.to_string(), port)
    };

    let port: u16 = port.parse().map_err(|_| bad("invalid port in address"))?;
    Ok((host, port))
}
