//! The session: a thread-safe FTP client handle multiplexing a textual
//! control channel with short-lived data channels.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::controlchan::{Command, ControlChan, Reply};
use crate::datachan;
use crate::error::{FtpError, FtpResult};
use crate::glob;
use crate::listing::{parse_fact_line, Entry, EntryKind, ListParser};
use crate::status;
use crate::stream::BoxStream;
use crate::walker::Walker;

mod builder;
mod reader;

pub use builder::DialBuilder;
pub use reader::FileReader;

use builder::{Settings, TlsMode};

const MDTM_FORMAT: &str = "%Y%m%d%H%M%S";

/// The final replies that end a data transfer.
const TRANSFER_END_CODES: [u16; 2] = [
    status::CLOSING_DATA_CONNECTION,
    status::REQUESTED_FILE_ACTION_OK,
];

/// The opening replies that mean the data connection is good to use.
const TRANSFER_OPEN_CODES: [u16; 2] = [status::ALREADY_OPEN, status::ABOUT_TO_SEND];

/// A connection to an FTP server.
///
/// The handle is cheap to clone and safe to share between tasks: a
/// session-wide async mutex serializes every operation that touches the
/// control channel, so commands observe strict FIFO order on the wire and
/// only one operation makes progress at a time.
///
/// ```no_run
/// # async fn run() -> libftpc::FtpResult<()> {
/// let client = libftpc::FtpClient::dial("ftp.example.com:21").await?;
/// client.login("anonymous", "anonymous").await?;
/// for entry in client.list(".").await? {
///     println!("{}", entry.name);
/// }
/// client.quit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FtpClient {
    inner: Arc<Mutex<ClientInner>>,
    cancel: tokio_util::sync::CancellationToken,
}

pub(crate) struct ClientInner {
    chan: Option<ControlChan>,
    host: String,
    host_ip: Option<IpAddr>,
    settings: Settings,
    features: HashMap<String, String>,
    epsv_supported: bool,
    mlst_supported: bool,
    mdtm_supported: bool,
    mfmt_supported: bool,
    use_pret: bool,
    utf8_enabled: bool,
    closed: bool,
    transfer: Option<PendingTransfer>,
    transfer_seq: u64,
}

struct PendingTransfer {
    id: u64,
    abandoned: Arc<AtomicBool>,
}

fn is_fatal(err: &FtpError) -> bool {
    match err {
        FtpError::Io(_) | FtpError::Frame(_) | FtpError::Cancelled | FtpError::TimedOut => true,
        FtpError::Multiple(errs) => errs.iter().any(is_fatal),
        _ => false,
    }
}

impl FtpClient {
    /// Starts a [`DialBuilder`] for `addr` (`host:port`).
    pub fn builder(addr: &str) -> DialBuilder {
        DialBuilder::new(addr)
    }

    /// Dials `addr` with default settings.
    pub async fn dial(addr: &str) -> FtpResult<FtpClient> {
        Self::builder(addr).connect().await
    }

    /// Dials `addr`, bounding the dial and every subsequent exchange by
    /// `timeout`.
    pub async fn dial_timeout(addr: &str, timeout: Duration) -> FtpResult<FtpClient> {
        Self::builder(addr).timeout(timeout).connect().await
    }

    /// Dials an implicit-TLS server: the connection is wrapped before the
    /// greeting is read.
    pub async fn dial_implicit_tls(
        addr: &str,
        config: Arc<rustls::ClientConfig>,
    ) -> FtpResult<FtpClient> {
        Self::builder(addr).implicit_tls(config, None).connect().await
    }

    /// Alias of [`dial`](FtpClient::dial) kept for callers of old versions
    /// of this library.
    pub async fn connect(addr: &str) -> FtpResult<FtpClient> {
        Self::dial(addr).await
    }

    pub(crate) async fn handshake(
        host: String,
        port: u16,
        settings: Settings,
    ) -> FtpResult<FtpClient> {
        let stream = dial_stream(&settings, &host, port).await?;
        let stream = match settings.tls_mode {
            TlsMode::Implicit => wrap_tls(&settings, stream).await?,
            _ => stream,
        };

        let mut chan = ControlChan::new(stream, settings.timeout, settings.cancel.clone());
        chan.expect(status::READY).await?;

        if settings.tls_mode == TlsMode::Explicit {
            chan.exec(Command::AuthTls, status::AUTH_OK).await?;
            let stream = wrap_tls(&settings, chan.into_stream()).await?;
            chan = ControlChan::new(stream, settings.timeout, settings.cancel.clone());
            chan.exec(Command::Pbsz0, status::COMMAND_OK).await?;
            chan.exec(Command::ProtPrivate, status::COMMAND_OK).await?;
        }

        let features = chan.features().await?;
        let mut utf8_enabled = false;
        if features.contains_key("UTF8") && !settings.disable_utf8 {
            // Some servers advertise UTF8 and still reject the OPTS; treat
            // those as non-UTF-8 sessions rather than failing the dial.
            let reply = chan.exec_any(Command::OptsUtf8On).await?;
            match reply.code {
                status::COMMAND_OK | status::COMMAND_NOT_IMPLEMENTED => utf8_enabled = true,
                code => warn!("server advertised UTF8 but rejected OPTS UTF8 ON: {} {}", code, reply.text),
            }
        }

        let cancel = settings.cancel.clone();
        let inner = ClientInner {
            chan: Some(chan),
            host_ip: host.parse().ok(),
            host,
            epsv_supported: features.contains_key("EPSV") || features.contains_key("NAT6"),
            mlst_supported: features.contains_key("MLST"),
            mdtm_supported: features.contains_key("MDTM"),
            mfmt_supported: features.contains_key("MFMT"),
            use_pret: settings.use_pret && features.contains_key("PRET"),
            utf8_enabled,
            settings,
            features,
            closed: false,
            transfer: None,
            transfer_seq: 0,
        };
        Ok(FtpClient {
            inner: Arc::new(Mutex::new(inner)),
            cancel,
        })
    }

    /// Authenticates with the given credentials and pins the transfer type
    /// to binary.
    pub async fn login(&self, user: &str, password: &str) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.login(user, password).await.map_err(|e| inner.seal(e))
    }

    /// Issues NOOP; cheap way to keep an idle connection alive.
    pub async fn noop(&self) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.simple(Command::Noop, status::COMMAND_OK).await.map_err(|e| inner.seal(e))
    }

    /// Changes the working directory.
    pub async fn change_dir(&self, path: &str) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner
            .simple(Command::Cwd(path.to_string()), status::REQUESTED_FILE_ACTION_OK)
            .await
            .map_err(|e| inner.seal(e))
    }

    /// Changes the working directory to its parent.
    pub async fn change_dir_to_parent(&self) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner
            .simple(Command::Cdup, status::REQUESTED_FILE_ACTION_OK)
            .await
            .map_err(|e| inner.seal(e))
    }

    /// Returns the current working directory.
    pub async fn current_dir(&self) -> FtpResult<String> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.current_dir().await.map_err(|e| inner.seal(e))
    }

    /// Lists `path`, using MLSD when the server supports it and LIST
    /// otherwise. Lines no dialect parser understands are skipped, not
    /// fatal.
    pub async fn list(&self, path: &str) -> FtpResult<Vec<Entry>> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.list(path).await.map_err(|e| inner.seal(e))
    }

    /// Returns the bare names in `path` via NLST.
    pub async fn name_list(&self, path: &str) -> FtpResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner
            .read_data_lines(Command::Nlst(path.to_string()))
            .await
            .map_err(|e| inner.seal(e))
    }

    /// Fetches a single entry via MLST.
    pub async fn get_entry(&self, path: &str) -> FtpResult<Entry> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.get_entry(path).await.map_err(|e| inner.seal(e))
    }

    /// Returns the size of a remote file via SIZE.
    pub async fn file_size(&self, path: &str) -> FtpResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.file_size(path).await.map_err(|e| inner.seal(e))
    }

    /// Returns the modification time of a remote file via MDTM.
    pub async fn get_time(&self, path: &str) -> FtpResult<DateTime<Utc>> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.get_time(path).await.map_err(|e| inner.seal(e))
    }

    /// Sets the modification time of a remote file, via MFMT or, on
    /// servers like vsftpd when so configured, the two-argument MDTM.
    pub async fn set_time(&self, path: &str, mtime: DateTime<Utc>) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.set_time(path, mtime).await.map_err(|e| inner.seal(e))
    }

    /// Tells whether the server advertises MDTM.
    pub async fn is_get_time_supported(&self) -> bool {
        self.inner.lock().await.mdtm_supported
    }

    /// Tells whether [`set_time`](FtpClient::set_time) can succeed with the
    /// session's settings and the server's advertised features.
    pub async fn is_set_time_supported(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.mfmt_supported || (inner.settings.writing_mdtm && inner.mdtm_supported)
    }

    /// Tells whether `OPTS UTF8 ON` was accepted at dial time.
    pub async fn is_utf8_enabled(&self) -> bool {
        self.inner.lock().await.utf8_enabled
    }

    /// Returns the parameter string the server advertised for `name` in
    /// its FEAT listing, or `None` when the feature is absent. Feature
    /// names are case-insensitive; parameter-less features yield an empty
    /// string.
    pub async fn feature(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .features
            .get(&name.to_ascii_uppercase())
            .cloned()
    }

    /// Uploads `reader` to `path` via STOR.
    pub async fn stor<R>(&self, path: &str, reader: &mut R) -> FtpResult<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.stor_from(path, reader, 0).await
    }

    /// Uploads `reader` to `path`, asking the server to start writing at
    /// `offset` via REST.
    pub async fn stor_from<R>(&self, path: &str, reader: &mut R, offset: u64) -> FtpResult<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner
            .store(Command::Stor(path.to_string()), reader, offset)
            .await
            .map_err(|e| inner.seal(e))
    }

    /// Appends `reader` to `path` via APPE.
    pub async fn append<R>(&self, path: &str, reader: &mut R) -> FtpResult<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner
            .store(Command::Appe(path.to_string()), reader, 0)
            .await
            .map_err(|e| inner.seal(e))
    }

    /// Downloads `path`. The returned [`FileReader`] must be closed to
    /// finish the transfer; closing it reads the server's final reply.
    pub async fn retr(&self, path: &str) -> FtpResult<FileReader> {
        self.retr_from(path, 0).await
    }

    /// Downloads `path` starting at byte `offset`.
    pub async fn retr_from(&self, path: &str, offset: u64) -> FtpResult<FileReader> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        let data = inner
            .open_transfer(Command::Retr(path.to_string()), offset)
            .await
            .map_err(|e| inner.seal(e))?;
        let (id, abandoned) = inner.begin_transfer();
        Ok(FileReader::new(Arc::clone(&self.inner), id, data, abandoned))
    }

    /// Renames a remote file.
    pub async fn rename(&self, from: &str, to: &str) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.rename(from, to).await.map_err(|e| inner.seal(e))
    }

    /// Deletes a remote file.
    pub async fn delete(&self, path: &str) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner
            .simple(Command::Dele(path.to_string()), status::REQUESTED_FILE_ACTION_OK)
            .await
            .map_err(|e| inner.seal(e))
    }

    /// Creates a remote directory.
    pub async fn make_dir(&self, path: &str) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner
            .simple(Command::Mkd(path.to_string()), status::PATH_CREATED)
            .await
            .map_err(|e| inner.seal(e))
    }

    /// Removes an empty remote directory.
    pub async fn remove_dir(&self, path: &str) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner
            .simple(Command::Rmd(path.to_string()), status::REQUESTED_FILE_ACTION_OK)
            .await
            .map_err(|e| inner.seal(e))
    }

    /// Deletes a remote directory tree. The working directory is restored
    /// on every exit path, including errors.
    pub async fn remove_dir_recur(&self, path: &str) -> FtpResult<()> {
        let saved = self.current_dir().await?;
        let removed = self.remove_tree(path).await;
        let restored = self.change_dir(&saved).await;
        match FtpError::merge(removed.err(), restored.err()) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn remove_tree<'a>(&'a self, path: &'a str) -> BoxFuture<'a, FtpResult<()>> {
        async move {
            self.change_dir(path).await?;
            let cur = self.current_dir().await?;
            for entry in self.list(&cur).await? {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }
                match entry.kind {
                    EntryKind::Folder => {
                        let child = format!("{}/{}", cur.trim_end_matches('/'), entry.name);
                        self.remove_tree(&child).await?;
                    }
                    _ => self.delete(&entry.name).await?,
                }
            }
            self.change_dir_to_parent().await?;
            self.remove_dir(&cur).await
        }
        .boxed()
    }

    /// Returns a depth-first [`Walker`] over the tree rooted at `root`.
    pub fn walk<'a>(&'a self, root: &str) -> Walker<'a> {
        Walker::new(self, root)
    }

    /// Expands a shell pattern against the remote tree under the working
    /// directory. `**` spans path segments. No match is an empty result;
    /// a malformed pattern is [`FtpError::BadPattern`].
    pub async fn glob(&self, pattern: &str) -> FtpResult<Vec<String>> {
        glob::validate(pattern)?;
        let mut matched = Vec::new();
        let mut walker = self.walk(".");
        while walker.next().await {
            if walker.err().is_some() {
                continue;
            }
            let rel = walker
                .path()
                .trim_start_matches("./")
                .trim_end_matches('/');
            if rel.is_empty() {
                continue;
            }
            if glob::path_matches(pattern, rel)? {
                matched.push(rel.to_string());
            }
        }
        Ok(matched)
    }

    /// Logs the user out via REIN. Servers that never implemented REIN
    /// answer 502; that is reported as a warning, not an error.
    pub async fn logout(&self) -> FtpResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ready().await.map_err(|e| inner.seal(e))?;
        inner.logout().await.map_err(|e| inner.seal(e))
    }

    /// Sends QUIT best-effort and closes the control connection. Cancels
    /// any in-flight operation first. Calling it twice is harmless.
    pub async fn quit(&self) -> FtpResult<()> {
        self.cancel.cancel();
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        inner.transfer = None;
        if let Some(mut chan) = inner.chan.take() {
            let shut = inner.settings.shut_timeout;
            let _ = tokio::time::timeout(shut, chan.send_raw(Command::Quit)).await;
        }
        Ok(())
    }
}

async fn dial_stream(settings: &Settings, host: &str, port: u16) -> FtpResult<BoxStream> {
    let cancel = settings.cancel.clone();
    let dial = settings.dialer.dial(host, port);
    let dial = async {
        match settings.timeout {
            Some(d) => match tokio::time::timeout(d, dial).await {
                Ok(r) => r.map_err(FtpError::from),
                Err(_) => Err(FtpError::TimedOut),
            },
            None => dial.await.map_err(FtpError::from),
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FtpError::Cancelled),
        r = dial => r,
    }
}

async fn wrap_tls(settings: &Settings, stream: BoxStream) -> FtpResult<BoxStream> {
    let tls = settings.tls.as_ref().expect("TLS parameters are configured");
    let wrap = tls.wrap(stream);
    match settings.timeout {
        Some(d) => match tokio::time::timeout(d, wrap).await {
            Ok(r) => r.map_err(FtpError::from),
            Err(_) => Err(FtpError::TimedOut),
        },
        None => wrap.await.map_err(FtpError::from),
    }
}

impl ClientInner {
    fn chan_mut(&mut self) -> FtpResult<&mut ControlChan> {
        self.chan.as_mut().ok_or(FtpError::Closed)
    }

    /// Marks the session unusable after a fatal error. Status errors pass
    /// through untouched; the control channel survives them.
    fn seal(&mut self, err: FtpError) -> FtpError {
        if is_fatal(&err) {
            self.closed = true;
            self.chan = None;
            self.transfer = None;
        }
        err
    }

    /// Gate run before every operation: fails closed sessions, rejects
    /// work while a retrieval handle is open, and drains the final reply
    /// of a handle that was dropped without being closed.
    async fn ready(&mut self) -> FtpResult<()> {
        if self.closed {
            return Err(FtpError::Closed);
        }
        if let Some(transfer) = &self.transfer {
            if !transfer.abandoned.load(Ordering::Acquire) {
                return Err(FtpError::TransferInProgress);
            }
            debug!("draining final reply of an abandoned transfer");
            self.transfer = None;
            self.drain_final_reply().await?;
        }
        Ok(())
    }

    fn begin_transfer(&mut self) -> (u64, Arc<AtomicBool>) {
        self.transfer_seq += 1;
        let abandoned = Arc::new(AtomicBool::new(false));
        self.transfer = Some(PendingTransfer {
            id: self.transfer_seq,
            abandoned: Arc::clone(&abandoned),
        });
        (self.transfer_seq, abandoned)
    }

    pub(crate) fn transfer_matches(&self, id: u64) -> bool {
        matches!(&self.transfer, Some(t) if t.id == id)
    }

    pub(crate) fn clear_transfer(&mut self) {
        self.transfer = None;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn seal_fatal(&mut self, err: FtpError) -> FtpError {
        self.seal(err)
    }

    async fn login(&mut self, user: &str, password: &str) -> FtpResult<()> {
        let chan = self.chan_mut()?;
        let reply = chan.exec_any(Command::User(user.to_string())).await?;
        match reply.code {
            status::LOGGED_IN => {}
            status::USER_OK => {
                chan.exec(Command::Pass(password.to_string()), status::LOGGED_IN)
                    .await?;
            }
            code => {
                return Err(FtpError::UnexpectedReply {
                    code,
                    text: reply.text,
                })
            }
        }
        // Pin binary mode; there are no ASCII conversions in this library.
        self.chan_mut()?
            .exec(Command::TypeImage, status::COMMAND_OK)
            .await?;
        Ok(())
    }

    async fn simple(&mut self, cmd: Command, expected: u16) -> FtpResult<()> {
        self.chan_mut()?.exec(cmd, expected).await?;
        Ok(())
    }

    async fn current_dir(&mut self) -> FtpResult<String> {
        let reply = self
            .chan_mut()?
            .exec(Command::Pwd, status::PATH_CREATED)
            .await?;
        match (reply.text.find('"'), reply.text.rfind('"')) {
            (Some(start), Some(end)) if start < end => {
                Ok(reply.text[start + 1..end].to_string())
            }
            _ => Err(FtpError::MalformedReply {
                what: "PWD",
                text: reply.text,
            }),
        }
    }

    async fn file_size(&mut self, path: &str) -> FtpResult<u64> {
        let reply = self
            .chan_mut()?
            .exec(Command::Size(path.to_string()), status::FILE)
            .await?;
        reply
            .text
            .trim()
            .parse()
            .map_err(|_| FtpError::MalformedReply {
                what: "SIZE",
                text: reply.text,
            })
    }

    async fn get_time(&mut self, path: &str) -> FtpResult<DateTime<Utc>> {
        let reply = self
            .chan_mut()?
            .exec(Command::Mdtm(path.to_string()), status::FILE)
            .await?;
        let stamp = reply.text.trim();
        // MDTM may carry fractional seconds; the whole seconds suffice.
        let stamp = stamp.split('.').next().unwrap_or(stamp);
        let naive = NaiveDateTime::parse_from_str(stamp, MDTM_FORMAT).map_err(|_| {
            FtpError::MalformedReply {
                what: "MDTM",
                text: reply.text.clone(),
            }
        })?;
        Ok(Utc.from_utc_datetime(&naive))
    }

    async fn set_time(&mut self, path: &str, mtime: DateTime<Utc>) -> FtpResult<()> {
        let stamp = mtime.format(MDTM_FORMAT).to_string();
        let cmd = if self.settings.writing_mdtm && self.mdtm_supported && !self.mfmt_supported {
            Command::MdtmSet(stamp, path.to_string())
        } else {
            Command::Mfmt(stamp, path.to_string())
        };
        self.chan_mut()?.exec(cmd, status::FILE).await?;
        Ok(())
    }

    async fn get_entry(&mut self, path: &str) -> FtpResult<Entry> {
        let reply = self
            .chan_mut()?
            .exec(Command::Mlst(path.to_string()), status::REQUESTED_FILE_ACTION_OK)
            .await?;
        // The entry is the single indented line inside the 250 block.
        let fact_line = reply
            .lines()
            .find(|line| line.starts_with(' '))
            .ok_or_else(|| FtpError::MalformedReply {
                what: "MLST",
                text: reply.text.clone(),
            })?;
        let mut entry =
            parse_fact_line(fact_line, &self.settings.location).map_err(|_| {
                FtpError::MalformedReply {
                    what: "MLST",
                    text: reply.text.clone(),
                }
            })?;
        // Servers report the full path here; callers asked about `path`.
        entry.name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(path)
            .to_string();
        Ok(entry)
    }

    async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.chan_mut()?
            .exec(Command::Rnfr(from.to_string()), status::REQUEST_FILE_PENDING)
            .await?;
        self.chan_mut()?
            .exec(Command::Rnto(to.to_string()), status::REQUESTED_FILE_ACTION_OK)
            .await?;
        Ok(())
    }

    async fn logout(&mut self) -> FtpResult<()> {
        let reply = self.chan_mut()?.exec_any(Command::Rein).await?;
        match reply.code {
            status::READY => Ok(()),
            status::NOT_IMPLEMENTED => {
                warn!("server does not implement REIN: {}", reply.text);
                Ok(())
            }
            code => Err(FtpError::UnexpectedReply {
                code,
                text: reply.text,
            }),
        }
    }

    /// Negotiates a passive data connection for `cmd` and dials it,
    /// upgrading to TLS when the control channel is secured.
    async fn open_data_conn(&mut self, cmd: &Command) -> FtpResult<BoxStream> {
        if self.use_pret {
            let line = cmd.to_string();
            self.chan_mut()?
                .exec(Command::Pret(line), status::COMMAND_OK)
                .await?;
        }

        let use_epsv = !self.settings.disable_epsv && self.epsv_supported;
        let (host, port) = if use_epsv {
            let reply = self
                .chan_mut()?
                .exec(Command::Epsv, status::EXTENDED_PASSIVE_MODE)
                .await?;
            let port =
                datachan::parse_epsv_reply(&reply.text).ok_or(FtpError::MalformedReply {
                    what: "EPSV",
                    text: reply.text.clone(),
                })?;
            (self.host.clone(), port)
        } else {
            let reply = self
                .chan_mut()?
                .exec(Command::Pasv, status::PASSIVE_MODE)
                .await?;
            let (ip, port) =
                datachan::parse_pasv_reply(&reply.text).ok_or(FtpError::MalformedReply {
                    what: "PASV",
                    text: reply.text.clone(),
                })?;
            if datachan::pasv_host_is_plausible(self.host_ip, ip) {
                (ip.to_string(), port)
            } else {
                debug!("substituting control host for bogus PASV address {}", ip);
                (self.host.clone(), port)
            }
        };

        let stream = dial_stream(&self.settings, &host, port).await?;
        match &self.settings.tls {
            Some(_) => wrap_tls(&self.settings, stream).await,
            None => Ok(stream),
        }
    }

    /// Opens the data connection, issues REST when resuming, sends the
    /// transfer command and waits for the 125/150 opening reply.
    async fn open_transfer(&mut self, cmd: Command, offset: u64) -> FtpResult<BoxStream> {
        let data = self.open_data_conn(&cmd).await?;
        if offset != 0 {
            self.chan_mut()?
                .exec(Command::Rest(offset), status::REQUEST_FILE_PENDING)
                .await?;
        }
        self.chan_mut()?.send(cmd).await?;
        self.chan_mut()?.expect_in(&TRANSFER_OPEN_CODES).await?;
        Ok(data)
    }

    /// Reads the 226/250 that ends a transfer, bounded by the shut
    /// timeout.
    async fn read_final_reply(&mut self) -> FtpResult<Reply> {
        let shut = self.settings.shut_timeout;
        let chan = self.chan.as_mut().ok_or(FtpError::Closed)?;
        match tokio::time::timeout(shut, chan.expect_in(&TRANSFER_END_CODES)).await {
            Ok(reply) => reply,
            Err(_) => Err(FtpError::TimedOut),
        }
    }

    /// Like [`read_final_reply`](Self::read_final_reply) but tolerant of
    /// whatever code arrives; used when tearing down transfers that did
    /// not run to completion.
    pub(crate) async fn drain_final_reply(&mut self) -> FtpResult<()> {
        match self.read_final_reply().await {
            Ok(_) => Ok(()),
            Err(FtpError::UnexpectedReply { code, text }) => {
                debug!("transfer teardown reply: {} {}", code, text);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn finish_transfer(&mut self) -> FtpResult<()> {
        self.read_final_reply().await.map(|_| ())
    }

    async fn store<R>(&mut self, cmd: Command, reader: &mut R, offset: u64) -> FtpResult<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut data = self.open_transfer(cmd, offset).await?;

        let cancel = self.settings.cancel.clone();
        let copied: FtpResult<u64> = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FtpError::Cancelled),
            r = tokio::io::copy(reader, &mut data) => r.map_err(FtpError::from),
        };

        // The RFC wants the data connection closed before the final reply
        // is read; the shutdown flushes our half and signals EOF.
        let mut op_err = copied.err();
        if let Err(e) = data.shutdown().await {
            if op_err.is_none() {
                op_err = Some(e.into());
            }
        }
        drop(data);

        let reply_err = self.read_final_reply().await.err();
        match FtpError::merge(op_err, reply_err) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Runs a line-producing data command (LIST, NLST, MLSD) to EOF and
    /// returns the lines.
    async fn read_data_lines(&mut self, cmd: Command) -> FtpResult<Vec<String>> {
        let data = self.open_transfer(cmd, 0).await?;

        let cancel = self.settings.cancel.clone();
        let mut reader = tokio::io::BufReader::new(data);
        let read_all = async {
            let mut lines = Vec::new();
            let mut raw = Vec::new();
            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) => break Ok(lines),
                    Ok(_) => {
                        while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
                            raw.pop();
                        }
                        if raw.is_empty() {
                            continue;
                        }
                        lines.push(String::from_utf8_lossy(&raw).into_owned());
                    }
                    Err(e) => break Err(FtpError::from(e)),
                }
            }
        };
        let lines: FtpResult<Vec<String>> = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FtpError::Cancelled),
            r = read_all => r,
        };
        drop(reader);

        let reply_err = self.read_final_reply().await.err();
        match lines {
            Ok(lines) => match reply_err {
                None => Ok(lines),
                Some(e) => Err(e),
            },
            Err(e) => match FtpError::merge(Some(e), reply_err) {
                Some(e) => Err(e),
                None => unreachable!("merging a present error yields one"),
            },
        }
    }

    async fn list(&mut self, path: &str) -> FtpResult<Vec<Entry>> {
        let cmd = if self.mlst_supported && !self.settings.disable_mlsd {
            Command::Mlsd(path.to_string())
        } else {
            Command::List {
                path: path.to_string(),
                hidden: self.settings.force_list_hidden,
            }
        };
        let lines = self.read_data_lines(cmd).await?;

        let mut parser = ListParser::new(Utc::now(), self.settings.location);
        let mut entries = Vec::new();
        for line in &lines {
            match parser.parse_line(line) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => debug!("skipping listing line {:?}: {}", line, e),
            }
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for FtpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpClient").finish_non_exhaustive()
    }
}
