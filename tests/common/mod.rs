//! A minimal in-process FTP server the integration tests dial. One control
//! connection per instance; every received command verb is recorded so
//! tests can assert the exact wire conversation.

// Not every test binary uses the whole fixture.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Which time-related features the mock advertises, mirroring the common
/// server profiles: none at all, MDTM+MFMT, or vsftpd's MDTM-only.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TimeProfile {
    NoTime,
    StdTime,
    Vsftpd,
}

pub struct MockConfig {
    pub profile: TimeProfile,
    /// Data payload per LIST/MLSD path argument. With an empty map every
    /// path serves one canned Unix line; with entries, unknown paths get
    /// a 550.
    pub listings: HashMap<String, String>,
    /// Advertise UTF8 in FEAT but answer `OPTS UTF8 ON` with a 502, the
    /// way some servers do.
    pub reject_utf8: bool,
    /// Answer PASV with an address from the wrong side of the NAT while
    /// actually listening on loopback.
    pub bogus_pasv: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        MockConfig {
            profile: TimeProfile::NoTime,
            listings: HashMap::new(),
            reject_utf8: false,
            bogus_pasv: false,
        }
    }
}

pub const DEFAULT_LIST_LINE: &str = "-rw-r--r--   1 ftp      wheel           0 Jan 29 10:29 lo";

pub struct FtpMock {
    addr: String,
    commands: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FtpMock {
    pub async fn start(profile: TimeProfile) -> FtpMock {
        Self::start_with(MockConfig {
            profile,
            ..MockConfig::default()
        })
        .await
    }

    pub async fn start_with(config: MockConfig) -> FtpMock {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock addr").to_string();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&commands);
        let handle = tokio::spawn(async move {
            serve(listener, config, recorded).await;
        });
        FtpMock {
            addr,
            commands,
            handle,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Waits for the mock session to end (the client sent QUIT or closed
    /// the connection) and returns the verbs received, in order.
    pub async fn finish(self) -> Vec<String> {
        let _ = self.handle.await;
        Arc::try_unwrap(self.commands)
            .expect("server task is gone")
            .into_inner()
            .expect("commands lock")
    }
}

struct SessionState {
    cwd: String,
    file: Vec<u8>,
    file_name: Option<String>,
    rename_from: Option<String>,
    rest: u64,
    data: Option<TcpListener>,
}

async fn serve(listener: TcpListener, config: MockConfig, commands: Arc<Mutex<Vec<String>>>) {
    let (stream, _) = match listener.accept().await {
        Ok(conn) => conn,
        Err(_) => return,
    };
    drop(listener);

    let (read_half, mut w) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    send(&mut w, "220 FTP Server ready.").await;

    let mut state = SessionState {
        cwd: "/".to_string(),
        file: Vec::new(),
        file_name: None,
        rename_from: None,
        rest: 0,
        data: None,
    };

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let full = line.trim_end();
        let (verb, arg) = match full.split_once(' ') {
            Some((v, a)) => (v, a),
            None => (full, ""),
        };
        commands.lock().expect("commands lock").push(verb.to_string());

        match verb {
            "FEAT" => {
                let mut features = String::from("211-Features:\r\n FEAT\r\n PASV\r\n EPSV\r\n UTF8\r\n SIZE\r\n MLST type*;size*;modify*;\r\n");
                match config.profile {
                    TimeProfile::StdTime => features.push_str(" MDTM\r\n MFMT\r\n"),
                    TimeProfile::Vsftpd => features.push_str(" MDTM\r\n"),
                    TimeProfile::NoTime => {}
                }
                features.push_str("211 End");
                send(&mut w, &features).await;
            }
            "USER" => {
                if arg == "anonymous" {
                    send(&mut w, "331 Please send your password").await;
                } else {
                    send(&mut w, "530 This FTP server is anonymous only").await;
                }
            }
            "PASS" => send(&mut w, "230-Hey,\r\nWelcome to my FTP\r\n230 Access granted").await,
            "TYPE" => send(&mut w, "200 Type set ok").await,
            "OPTS" => {
                if config.reject_utf8 {
                    send(&mut w, "502 OPTS not implemented").await;
                } else if arg == "UTF8 ON" {
                    send(&mut w, "200 OK, UTF-8 enabled").await;
                } else {
                    send(&mut w, "500 wrong number of arguments").await;
                }
            }
            "CWD" => {
                if arg.contains("missing") {
                    send(&mut w, &format!("550 {}: No such file or directory", arg)).await;
                } else {
                    if arg.starts_with('/') {
                        state.cwd = arg.to_string();
                    } else if state.cwd == "/" {
                        state.cwd = format!("/{}", arg);
                    } else {
                        state.cwd = format!("{}/{}", state.cwd, arg);
                    }
                    send(&mut w, "250 Directory successfully changed.").await;
                }
            }
            "CDUP" => {
                if let Some(idx) = state.cwd.rfind('/') {
                    state.cwd.truncate(idx);
                }
                if state.cwd.is_empty() {
                    state.cwd = "/".to_string();
                }
                send(&mut w, "250 CDUP command successful").await;
            }
            "PWD" => send(&mut w, &format!("257 \"{}\"", state.cwd)).await,
            "DELE" => send(&mut w, "250 File successfully removed.").await,
            "MKD" => send(&mut w, "257 Directory successfully created.").await,
            "RMD" => {
                if arg.contains("missing") {
                    send(&mut w, "550 No such file or directory").await;
                } else {
                    send(&mut w, "250 Directory successfully removed.").await;
                }
            }
            "SIZE" => {
                if arg == "magic-file" {
                    send(&mut w, "213 42").await;
                } else if state.file_name.as_deref() == Some(arg) {
                    send(&mut w, &format!("213 {}", state.file.len())).await;
                } else {
                    send(&mut w, "550 Could not get file size.").await;
                }
            }
            "PASV" => match listen_data(&mut state).await {
                Ok(port) => {
                    let host = if config.bogus_pasv { "192,168,150,80" } else { "127,0,0,1" };
                    send(
                        &mut w,
                        &format!("227 Entering Passive Mode ({},{},{}).", host, port / 256, port % 256),
                    )
                    .await;
                }
                Err(e) => send(&mut w, &format!("451 {}.", e)).await,
            },
            "EPSV" => match listen_data(&mut state).await {
                Ok(port) => {
                    send(&mut w, &format!("229 Entering Extended Passive Mode (|||{}|)", port)).await;
                }
                Err(e) => send(&mut w, &format!("451 {}.", e)).await,
            },
            "STOR" | "APPE" => match state.data.take() {
                None => send(&mut w, "425 Unable to build data connection: Connection refused").await,
                Some(listener) => {
                    send(&mut w, "150 please send").await;
                    if let Ok((mut data, _)) = listener.accept().await {
                        if verb == "STOR" {
                            state.file.clear();
                        }
                        state.file_name = Some(arg.to_string());
                        let _ = data.read_to_end(&mut state.file).await;
                    }
                    send(&mut w, "226 Transfer Complete").await;
                }
            },
            "RETR" => match state.data.take() {
                None => send(&mut w, "425 Unable to build data connection: Connection refused").await,
                Some(listener) => {
                    send(&mut w, "150 here it comes").await;
                    if let Ok((mut data, _)) = listener.accept().await {
                        let from = (state.rest as usize).min(state.file.len());
                        let _ = data.write_all(&state.file[from..]).await;
                        state.rest = 0;
                        let _ = data.shutdown().await;
                    }
                    send(&mut w, "226 Transfer complete").await;
                }
            },
            "LIST" | "MLSD" => {
                let path = arg.strip_prefix("-a ").unwrap_or(arg);
                let payload = if config.listings.is_empty() {
                    Some(DEFAULT_LIST_LINE.to_string())
                } else {
                    config.listings.get(path).cloned()
                };
                match payload {
                    None => send(&mut w, "550 No such directory").await,
                    Some(payload) => match state.data.take() {
                        None => {
                            send(&mut w, "425 Unable to build data connection: Connection refused")
                                .await
                        }
                        Some(listener) => {
                            send(&mut w, "150 Opening ASCII mode data connection for file list")
                                .await;
                            if let Ok((mut data, _)) = listener.accept().await {
                                let _ = data.write_all(payload.as_bytes()).await;
                                let _ = data.shutdown().await;
                            }
                            send(&mut w, "226 Transfer complete").await;
                        }
                    },
                }
            }
            "NLST" => match state.data.take() {
                None => send(&mut w, "425 Unable to build data connection: Connection refused").await,
                Some(listener) => {
                    send(&mut w, "150 Opening ASCII mode data connection for file list").await;
                    if let Ok((mut data, _)) = listener.accept().await {
                        let _ = data.write_all(b"/incoming").await;
                        let _ = data.shutdown().await;
                    }
                    send(&mut w, "226 Transfer complete").await;
                }
            },
            "MLST" => {
                if arg == "magic-file" {
                    send(
                        &mut w,
                        "250-File details:\r\n type=file;size=42;modify=20201213202400; magic-file\r\n250 End",
                    )
                    .await;
                } else {
                    send(&mut w, "550 Could not stat file").await;
                }
            }
            "RNFR" => {
                state.rename_from = Some(arg.to_string());
                send(&mut w, "350 File or directory exists, ready for destination name").await;
            }
            "RNTO" => {
                if state.rename_from.take().as_deref() == state.file_name.as_deref() {
                    state.file_name = Some(arg.to_string());
                }
                send(&mut w, "250 Rename successful").await;
            }
            "REST" => match arg.parse::<u64>() {
                Ok(n) => {
                    state.rest = n;
                    send(
                        &mut w,
                        &format!("350 Restarting at {}. Send STORE or RETRIEVE to initiate transfer", n),
                    )
                    .await;
                }
                Err(e) => send(&mut w, &format!("500 REST: {}", e)).await,
            },
            "MDTM" => {
                let parts: Vec<&str> = arg.split(' ').collect();
                let answer = match (config.profile, parts.len()) {
                    (TimeProfile::NoTime, _) => "500 Unknown command MDTM".to_string(),
                    (TimeProfile::Vsftpd, 2) => "213 UTIME OK".to_string(),
                    (_, 1) => "213 20201213202400".to_string(),
                    _ => "500 wrong number of arguments".to_string(),
                };
                send(&mut w, &answer).await;
            }
            "MFMT" => {
                let parts: Vec<&str> = arg.split(' ').collect();
                let answer = match (config.profile, parts.len()) {
                    (TimeProfile::StdTime, 2) => "213 UTIME OK",
                    _ => "500 Unknown command MFMT",
                };
                send(&mut w, answer).await;
            }
            "NOOP" => send(&mut w, "200 NOOP ok.").await,
            "REIN" => send(&mut w, "220 Logged out").await,
            "QUIT" => {
                send(&mut w, "221 Goodbye.").await;
                return;
            }
            _ => send(&mut w, &format!("500 Unknown command {}.", verb)).await,
        }
    }
}

async fn send(w: &mut OwnedWriteHalf, line: &str) {
    let _ = w.write_all(line.as_bytes()).await;
    let _ = w.write_all(b"\r\n").await;
}

async fn listen_data(state: &mut SessionState) -> std::io::Result<u16> {
    state.data = None;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    state.data = Some(listener);
    Ok(port)
}

/// Dials the mock and logs in as the anonymous user.
pub async fn open_client(mock: &FtpMock) -> libftpc::FtpClient {
    let client = libftpc::FtpClient::dial(mock.addr()).await.expect("dial mock");
    client
        .login("anonymous", "anonymous")
        .await
        .expect("anonymous login");
    client
}

/// The verbs every dial+login conversation starts with.
pub fn handshake_verbs() -> Vec<String> {
    ["FEAT", "OPTS", "USER", "PASS", "TYPE"]
        .into_iter()
        .map(str::to_string)
        .collect()
}
