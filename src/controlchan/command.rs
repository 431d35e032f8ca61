//! The commands this client sends, and their wire form.

use std::fmt;

/// A single FTP request. `Display` produces the exact line put on the
/// wire, without the trailing CRLF (the codec appends it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    User(String),
    Pass(String),
    /// `TYPE I`. The transfer type is pinned to binary; there is no ASCII
    /// variant to express.
    TypeImage,
    Feat,
    OptsUtf8On,
    Cwd(String),
    Cdup,
    Pwd,
    Mkd(String),
    Rmd(String),
    Dele(String),
    Rnfr(String),
    Rnto(String),
    Size(String),
    Mdtm(String),
    /// The two-argument MDTM form vsftpd uses to set a file time.
    MdtmSet(String, String),
    Mfmt(String, String),
    Mlst(String),
    Mlsd(String),
    List { path: String, hidden: bool },
    Nlst(String),
    Retr(String),
    Stor(String),
    Appe(String),
    Rest(u64),
    Pasv,
    Epsv,
    /// `PRET <command line>` pre-announces the transfer command to
    /// distributed servers.
    Pret(String),
    AuthTls,
    Pbsz0,
    ProtPrivate,
    Noop,
    Rein,
    Quit,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::User(user) => write!(f, "USER {}", user),
            Command::Pass(pass) => write!(f, "PASS {}", pass),
            Command::TypeImage => write!(f, "TYPE I"),
            Command::Feat => write!(f, "FEAT"),
            Command::OptsUtf8On => write!(f, "OPTS UTF8 ON"),
            Command::Cwd(path) => write!(f, "CWD {}", path),
            Command::Cdup => write!(f, "CDUP"),
            Command::Pwd => write!(f, "PWD"),
            Command::Mkd(path) => write!(f, "MKD {}", path),
            Command::Rmd(path) => write!(f, "RMD {}", path),
            Command::Dele(path) => write!(f, "DELE {}", path),
            Command::Rnfr(path) => write!(f, "RNFR {}", path),
            Command::Rnto(path) => write!(f, "RNTO {}", path),
            Command::Size(path) => write!(f, "SIZE {}", path),
            Command::Mdtm(path) => write!(f, "MDTM {}", path),
            Command::MdtmSet(stamp, path) => write!(f, "MDTM {} {}", stamp, path),
            Command::Mfmt(stamp, path) => write!(f, "MFMT {} {}", stamp, path),
            Command::Mlst(path) => write!(f, "MLST {}", path),
            Command::Mlsd(path) => write!(f, "MLSD {}", path),
            Command::List { path, hidden } => match (path.is_empty(), hidden) {
                (true, false) => write!(f, "LIST"),
                (true, true) => write!(f, "LIST -a"),
                (false, false) => write!(f, "LIST {}", path),
                (false, true) => write!(f, "LIST -a {}", path),
            },
            Command::Nlst(path) => {
                if path.is_empty() {
                    write!(f, "NLST")
                } else {
                    write!(f, "NLST {}", path)
                }
            }
            Command::Retr(path) => write!(f, "RETR {}", path),
            Command::Stor(path) => write!(f, "STOR {}", path),
            Command::Appe(path) => write!(f, "APPE {}", path),
            Command::Rest(offset) => write!(f, "REST {}", offset),
            Command::Pasv => write!(f, "PASV"),
            Command::Epsv => write!(f, "EPSV"),
            Command::Pret(line) => write!(f, "PRET {}", line),
            Command::AuthTls => write!(f, "AUTH TLS"),
            Command::Pbsz0 => write!(f, "PBSZ 0"),
            Command::ProtPrivate => write!(f, "PROT P"),
            Command::Noop => write!(f, "NOOP"),
            Command::Rein => write!(f, "REIN"),
            Command::Quit => write!(f, "QUIT"),
        }
    }
}

impl Command {
    /// The command line with credentials masked, safe for the debug log.
    pub(crate) fn redacted(&self) -> String {
        match self {
            Command::Pass(_) => "PASS ****".to_string(),
            other => other.to_string(),
        }
    }
}
