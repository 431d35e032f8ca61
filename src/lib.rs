#![deny(missing_docs)]
//! An async FTP(S) client library for Rust
//!
//! libftpc speaks RFC 959 and the extensions real servers actually use:
//! FEAT/OPTS (RFC 2389), extended passive mode (RFC 2428), MLST/MLSD,
//! MDTM, SIZE and REST (RFC 3659) and FTP over TLS (RFC 4217). Directory
//! listings from Unix, MS-DOS, VMS and machine-listing servers are
//! normalized into one typed [`Entry`] model.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! # async fn run() -> libftpc::FtpResult<()> {
//! let client = libftpc::FtpClient::dial("ftp.example.com:21").await?;
//! client.login("anonymous", "anonymous").await?;
//!
//! client.change_dir("pub").await?;
//! println!("now in {}", client.current_dir().await?);
//!
//! let mut file = client.retr("README").await?;
//! let mut contents = Vec::new();
//! tokio::io::AsyncReadExt::read_to_end(&mut file, &mut contents).await?;
//! file.close().await?;
//!
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

pub mod status;

mod client;
mod controlchan;
mod datachan;
mod error;
mod glob;
mod listing;
mod stream;
mod walker;

pub use crate::client::{DialBuilder, FileReader, FtpClient};
pub use crate::error::{FrameError, FtpError, FtpResult};
pub use crate::glob::matches;
pub use crate::listing::{Entry, EntryKind};
pub use crate::status::status_text;
pub use crate::stream::{BoxStream, DialFuture, Dialer, Network, StreamConn};
pub use crate::walker::Walker;
