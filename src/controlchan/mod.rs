//! The control channel: CRLF command/reply framing over the session's
//! byte stream, with multiline reply reassembly.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use log::debug;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tokio_util::sync::CancellationToken;

use crate::error::{FrameError, FtpError, FtpResult};
use crate::status;
use crate::stream::BoxStream;

pub(crate) mod command;

pub(crate) use command::Command;

// Protects the reply reader against a malicious or broken server feeding
// us unbounded garbage.
const MAX_LINE_LEN: usize = 4096;
const MAX_MULTI_LINES: usize = 1024;

/// One complete server reply. For multiline replies `text` holds the
/// reassembled lines joined with `\n`: the opening line's text first,
/// continuation lines verbatim, the closing line's text last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    pub(crate) code: u16,
    pub(crate) text: String,
}

impl Reply {
    /// The lines of the reply text.
    pub(crate) fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }
}

struct MultiReply {
    code: u16,
    end_prefix: [u8; 4],
    lines: Vec<String>,
}

/// Implements tokio's `Decoder` and `Encoder` for the control channel:
/// commands go out as CRLF-terminated lines, replies come back either as
/// `DDD text` or as a `DDD-` block closed by a `DDD ` line.
pub(crate) struct FtpCodec {
    // Index of the next byte to examine for '\n', so a partial line is not
    // rescanned from the start on every poll.
    next_index: usize,
    multi: Option<MultiReply>,
}

impl FtpCodec {
    pub(crate) fn new() -> Self {
        FtpCodec {
            next_index: 0,
            multi: None,
        }
    }

    fn take_line(&mut self, buf: &mut BytesMut) -> FtpResult<Option<BytesMut>> {
        match buf[self.next_index..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let mut line = buf.split_to(self.next_index + offset + 1);
                self.next_index = 0;
                // Chop the line terminator, tolerating a bare '\n'.
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                if line.len() > MAX_LINE_LEN {
                    return Err(FrameError::LineTooLong.into());
                }
                Ok(Some(line))
            }
            None => {
                if buf.len() > MAX_LINE_LEN {
                    return Err(FrameError::LineTooLong.into());
                }
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }
}

fn line_text(bytes: &[u8]) -> FtpResult<&str> {
    std::str::from_utf8(bytes).map_err(|_| FrameError::NotUtf8.into())
}

/// Splits `DDD<sep>text`, validating the code.
fn parse_reply_head(line: &[u8]) -> FtpResult<(u16, u8, &[u8])> {
    if line.len() < 3 {
        return Err(FrameError::TruncatedLine.into());
    }
    if !line[..3].iter().all(u8::is_ascii_digit) {
        return Err(FrameError::InvalidCode.into());
    }
    let code = (line[0] - b'0') as u16 * 100 + (line[1] - b'0') as u16 * 10 + (line[2] - b'0') as u16;
    if !(100..600).contains(&code) {
        return Err(FrameError::InvalidCode.into());
    }
    if line.len() == 3 {
        return Ok((code, b' ', &[]));
    }
    Ok((code, line[3], &line[4..]))
}

impl Decoder for FtpCodec {
    type Item = Reply;
    type Error = FtpError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Reply>, Self::Error> {
        while let Some(line) = self.take_line(buf)? {
            let finished = match self.multi.as_mut() {
                Some(multi) => {
                    if line.starts_with(&multi.end_prefix[..]) {
                        multi.lines.push(line_text(&line[4..])?.trim_end().to_string());
                        true
                    } else {
                        if multi.lines.len() >= MAX_MULTI_LINES {
                            return Err(FrameError::TooManyLines.into());
                        }
                        // Continuation lines keep their leading whitespace;
                        // FEAT relies on it.
                        multi.lines.push(line_text(&line)?.trim_end().to_string());
                        false
                    }
                }
                None => {
                    let (code, sep, text) = parse_reply_head(&line)?;
                    match sep {
                        b' ' => {
                            return Ok(Some(Reply {
                                code,
                                text: line_text(text)?.trim_end().to_string(),
                            }));
                        }
                        b'-' => {
                            self.multi = Some(MultiReply {
                                code,
                                end_prefix: [line[0], line[1], line[2], b' '],
                                lines: vec![line_text(text)?.trim_end().to_string()],
                            });
                            false
                        }
                        _ => return Err(FrameError::InvalidLine.into()),
                    }
                }
            };
            if finished {
                let multi = self.multi.take().expect("multiline block was open");
                return Ok(Some(Reply {
                    code: multi.code,
                    text: multi.lines.join("\n"),
                }));
            }
        }
        Ok(None)
    }
}

impl Encoder<Command> for FtpCodec {
    type Error = FtpError;

    fn encode(&mut self, cmd: Command, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let mut line = Vec::new();
        write!(line, "{}\r\n", cmd).map_err(FtpError::Io)?;
        buf.extend(&line);
        Ok(())
    }
}

/// The request/reply half of a session: owns the framed control stream and
/// enforces the one-command-one-reply rhythm.
pub(crate) struct ControlChan {
    framed: Framed<BoxStream, FtpCodec>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ControlChan {
    pub(crate) fn new(
        stream: BoxStream,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        ControlChan {
            framed: Framed::new(stream, FtpCodec::new()),
            timeout,
            cancel,
        }
    }

    /// Takes the byte stream back out, dropping the framing state. Used
    /// for the TLS upgrade, which happens on a reply boundary.
    pub(crate) fn into_stream(self) -> BoxStream {
        self.framed.into_inner()
    }

    pub(crate) async fn send(&mut self, cmd: Command) -> FtpResult<()> {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FtpError::Cancelled),
            r = self.send_raw(cmd) => r,
        }
    }

    /// Sends without consulting the cancel token. Teardown paths use this
    /// to say goodbye after the token has already fired.
    pub(crate) async fn send_raw(&mut self, cmd: Command) -> FtpResult<()> {
        debug!("ftp > {}", cmd.redacted());
        self.framed.send(cmd).await
    }

    /// Reads one complete reply, whatever its code.
    pub(crate) async fn read_reply(&mut self) -> FtpResult<Reply> {
        let cancel = self.cancel.clone();
        let timeout = self.timeout;
        let next = async {
            match timeout {
                Some(d) => match tokio::time::timeout(d, self.framed.next()).await {
                    Ok(item) => item,
                    Err(_) => Some(Err(FtpError::TimedOut)),
                },
                None => self.framed.next().await,
            }
        };
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FtpError::Cancelled),
            item = next => match item {
                Some(Ok(reply)) => reply,
                Some(Err(e)) => return Err(e),
                None => return Err(FrameError::ConnectionClosed.into()),
            },
        };
        debug!(
            "ftp < {} {}",
            reply.code,
            reply.lines().next().unwrap_or_default()
        );
        Ok(reply)
    }

    /// Reads one reply and fails with the protocol-status error unless its
    /// code is the expected one.
    pub(crate) async fn expect(&mut self, expected: u16) -> FtpResult<Reply> {
        self.expect_in(&[expected]).await
    }

    pub(crate) async fn expect_in(&mut self, expected: &[u16]) -> FtpResult<Reply> {
        let reply = self.read_reply().await?;
        if !expected.contains(&reply.code) {
            return Err(FtpError::UnexpectedReply {
                code: reply.code,
                text: reply.text,
            });
        }
        Ok(reply)
    }

    pub(crate) async fn exec(&mut self, cmd: Command, expected: u16) -> FtpResult<Reply> {
        self.send(cmd).await?;
        self.expect(expected).await
    }

    pub(crate) async fn exec_in(&mut self, cmd: Command, expected: &[u16]) -> FtpResult<Reply> {
        self.send(cmd).await?;
        self.expect_in(expected).await
    }

    pub(crate) async fn exec_any(&mut self, cmd: Command) -> FtpResult<Reply> {
        self.send(cmd).await?;
        self.read_reply().await
    }

    /// Issues FEAT and collects the advertised extensions. A server that
    /// answers anything but 211 simply has no extensions; that is not an
    /// error.
    pub(crate) async fn features(&mut self) -> FtpResult<HashMap<String, String>> {
        self.send(Command::Feat).await?;
        let reply = self.read_reply().await?;

        let mut features = HashMap::new();
        if reply.code != status::SYSTEM {
            return Ok(features);
        }
        for line in reply.lines() {
            // Only continuation lines indented with a single space name a
            // feature; the prose lines around them do not.
            let Some(rest) = line.strip_prefix(' ') else {
                continue;
            };
            let rest = rest.trim();
            if rest.is_empty() {
                continue;
            }
            let (name, param) = match rest.split_once(' ') {
                Some((name, param)) => (name, param),
                None => (rest, ""),
            };
            features.insert(name.to_ascii_uppercase(), param.to_string());
        }
        Ok(features)
    }
}
