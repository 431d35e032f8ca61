//! The directory listing model and the parsers that normalize the many
//! LIST dialects found in the wild into it.
//!
//! Servers disagree wildly about what a LIST line looks like. The pipeline
//! here tries each known dialect in turn: RFC 3659 machine listings, Unix
//! `ls -l`, MS-DOS `DIR`, the HostedFTP zero-link-count oddity and VMS
//! records. A parser that does not recognize a line passes it on to the
//! next one; a line no parser recognizes is skipped by the listing
//! operation, never fatal to it.

use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

pub(crate) mod scanner;

mod msdos;
mod rfc3659;
mod unix;
mod vms;


pub(crate) use rfc3659::parse_fact_line;

/// The kind of remote object a listing entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Folder,
    /// A symbolic link.
    Link,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryKind::File => "file",
            EntryKind::Folder => "folder",
            EntryKind::Link => "link",
        };
        f.write_str(s)
    }
}

/// A directory listing record as returned by
/// [`list`](crate::FtpClient::list).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The entry name. May contain spaces but never a path separator.
    pub name: String,
    /// What the entry is.
    pub kind: EntryKind,
    /// Size in bytes. Zero for folders and links unless the server
    /// reported one.
    pub size: u64,
    /// Modification time as a UTC instant, when the listing carried a
    /// usable date. Date-only listings resolve to midnight; listings with
    /// only `HH:MM` get their year inferred (see [`ListParser`]).
    pub modified: Option<DateTime<Utc>>,
    /// The link target, present only for links listed as `name -> target`.
    pub target: Option<String>,
}

impl Entry {
    fn new(name: &str, kind: EntryKind) -> Self {
        Entry {
            name: name.to_string(),
            kind,
            size: 0,
            modified: None,
            target: None,
        }
    }
}

/// Why a listing line could not be turned into an [`Entry`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListingError {
    /// No dialect recognized the line. The signal to try the next parser.
    #[error("unsupported LIST line")]
    UnsupportedLine,
    /// The line matched a dialect but its date field did not.
    #[error("unsupported LIST date")]
    UnsupportedDate,
    /// A mode string started with a character no dialect knows.
    #[error("unknown entry type")]
    UnknownEntryType,
}

/// The dialect pipeline. Carries the reference time used for `ls`-style
/// year inference, the time zone naive listing dates are interpreted in,
/// and the filename carry used to stitch VMS continuation lines together.
pub(crate) struct ListParser {
    now: DateTime<Utc>,
    tz: FixedOffset,
    vms_carry: Option<String>,
}

impl ListParser {
    pub(crate) fn new(now: DateTime<Utc>, tz: FixedOffset) -> Self {
        ListParser {
            now,
            tz,
            vms_carry: None,
        }
    }

    /// Parses one listing line. `Ok(None)` means the line was consumed
    /// without producing an entry: an RFC 3659 `cdir`/`pdir` record or a
    /// VMS filename waiting for its continuation.
    pub(crate) fn parse_line(&mut self, line: &str) -> Result<Option<Entry>, ListingError> {
        match rfc3659::parse(line, &self.tz) {
            Err(ListingError::UnsupportedLine) => {}
            Err(e) => return Err(e),
            Ok((_, true)) => return Ok(None),
            Ok((entry, false)) => return Ok(Some(entry)),
        }
        match unix::parse(line, self.now, &self.tz) {
            Err(ListingError::UnsupportedLine) => {}
            other => return other.map(Some),
        }
        match msdos::parse(line, &self.tz) {
            Err(ListingError::UnsupportedLine) => {}
            other => return other.map(Some),
        }
        match unix::parse_hosted_ftp(line, self.now, &self.tz) {
            Err(ListingError::UnsupportedLine) => {}
            other => return other.map(Some),
        }
        vms::parse(line, &self.tz, &mut self.vms_carry)
    }
}

/// Anchors a naive listing timestamp in `tz` and converts it to UTC.
fn in_zone(naive: NaiveDateTime, tz: &FixedOffset) -> Result<DateTime<Utc>, ListingError> {
    tz.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(ListingError::UnsupportedDate)
}

/// Resolves the `month day year-or-time` triple of an `ls -l` line.
///
/// When the third field is a `HH:MM` time the year is taken from `now`,
/// minus one if that would place the timestamp more than six months in the
/// future. `ls` itself prints the recent form only for timestamps less
/// than six months old, so a "future" time really means last year.
fn parse_ls_time(
    fields: &[&str],
    now: DateTime<Utc>,
    tz: &FixedOffset,
) -> Result<DateTime<Utc>, ListingError> {
    debug_assert_eq!(fields.len(), 3);
    let (month, day, year_or_time) = (fields[0], fields[1], fields[2]);

    if year_or_time.contains(':') {
        let composed = format!("{} {} {} {}", day, month, now.year(), year_or_time);
        let naive = NaiveDateTime::parse_from_str(&composed, "%d %b %Y %H:%M")
            .map_err(|_| ListingError::UnsupportedDate)?;
        let mut t = in_zone(naive, tz)?;
        let horizon = now
            .checked_add_months(Months::new(6))
            .ok_or(ListingError::UnsupportedDate)?;
        if t >= horizon {
            t = t
                .checked_sub_months(Months::new(12))
                .ok_or(ListingError::UnsupportedDate)?;
        }
        Ok(t)
    } else {
        if year_or_time.len() != 4 {
            return Err(ListingError::UnsupportedDate);
        }
        let composed = format!("{} {} {}", day, month, year_or_time);
        let date = NaiveDate::parse_from_str(&composed, "%d %b %Y")
            .map_err(|_| ListingError::UnsupportedDate)?;
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or(ListingError::UnsupportedDate)?;
        in_zone(naive, tz)
    }
}
