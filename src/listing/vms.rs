//! Parser for OpenVMS FTP server listings.
//!
//! Records look like
//! `FILENAME.EXT;1   123/125  12-DEC-2017 14:10:37  [GROUP,OWNER] (RWED,RWED,RE,)`
//! and `.DIR;` in the versioned filename marks a directory. When the
//! filename is long the record wraps: the filename stands alone on one line
//! and the remaining fields follow on the next, so the parser keeps the
//! last lone filename as carry state.

use chrono::{FixedOffset, NaiveDateTime};

use super::scanner::Scanner;
use super::{in_zone, Entry, EntryKind, ListingError};

pub(super) fn parse(
    line: &str,
    tz: &FixedOffset,
    carry: &mut Option<String>,
) -> Result<Option<Entry>, ListingError> {
    if line.is_empty() {
        return Err(ListingError::UnsupportedLine);
    }

    let mut scanner = Scanner::new(line);
    let first = scanner.next();
    if first.is_empty() {
        return Err(ListingError::UnsupportedLine);
    }

    // Without a version separator this is no VMS filename, unless we are
    // waiting for the continuation of one.
    if !first.contains(';') && carry.is_none() {
        return Err(ListingError::UnsupportedLine);
    }

    let mut fields = scanner.next_fields(5);

    // A filename with nothing after it wraps onto the next line.
    if fields.is_empty() {
        *carry = Some(first.to_string());
        return Ok(None);
    }

    let carried;
    let filename = match carry.take() {
        Some(prev) => {
            fields.insert(0, first);
            carried = prev;
            carried.as_str()
        }
        None => first,
    };

    if fields.len() < 5 {
        return Err(ListingError::UnsupportedLine);
    }

    let base = filename.split(';').next().unwrap_or(filename);
    let mut entry = if filename.contains(".DIR;") {
        Entry::new(&base.replacen(".DIR", "", 1), EntryKind::Folder)
    } else {
        let mut e = Entry::new(base, EntryKind::File);
        // The first field is "used/allocated" in 512-byte blocks; keep the
        // used count, and a size of zero when it does not parse.
        let blocks = fields[0].split('/').next().unwrap_or(fields[0]);
        e.size = blocks.parse().unwrap_or(0);
        e
    };

    // A date that does not parse leaves the entry without a timestamp.
    let stamp = format!("{} {}", fields[1], fields[2]);
    entry.modified = NaiveDateTime::parse_from_str(&stamp, "%d-%b-%Y %H:%M:%S")
        .ok()
        .and_then(|naive| in_zone(naive, tz).ok());

    Ok(Some(entry))
}
