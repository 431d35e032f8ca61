//! Parser for listing lines shaped like the output of Unix `ls -l`, which
//! is what most servers produce, plus the HostedFTP variation on it.

use chrono::{DateTime, FixedOffset, Utc};

use super::scanner::Scanner;
use super::{parse_ls_time, Entry, EntryKind, ListingError};

pub(super) fn parse(
    line: &str,
    now: DateTime<Utc>,
    tz: &FixedOffset,
) -> Result<Entry, ListingError> {
    // The mode field is exactly 10 bytes, or 10 plus a trailing '+' on
    // systems that mark ACLs.
    match line.find(' ') {
        Some(10) => {}
        Some(11) if line.as_bytes()[10] == b'+' => {}
        _ => return Err(ListingError::UnsupportedLine),
    }

    let mut scanner = Scanner::new(line);
    let fields = scanner.next_fields(6);
    if fields.len() < 6 {
        return Err(ListingError::UnsupportedLine);
    }

    // Some Mac servers list folders as "<mode> folder 0 <date> <name>".
    if fields[1] == "folder" && fields[2] == "0" {
        let mut entry = Entry::new(scanner.remaining(), EntryKind::Folder);
        entry.modified = Some(parse_ls_time(&fields[3..6], now, tz)?);
        return Ok(entry);
    }

    // The same servers list files as "<mode> 0 <size> <junk> <date> <name>".
    if fields[1] == "0" {
        let size = fields[2]
            .parse()
            .map_err(|_| ListingError::UnsupportedLine)?;
        let extra = scanner.next();
        let mut entry = Entry::new(scanner.remaining(), EntryKind::File);
        entry.size = size;
        entry.modified = Some(parse_ls_time(&[fields[4], fields[5], extra], now, tz)?);
        return Ok(entry);
    }

    // Regular ls: mode, links, owner, group, size, month, day, year-or-time.
    let more = scanner.next_fields(2);
    if more.len() < 2 {
        return Err(ListingError::UnsupportedLine);
    }
    let name = scanner.remaining();

    let mut entry = match fields[0].as_bytes()[0] {
        b'-' => {
            let mut e = Entry::new(name, EntryKind::File);
            e.size = fields[4]
                .parse()
                .map_err(|_| ListingError::UnsupportedLine)?;
            e
        }
        b'd' => Entry::new(name, EntryKind::Folder),
        b'l' => {
            let mut e = Entry::new(name, EntryKind::Link);
            if let Some(i) = name.find(" -> ") {
                if i > 0 {
                    e.target = Some(name[i + 4..].to_string());
                    e.name.truncate(i);
                }
            }
            e
        }
        _ => return Err(ListingError::UnknownEntryType),
    };

    entry.modified = Some(parse_ls_time(&[fields[5], more[0], more[1]], now, tz)?);
    Ok(entry)
}

/// hostedftp.com emits ls-style lines with a link count of zero:
/// `-r--------   0 user group     65222236 Feb 24 00:39 file.csv`
/// Rewrite the count to 1 and run the line through the Unix parser.
pub(super) fn parse_hosted_ftp(
    line: &str,
    now: DateTime<Utc>,
    tz: &FixedOffset,
) -> Result<Entry, ListingError> {
    if line.find(' ') != Some(10) {
        return Err(ListingError::UnsupportedLine);
    }

    let mut scanner = Scanner::new(line);
    let fields = scanner.next_fields(2);
    if fields.len() < 2 || fields[1] != "0" {
        return Err(ListingError::UnsupportedLine);
    }

    let rewritten = format!("{} 1 {}", fields[0], scanner.remaining());
    parse(&rewritten, now, tz)
}
