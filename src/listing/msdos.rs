//! Parser for listing lines in the style of the MS-DOS `DIR` command:
//! `MM-DD-YY  HH:MM(AM|PM) <DIR>|<size> name`, with the ISO date variant
//! some servers use instead.

use chrono::{FixedOffset, NaiveDateTime};

use super::{in_zone, Entry, EntryKind, ListingError};

// Both prefixes happen to occupy 17 bytes.
const DIR_TIME_FORMATS: [(&str, usize); 2] = [("%m-%d-%y  %I:%M%p", 17), ("%Y-%m-%d  %H:%M", 17)];

pub(super) fn parse(line: &str, tz: &FixedOffset) -> Result<Entry, ListingError> {
    let mut parsed = None;
    for (format, width) in DIR_TIME_FORMATS {
        if line.len() <= width {
            continue;
        }
        let prefix = match line.get(..width) {
            Some(p) => p,
            None => continue,
        };
        if let Ok(naive) = NaiveDateTime::parse_from_str(prefix, format) {
            parsed = Some((naive, &line[width..]));
            break;
        }
    }
    let (naive, rest) = parsed.ok_or(ListingError::UnsupportedLine)?;
    let modified = in_zone(naive, tz)?;

    let rest = rest.trim_start_matches(' ');
    let mut entry = if let Some(after) = rest.strip_prefix("<DIR>") {
        Entry::new(after.trim_start_matches(' '), EntryKind::Folder)
    } else {
        let space = rest.find(' ').ok_or(ListingError::UnsupportedLine)?;
        let size = rest[..space]
            .parse()
            .map_err(|_| ListingError::UnsupportedLine)?;
        let mut e = Entry::new(rest[space..].trim_start_matches(' '), EntryKind::File);
        e.size = size;
        e
    };
    entry.modified = Some(modified);
    Ok(entry)
}
