//! Parser for the machine-readable listing lines of RFC 3659 (MLSD, and
//! the indented fact line of an MLST reply): `fact=value;...;  name`.

use chrono::{FixedOffset, NaiveDateTime};

use super::{in_zone, Entry, EntryKind, ListingError};

const MODIFY_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parses an MLSx line. The second element of the result tells whether the
/// record described the listed directory itself or its parent (`cdir` /
/// `pdir`); such records are dropped from directory listings.
pub(super) fn parse(
    line: &str,
    tz: &FixedOffset,
) -> Result<(Entry, bool), ListingError> {
    let ws = match (line.find(';'), line.find(' ')) {
        (Some(semi), Some(ws)) if semi < ws => ws,
        _ => return Err(ListingError::UnsupportedLine),
    };

    let name = &line[ws + 1..];
    let mut entry = Entry::new(name, EntryKind::File);
    let mut dot_dir = false;

    // The fact list ends with ";" just before the separating space.
    for fact in line[..ws - 1].split(';') {
        let eq = match fact.find('=') {
            Some(i) if i > 0 => i,
            _ => return Err(ListingError::UnsupportedLine),
        };
        let key = fact[..eq].to_ascii_lowercase();
        let value = &fact[eq + 1..];
        match key.as_str() {
            "modify" => {
                let naive = NaiveDateTime::parse_from_str(value, MODIFY_FORMAT)
                    .map_err(|_| ListingError::UnsupportedDate)?;
                entry.modified = Some(in_zone(naive, tz)?);
            }
            "type" => match value.to_ascii_lowercase().as_str() {
                "dir" => entry.kind = EntryKind::Folder,
                "cdir" | "pdir" => {
                    entry.kind = EntryKind::Folder;
                    dot_dir = true;
                }
                "file" => entry.kind = EntryKind::File,
                _ => {}
            },
            "size" => {
                entry.size = value.parse().map_err(|_| ListingError::UnsupportedLine)?;
            }
            _ => {}
        }
    }

    Ok((entry, dot_dir))
}

/// Parses the single fact line of an MLST reply, as found indented inside
/// the 250 multiline response.
pub(crate) fn parse_fact_line(
    line: &str,
    tz: &FixedOffset,
) -> Result<Entry, ListingError> {
    let (entry, _) = parse(line.trim_start(), tz)?;
    Ok(entry)
}
