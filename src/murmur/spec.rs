use regex::Regex;

use crate::murmur::error::MurmurError;

/// An archive descriptor as parsed from text, before the validator has
/// sorted and checked it against its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSpec {
    pub seconds_per_point: u32,
    pub points: u32,
}

const UNITS: [(&str, u64); 6] = [
    ("seconds", 1),
    ("minutes", 60),
    ("hours", 3600),
    ("days", 86_400),
    ("weeks", 604_800),
    // 7 * 365 * 86400. This is almost certainly a bug upstream (a calendar
    // year is not 7*365 days) but it's preserved byte-for-bit per the
    // source's own documented behavior.
    ("years", 31_449_600),
];

/// Maps a unit token to a seconds multiplier. An empty token means "no
/// unit", which this function treats as seconds (multiplier 1) -- callers
/// that need to distinguish "no unit at all" from "explicit unit" do so
/// before calling this.
fn unit_seconds(unit: &str) -> Option<u64> {
    if unit.is_empty() {
        return Some(1);
    }
    UNITS
        .iter()
        .find(|(word, _)| word.starts_with(unit))
        .map(|(_, secs)| *secs)
}

fn token_re() -> Regex {
    Regex::new(r"^(\d+)([A-Za-z]*)$").unwrap()
}

/// Parses `<precision>` (`<integer><unit?>`) into a count of seconds.
fn parse_precision(token: &str, spec: &str) -> Result<u32, MurmurError> {
    let caps = token_re().captures(token).ok_or_else(|| MurmurError::InvalidSpec {
        spec: spec.to_string(),
        reason: format!("could not parse precision {token:?}"),
    })?;
    let number: u64 = caps[1].parse().map_err(|_| MurmurError::InvalidSpec {
        spec: spec.to_string(),
        reason: format!("precision {token:?} is not a number"),
    })?;
    let unit = unit_seconds(&caps[2]).ok_or_else(|| MurmurError::InvalidSpec {
        spec: spec.to_string(),
        reason: format!("unknown time unit in precision {token:?}"),
    })?;
    let seconds_per_point = u32::try_from(number * unit).map_err(|_| MurmurError::InvalidSpec {
        spec: spec.to_string(),
        reason: format!("precision {token:?} overflows a 32-bit seconds count"),
    })?;
    if seconds_per_point == 0 {
        return Err(MurmurError::InvalidSpec {
            spec: spec.to_string(),
            reason: format!("precision {token:?} is zero seconds per point"),
        });
    }
    Ok(seconds_per_point)
}

/// Parses `<retention>`: a bare integer is a point-count; `<integer><unit>`
/// is a duration that gets divided by `seconds_per_point` (truncating).
fn parse_retention(token: &str, seconds_per_point: u32, spec: &str) -> Result<u32, MurmurError> {
    let caps = token_re().captures(token).ok_or_else(|| MurmurError::InvalidSpec {
        spec: spec.to_string(),
        reason: format!("could not parse retention {token:?}"),
    })?;
    let number: u64 = caps[1].parse().map_err(|_| MurmurError::InvalidSpec {
        spec: spec.to_string(),
        reason: format!("retention {token:?} is not a number"),
    })?;
    let unit_token = &caps[2];

    let points = if unit_token.is_empty() {
        number
    } else {
        let unit = unit_seconds(unit_token).ok_or_else(|| MurmurError::InvalidSpec {
            spec: spec.to_string(),
            reason: format!("unknown time unit in retention {token:?}"),
        })?;
        (number * unit) / seconds_per_point as u64
    };

    u32::try_from(points).map_err(|_| MurmurError::InvalidSpec {
        spec: spec.to_string(),
        reason: format!("retention {token:?} overflows a 32-bit point count"),
    })
}

/// Parses one `"<precision>:<retention>"` specification, e.g. `"10s:1m"`.
pub fn parse_archive_spec(spec: &str) -> Result<ArchiveSpec, MurmurError> {
    let mut parts = spec.splitn(2, ':');
    let precision_token = parts.next().unwrap_or("");
    let retention_token = parts.next().ok_or_else(|| MurmurError::InvalidSpec {
        spec: spec.to_string(),
        reason: "missing ':'".to_string(),
    })?;

    let seconds_per_point = parse_precision(precision_token, spec)?;
    let points = parse_retention(retention_token, seconds_per_point, spec)?;

    Ok(ArchiveSpec {
        seconds_per_point,
        points,
    })
}

/// Parses an ordered sequence of archive specifications. Does not sort or
/// validate I1-I4 against each other -- that's the validator's job.
pub fn parse_specs<S: AsRef<str>>(specs: &[S]) -> Result<Vec<ArchiveSpec>, MurmurError> {
    if specs.is_empty() {
        return Err(MurmurError::EmptySpec);
    }
    specs.iter().map(|s| parse_archive_spec(s.as_ref())).collect()
}
