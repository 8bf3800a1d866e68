//! Day-scoped serial numbers of the form `(MM-DD-NN)`.
//!
//! Allocation is a pure function of the serials already known for the day:
//! the next sequence is `max + 1`, starting at `01`. There is no persisted
//! counter here; callers that need uniqueness under concurrent creation must
//! allocate inside a storage transaction that re-reads the day's serials
//! and rejects duplicates at write time.

use std::fmt;
use std::str::FromStr;

use time::Date;

use crate::error::EngineError;

/// Largest sequence a day can reach. Longer sequences do not parse.
pub const MAX_SEQUENCE: u32 = 9_999;

/// The `MM-DD` part shared by every serial minted on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayPrefix {
    month: u8,
    day: u8,
}

impl DayPrefix {
    pub fn from_date(date: Date) -> Self {
        DayPrefix {
            month: u8::from(date.month()),
            day: date.day(),
        }
    }

    pub fn month(self) -> u8 {
        self.month
    }

    pub fn day(self) -> u8 {
        self.day
    }
}

impl fmt::Display for DayPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// A parsed serial identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerialId {
    prefix: DayPrefix,
    seq: u32,
}

impl SerialId {
    pub fn new(prefix: DayPrefix, seq: u32) -> Self {
        SerialId { prefix, seq }
    }

    pub fn prefix(&self) -> DayPrefix {
        self.prefix
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }
}

impl fmt::Display for SerialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}-{:02})", self.prefix, self.seq)
    }
}

/// Why a string is not a well-formed serial.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed serial '{input}': {reason}")]
pub struct ParseSerialError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for SerialId {
    type Err = ParseSerialError;

    /// Accepts `(MM-DD-NN)` or the bare `MM-DD-NN`. The sequence has at
    /// least two digits and may have more once a day passes 99 requisitions,
    /// up to [`MAX_SEQUENCE`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| ParseSerialError {
            input: s.to_string(),
            reason,
        };

        let trimmed = s.trim();
        let body = match (trimmed.strip_prefix('('), trimmed.strip_suffix(')')) {
            (Some(_), Some(_)) if trimmed.len() >= 2 => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(fail("unbalanced brackets")),
        };

        let parts: Vec<&str> = body.split('-').collect();
        if parts.len() != 3 {
            return Err(fail("expected three dash-separated fields"));
        }
        let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !parts.iter().all(|p| all_digits(p)) {
            return Err(fail("fields must be decimal digits"));
        }
        if parts[0].len() != 2 || parts[1].len() != 2 {
            return Err(fail("month and day must have two digits"));
        }
        if parts[2].len() < 2 {
            return Err(fail("sequence must have at least two digits"));
        }

        let month: u8 = parts[0].parse().map_err(|_| fail("month out of range"))?;
        let day: u8 = parts[1].parse().map_err(|_| fail("day out of range"))?;
        let seq: u32 = parts[2].parse().map_err(|_| fail("sequence out of range"))?;
        if !(1..=12).contains(&month) {
            return Err(fail("month out of range"));
        }
        if !(1..=31).contains(&day) {
            return Err(fail("day out of range"));
        }
        if seq == 0 {
            return Err(fail("sequence starts at 01"));
        }
        if seq > MAX_SEQUENCE {
            return Err(fail("sequence out of range"));
        }

        Ok(SerialId {
            prefix: DayPrefix { month, day },
            seq,
        })
    }
}

/// Mint the next serial for `reference_date`.
///
/// Only entries that parse and carry the same `MM-DD` prefix count; anything
/// ill-formed is ignored, including sequences past [`MAX_SEQUENCE`]. Gaps are
/// not reused: the result is always one past the largest sequence seen, and a
/// day whose largest sequence is already `MAX_SEQUENCE` is exhausted.
pub fn allocate<'a, I>(existing: I, reference_date: Date) -> Result<SerialId, EngineError>
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = DayPrefix::from_date(reference_date);
    let max = existing
        .into_iter()
        .filter_map(|s| s.parse::<SerialId>().ok())
        .filter(|serial| serial.prefix == prefix)
        .map(|serial| serial.seq)
        .max()
        .unwrap_or(0);
    max.checked_add(1)
        .filter(|next| *next <= MAX_SEQUENCE)
        .map(|next| SerialId::new(prefix, next))
        .ok_or_else(|| EngineError::SerialSpaceExhausted {
            day: prefix.to_string(),
            max: MAX_SEQUENCE,
        })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn first_serial_of_the_day_is_01() {
        let serial = allocate(Vec::<&str>::new(), date!(2024 - 03 - 07)).unwrap();
        assert_eq!(serial.to_string(), "(03-07-01)");
    }

    #[test]
    fn next_serial_is_max_plus_one_not_count() {
        let existing = ["(03-07-01)", "(03-07-05)", "(03-07-02)"];
        let serial = allocate(existing, date!(2024 - 03 - 07)).unwrap();
        assert_eq!(serial.to_string(), "(03-07-06)");
    }

    #[test]
    fn other_days_and_garbage_are_ignored() {
        let existing = [
            "(03-06-09)",
            "(12-07-04)",
            "03-07-x1",
            "(03-07)",
            "",
            "(03-07-03",
            "(03-07-02)",
        ];
        let serial = allocate(existing, date!(2024 - 03 - 07)).unwrap();
        assert_eq!(serial.to_string(), "(03-07-03)");
    }

    #[test]
    fn prefix_match_is_scoped_to_month_and_day_only() {
        // Same MM-DD in another year collides by construction.
        let existing = ["(01-15-04)"];
        let serial = allocate(existing, date!(2025 - 01 - 15)).unwrap();
        assert_eq!(serial.to_string(), "(01-15-05)");
    }

    #[test]
    fn sequence_widens_past_99() {
        let existing = ["(11-30-99)"];
        let serial = allocate(existing, date!(2024 - 11 - 30)).unwrap();
        assert_eq!(serial.to_string(), "(11-30-100)");

        let next = allocate(["(11-30-99)", "(11-30-100)"], date!(2024 - 11 - 30)).unwrap();
        assert_eq!(next.seq(), 101);
    }

    #[test]
    fn oversized_sequences_are_ignored_not_incremented() {
        let existing = ["(03-07-4294967295)", "(03-07-04)"];
        let serial = allocate(existing, date!(2024 - 03 - 07)).unwrap();
        assert_eq!(serial.to_string(), "(03-07-05)");
    }

    #[test]
    fn full_day_is_an_error() {
        let err = allocate(["(03-07-9999)"], date!(2024 - 03 - 07)).unwrap_err();
        assert_eq!(
            err,
            EngineError::SerialSpaceExhausted {
                day: "03-07".to_string(),
                max: MAX_SEQUENCE,
            }
        );

        let last = allocate(["(03-07-9998)"], date!(2024 - 03 - 07)).unwrap();
        assert_eq!(last.to_string(), "(03-07-9999)");
    }

    #[test]
    fn sequential_allocation_is_distinct_and_increasing() {
        let day = date!(2024 - 05 - 20);
        let mut minted: Vec<String> = Vec::new();
        for _ in 0..30 {
            let serial = allocate(minted.iter().map(String::as_str), day).unwrap();
            minted.push(serial.to_string());
        }
        let seqs: Vec<u32> = minted
            .iter()
            .map(|s| s.parse::<SerialId>().unwrap().seq())
            .collect();
        assert!(seqs.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(seqs.first(), Some(&1));
    }

    #[test]
    fn parse_accepts_bare_and_bracketed_forms() {
        let a: SerialId = "(04-01-12)".parse().unwrap();
        let b: SerialId = " 04-01-12 ".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.prefix().month(), 4);
        assert_eq!(a.prefix().day(), 1);
        assert_eq!(a.seq(), 12);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for bad in [
            "(4-01-12)",
            "(04-01-1)",
            "(13-01-01)",
            "(04-32-01)",
            "(04-01-00)",
            "(04-01-12",
            "04-01-12)",
            "(04-01-12-3)",
            "(aa-01-12)",
            "(04-01-10000)",
            "(04-01-4294967296)",
        ] {
            assert!(bad.parse::<SerialId>().is_err(), "accepted {:?}", bad);
        }
    }
}
