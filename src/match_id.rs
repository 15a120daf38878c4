use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MatchIdError;

const DATE_FMT: &str = "%Y%m%d";
const TIME_FMT: &str = "%H%M%S";

/// Identifier of one match: a date, optionally qualified by a start time.
///
/// Ordered by date, then time, with a bare date sorting before any time on
/// the same day. The canonical text form (`YYYYMMDD` or `YYYYMMDD_HHMMSS`)
/// sorts the same way, so it is safe to store as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchId {
    date: NaiveDate,
    time: Option<NaiveTime>,
}

impl MatchId {
    pub fn from_date(date: NaiveDate) -> Self {
        Self { date, time: None }
    }

    pub fn with_time(date: NaiveDate, time: NaiveTime) -> Self {
        // Sub-second precision has no text form.
        let time = time.with_nanosecond(0).unwrap_or(time);
        Self {
            date,
            time: Some(time),
        }
    }

    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn parse(raw: &str) -> Result<Self, MatchIdError> {
        let raw = raw.trim();
        let (date_part, time_part) = match raw.split_once('_') {
            Some((d, t)) => (d, Some(t)),
            None => (raw, None),
        };
        let date = parse_match_date(date_part).map_err(|_| MatchIdError::Format(raw.into()))?;
        let Some(time_part) = time_part else {
            return Ok(Self::from_date(date));
        };
        if time_part.len() != 6 || !time_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MatchIdError::Format(raw.into()));
        }
        let time = NaiveTime::parse_from_str(time_part, TIME_FMT)
            .map_err(|_| MatchIdError::Format(raw.into()))?;
        Ok(Self::with_time(date, time))
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time
    }

    /// `YYYYMMDD`, the value stored in `match_date` columns.
    pub fn date_key(&self) -> String {
        self.date.format(DATE_FMT).to_string()
    }

    /// Canonical identifier, used in `match_id` columns and table names.
    pub fn key(&self) -> String {
        match self.time {
            Some(time) => format!("{}_{}", self.date_key(), time.format(TIME_FMT)),
            None => self.date_key(),
        }
    }
}

/// Parses `YYYYMMDD`, also accepting `YYYY-MM-DD`.
pub fn parse_match_date(raw: &str) -> Result<NaiveDate, MatchIdError> {
    let raw = raw.trim();
    let compact: String = if raw.len() == 10 && raw.as_bytes()[4] == b'-' && raw.as_bytes()[7] == b'-'
    {
        raw.replace('-', "")
    } else {
        raw.to_string()
    };
    if compact.len() != 8 || !compact.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MatchIdError::Date(raw.into()));
    }
    NaiveDate::parse_from_str(&compact, DATE_FMT).map_err(|_| MatchIdError::Date(raw.into()))
}

pub fn format_match_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for MatchId {
    type Err = MatchIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for MatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
