//! # engine::granularity
//!
//! Parses bar granularity specifiers of the form `<unit><count>`:
//!
//! | Input       | Interval |
//! |-------------|----------|
//! | `seconds30` | 30 s     |
//! | `minutes`   | 60 s     |
//! | `hours2`    | 7 200 s  |
//! | `days`      | 86 400 s |
//! | `M5` / `D`  | broker short codes are accepted as aliases |

use std::fmt;
use std::str::FromStr;

use crate::error::BotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
        }
    }

    fn name(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    fn code(self) -> char {
        match self {
            TimeUnit::Seconds => 'S',
            TimeUnit::Minutes => 'M',
            TimeUnit::Hours => 'H',
            TimeUnit::Days => 'D',
        }
    }

    fn from_prefix(s: &str) -> Option<(Self, &str)> {
        const UNITS: [(&str, TimeUnit); 8] = [
            ("seconds", TimeUnit::Seconds),
            ("minutes", TimeUnit::Minutes),
            ("hours", TimeUnit::Hours),
            ("days", TimeUnit::Days),
            ("S", TimeUnit::Seconds),
            ("M", TimeUnit::Minutes),
            ("H", TimeUnit::Hours),
            ("D", TimeUnit::Days),
        ];
        UNITS
            .iter()
            .find_map(|(prefix, unit)| s.strip_prefix(prefix).map(|rest| (*unit, rest)))
    }
}

/// Bar width, e.g. `minutes1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Granularity {
    unit:  TimeUnit,
    count: u32,
}

impl Granularity {
    /// Interval length in seconds.
    #[inline]
    pub fn seconds(&self) -> i64 {
        self.unit.seconds() * i64::from(self.count)
    }

    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds())
    }

    /// Broker candle code: `M1`, `S30`, `H2`, `D`.
    pub fn broker_code(&self) -> String {
        match (self.unit, self.count) {
            (TimeUnit::Days, 1) => "D".to_string(),
            (unit, count) => format!("{}{count}", unit.code()),
        }
    }
}

impl FromStr for Granularity {
    type Err = BotError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || BotError::InvalidGranularity(spec.to_string());

        let (unit, digits) = TimeUnit::from_prefix(spec).ok_or_else(invalid)?;
        let count = if digits.is_empty() {
            1
        } else if digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse::<u32>().map_err(|_| invalid())?
        } else {
            return Err(invalid());
        };

        if count == 0 {
            return Err(invalid());
        }
        Ok(Self { unit, count })
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.unit.name(), self.count)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
