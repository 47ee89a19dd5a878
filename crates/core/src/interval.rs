use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Candle interval supported by the exchange kline endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    /// Returns the exchange API string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }

    /// Returns the interval duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        match self {
            Interval::OneMinute => 60_000,
            Interval::FiveMinutes => 300_000,
            Interval::FifteenMinutes => 900_000,
            Interval::OneHour => 3_600_000,
            Interval::FourHours => 14_400_000,
            Interval::OneDay => 86_400_000,
        }
    }

    /// Number of bars spanning the given window of hours, rounded up.
    #[must_use]
    pub fn bars_per_hours(&self, hours: i64) -> i64 {
        let ms = hours * 3_600_000;
        (ms + self.duration_ms() - 1) / self.duration_ms()
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::FiveMinutes
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Interval::OneMinute),
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "1h" => Ok(Interval::OneHour),
            "4h" => Ok(Interval::FourHours),
            "1d" => Ok(Interval::OneDay),
            other => anyhow::bail!("unsupported interval: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_intervals() {
        assert_eq!("5m".parse::<Interval>().unwrap(), Interval::FiveMinutes);
        assert_eq!("1H".parse::<Interval>().unwrap(), Interval::OneHour);
        assert!("7m".parse::<Interval>().is_err());
    }

    #[test]
    fn bars_per_hours_rounds_up() {
        assert_eq!(Interval::FiveMinutes.bars_per_hours(1), 12);
        assert_eq!(Interval::OneHour.bars_per_hours(3), 3);
        assert_eq!(Interval::FifteenMinutes.bars_per_hours(1), 4);
    }
}
