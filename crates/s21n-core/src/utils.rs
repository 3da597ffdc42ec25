use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use chrono_tz::Tz;

use crate::{errors::Error, Result};

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs/settings).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

/// Human local timestamp for status messages.
pub fn human_timestamp(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ============== Timezones ==============

/// The zone notifications are rendered in: an IANA zone such as
/// `Europe/Moscow`, or a fixed offset such as `UTC+3`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timezone {
    Named(Tz),
    Fixed { seconds: i32 },
}

impl Timezone {
    pub const UTC: Timezone = Timezone::Named(Tz::UTC);

    /// Accepts IANA names (`Asia/Novosibirsk`) as well as `UTC`, `Z`,
    /// `UTC+3`, `UTC-04:30`, `+05:00`, `-2`.
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if let Ok(tz) = s.parse::<Tz>() {
            return Ok(Self::Named(tz));
        }

        let upper = s.to_ascii_uppercase();
        if matches!(upper.as_str(), "UTC" | "GMT" | "Z") {
            return Ok(Self::UTC);
        }

        let rest = upper
            .strip_prefix("UTC")
            .or_else(|| upper.strip_prefix("GMT"))
            .unwrap_or(&upper)
            .trim();

        let invalid = || Error::Config(format!("invalid timezone: {s}"));

        let (sign, digits) = match rest.chars().next() {
            Some('+') => (1, &rest[1..]),
            Some('-') => (-1, &rest[1..]),
            _ => return Err(invalid()),
        };

        let (hours, minutes) = match digits.split_once(':') {
            Some((h, m)) => (h, m),
            None => (digits, "0"),
        };
        let hours: i32 = hours.trim().parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.trim().parse().map_err(|_| invalid())?;
        if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
            return Err(invalid());
        }

        Ok(Self::Fixed {
            seconds: sign * (hours * 3600 + minutes * 60),
        })
    }

    /// Canonical label: the IANA name, or `UTC+3` / `UTC-4:30` for offsets.
    pub fn label(self) -> String {
        let seconds = match self {
            Self::Named(tz) => return tz.name().to_string(),
            Self::Fixed { seconds } => seconds,
        };
        if seconds == 0 {
            return "UTC".to_string();
        }
        let sign = if seconds < 0 { '-' } else { '+' };
        let abs = seconds.abs();
        let (h, m) = (abs / 3600, (abs % 3600) / 60);
        if m == 0 {
            format!("UTC{sign}{h}")
        } else {
            format!("UTC{sign}{h}:{m:02}")
        }
    }

    fn render(self, dt: DateTime<FixedOffset>) -> String {
        match self {
            Self::Named(tz) => dt
                .with_timezone(&tz)
                .format("%d.%m.%Y %H:%M (%Z)")
                .to_string(),
            Self::Fixed { seconds } => {
                let fixed = FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix());
                format!(
                    "{} ({})",
                    dt.with_timezone(&fixed).format("%d.%m.%Y %H:%M"),
                    self.label()
                )
            }
        }
    }
}

/// Render a platform UTC timestamp in the given zone.
///
/// Falls back to the raw string when it cannot be parsed.
pub fn format_local_time(raw: &str, tz: Timezone) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "unknown time".to_string();
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => tz.render(dt),
        Err(e) => {
            tracing::debug!("unparsable notification time {raw:?}: {e}");
            raw.replace('T', " ").replace('Z', " UTC")
        }
    }
}
