//! 时间与时长解析
//!
//! 支持自动识别多种时间格式，无时区信息的格式按配置的默认时区解释。

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeDelta, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::{Result, TriggerError};

/// 表示"无期限"的时间字符串
pub const UNLIMITED: &str = "*unlimited";

/// 时间解析使用的时区
///
/// 接受 `Local`、`UTC`、固定偏移（`+02:00`）以及 IANA 时区名（`Europe/Berlin`）。
/// 只有 IANA 时区与 `Local` 会处理夏令时。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timezone {
    Utc,
    #[default]
    Local,
    Fixed(FixedOffset),
    Named(Tz),
}

impl FromStr for Timezone {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return Ok(Self::Utc);
        }
        if let Ok(offset) = s.parse::<FixedOffset>() {
            return Ok(Self::Fixed(offset));
        }
        s.parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| TriggerError::InvalidTimezone(s.to_string()))
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utc => f.write_str("UTC"),
            Self::Local => f.write_str("Local"),
            Self::Fixed(offset) => write!(f, "{}", offset),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl Timezone {
    /// 把本地时间解释为该时区下的时刻
    pub fn localize(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>> {
        let resolved = match self {
            Self::Utc => Some(naive.and_utc()),
            Self::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
            Self::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|t| t.with_timezone(&Utc)),
            // 夏令时回拨的重叠时段取较早的时刻，跳过的时段不存在
            Self::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
        };
        resolved.ok_or_else(|| TriggerError::TimeParse(format!("{} 在时区 {} 中不存在", naive, self)))
    }

    /// 把时刻转换为该时区下的本地时间
    pub fn to_local(&self, t: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Utc => t.naive_utc(),
            Self::Local => t.with_timezone(&Local).naive_local(),
            Self::Fixed(offset) => t.with_timezone(offset).naive_local(),
            Self::Named(tz) => t.with_timezone(tz).naive_local(),
        }
    }
}

const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

/// 自动识别格式并解析时间
///
/// 返回 `None` 表示无期限（空串或 `*unlimited`）。
pub fn parse_time_detect_layout(
    s: &str,
    tz: &Timezone,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let s = s.trim();
    match s {
        "" | UNLIMITED => return Ok(None),
        "*now" => return Ok(Some(now)),
        "*daily" => return add_months_local(now, tz, 0, 1).map(Some),
        "*monthly" => return add_months_local(now, tz, 1, 0).map(Some),
        "*yearly" => return add_months_local(now, tz, 12, 0).map(Some),
        "*month_end" => return month_end(now, tz).map(Some),
        _ => {}
    }

    if let Some(rest) = s.strip_prefix('+') {
        let offset = parse_duration(rest)?;
        let delta = TimeDelta::from_std(offset)
            .map_err(|_| TriggerError::TimeParse(format!("时长溢出: {}", s)))?;
        return now
            .checked_add_signed(delta)
            .map(Some)
            .ok_or_else(|| TriggerError::TimeParse(format!("时间溢出: {}", s)));
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(t.with_timezone(&Utc)));
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        if s.len() == 14 {
            // YYYYMMDDHHMMSS
            let spaced = format!(
                "{}-{}-{} {}:{}:{}",
                &s[0..4],
                &s[4..6],
                &s[6..8],
                &s[8..10],
                &s[10..12],
                &s[12..14]
            );
            let naive = NaiveDateTime::parse_from_str(&spaced, "%Y-%m-%d %H:%M:%S")
                .map_err(|_| TriggerError::TimeParse(s.to_string()))?;
            return tz.localize(naive).map(Some);
        }
        let secs: i64 = s
            .parse()
            .map_err(|_| TriggerError::TimeParse(s.to_string()))?;
        return DateTime::from_timestamp(secs, 0)
            .map(Some)
            .ok_or_else(|| TriggerError::TimeParse(s.to_string()));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, layout) {
            return tz.localize(naive).map(Some);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return tz.localize(date.and_time(NaiveTime::MIN)).map(Some);
    }

    Err(TriggerError::TimeParse(format!("无法识别的时间格式: {}", s)))
}

fn add_months_local(now: DateTime<Utc>, tz: &Timezone, months: u32, days: u64) -> Result<DateTime<Utc>> {
    let local = tz.to_local(now);
    let shifted = local
        .checked_add_months(Months::new(months))
        .and_then(|t| t.checked_add_days(Days::new(days)))
        .ok_or_else(|| TriggerError::TimeParse("日期溢出".to_string()))?;
    tz.localize(shifted)
}

/// 当月最后一秒
fn month_end(now: DateTime<Utc>, tz: &Timezone) -> Result<DateTime<Utc>> {
    let local = tz.to_local(now).date();
    let last_second = NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .and_then(|t| t.checked_sub_signed(TimeDelta::seconds(1)))
        .ok_or_else(|| TriggerError::TimeParse("日期溢出".to_string()))?;
    tz.localize(last_second)
}

/// 解析 `1h30m`、`1.5s`、`250ms` 风格的时长
///
/// 纯数字按纳秒处理。
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || TriggerError::TimeParse(format!("无效的时长: {}", s));
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<u64>().map(Duration::from_nanos).map_err(|_| invalid());
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if num_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..num_len].parse().map_err(|_| invalid())?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// 时长的序列化：写出为纳秒整数，读入时同时接受整数和 `1h30m` 风格字符串
pub mod duration_serde {
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("nanoseconds or a duration string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_nanos(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_nanos)
                    .map_err(|_| E::custom("negative duration"))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Duration, E> {
                if v < 0.0 || !v.is_finite() {
                    return Err(E::custom("invalid duration"));
                }
                Ok(Duration::from_nanos(v as u64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                super::parse_duration(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
