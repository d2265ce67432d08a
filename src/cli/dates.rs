use std::fmt::Display;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use chrono_english::parse_date_string;
use clap::ValueEnum;

use crate::utils::time::local_instant;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct DayArgs {
    #[arg(
        long,
        short,
        help = "Day to look at, such as \"yesterday\" or \"15/03/2025\". Defaults to today"
    )]
    date: Option<String>,
    #[arg(
        long,
        default_value_t = DateStyle::Uk,
        help = "Date order used when parsing. Uk is day/month/year, Us is month/day/year"
    )]
    date_style: DateStyle,
}

impl DayArgs {
    pub fn resolve(&self, now: DateTime<Local>) -> Result<NaiveDate> {
        parse_day(self.date.as_deref(), self.date_style, now)
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct RangeArgs {
    #[arg(long, help = "First day of the range. Defaults to today")]
    from: Option<String>,
    #[arg(long, help = "Last day of the range. Defaults to the first day")]
    to: Option<String>,
    #[arg(
        long,
        default_value_t = DateStyle::Uk,
        help = "Date order used when parsing. Uk is day/month/year, Us is month/day/year"
    )]
    date_style: DateStyle,
}

impl RangeArgs {
    pub fn resolve(&self, now: DateTime<Local>) -> Result<(NaiveDate, NaiveDate)> {
        let from = parse_day(self.from.as_deref(), self.date_style, now)?;
        let to = match self.to.as_deref() {
            Some(to) => parse_day(Some(to), self.date_style, now)?,
            None => from,
        };
        if to < from {
            return Err(anyhow!("Range ends ({to}) before it starts ({from})"));
        }
        Ok((from, to))
    }
}

pub fn parse_day(input: Option<&str>, style: DateStyle, now: DateTime<Local>) -> Result<NaiveDate> {
    match input {
        Some(s) => parse_date_string(s, now, style.into())
            .map(|v| v.date_naive())
            .map_err(|e| anyhow!("Failed to validate date {s}: {e}")),
        None => Ok(now.date_naive()),
    }
}

/// Point in time such as "17/03/2025 09:30", "09:30 17/03/2025" or "tomorrow 9am". Explicit
/// dates are read with fixed formats first, chrono-english drops the date of "HH:MM DD/MM/YYYY".
pub fn parse_instant(input: &str, style: DateStyle, now: DateTime<Local>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Some(naive) = explicit_formats(style)
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
    {
        return local_instant(naive.date(), naive.time(), &Local)
            .ok_or_else(|| anyhow!("{input} doesn't exist in the local time zone"));
    }
    parse_date_string(input, now, style.into())
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| anyhow!("Failed to validate time {input}: {e}"))
}

fn explicit_formats(style: DateStyle) -> &'static [&'static str] {
    match style {
        DateStyle::Uk => &[
            "%d/%m/%Y %H:%M",
            "%H:%M %d/%m/%Y",
            "%Y-%m-%d %H:%M",
            "%Y-%m-%dT%H:%M",
        ],
        DateStyle::Us => &[
            "%m/%d/%Y %H:%M",
            "%H:%M %m/%d/%Y",
            "%Y-%m-%d %H:%M",
            "%Y-%m-%dT%H:%M",
        ],
    }
}
