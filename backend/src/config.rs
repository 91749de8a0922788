use std::time::Duration;

use anyhow::Context;
use time::{format_description::FormatItem, macros::format_description, UtcOffset};

use crate::calendar::WeeklyOffs;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FaceProviderConfig {
    Mock,
    Http { url: String, api_key: Option<String> },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub listen_addr: String,
    pub cors_origins: Vec<String>,
    pub log_json: bool,
    /// Offset that defines the local calendar day.
    pub workday_offset: UtcOffset,
    pub face_provider: FaceProviderConfig,
    pub face_match_threshold: u8,
    pub notification_webhook_url: Option<String>,
    /// Per-request limit for the face provider and notification webhook.
    pub outbound_timeout: Duration,
    pub default_weekly_offs: WeeklyOffs,
}

const OFFSET_FORMAT: &[FormatItem<'static>] = format_description!("[offset_hour sign:mandatory]:[offset_minute]");

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn parse_offset(raw: &str) -> anyhow::Result<UtcOffset> {
    match raw.trim() {
        "Z" | "UTC" => Ok(UtcOffset::UTC),
        s => UtcOffset::parse(s, OFFSET_FORMAT).with_context(|| format!("invalid UTC offset {s:?}, expected e.g. +05:30")),
    }
}

pub fn parse_weekly_offs(raw: &str) -> anyhow::Result<WeeklyOffs> {
    let indices = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u8>().with_context(|| format!("invalid weekday index {s:?}")))
        .collect::<anyhow::Result<Vec<u8>>>()?;
    WeeklyOffs::from_indices(indices).map_err(|e| anyhow::anyhow!("weekday index {} out of range 0-6", e.0))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters for security");
        }
        if jwt_secret.contains("change_me") {
            anyhow::bail!("JWT_SECRET contains a placeholder value, set a real secret before running");
        }

        let face_provider = match var("FACE_PROVIDER").as_deref().unwrap_or("mock") {
            "mock" => FaceProviderConfig::Mock,
            "http" => FaceProviderConfig::Http {
                url: var("FACE_API_URL").context("FACE_API_URL must be set when FACE_PROVIDER=http")?,
                api_key: var("FACE_API_KEY"),
            },
            other => anyhow::bail!("unknown FACE_PROVIDER {other:?}, expected mock or http"),
        };

        let face_match_threshold: u8 = var("FACE_MATCH_THRESHOLD")
            .unwrap_or_else(|| "80".into())
            .parse()
            .context("FACE_MATCH_THRESHOLD must be a number")?;
        if face_match_threshold > 100 {
            anyhow::bail!("FACE_MATCH_THRESHOLD must be between 0 and 100");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret,
            listen_addr: var("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            cors_origins: var("CORS_ORIGINS")
                .unwrap_or_else(|| "http://localhost:5173".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            log_json: var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            workday_offset: parse_offset(&var("WORKDAY_UTC_OFFSET").unwrap_or_else(|| "+00:00".into()))?,
            face_provider,
            face_match_threshold,
            notification_webhook_url: var("NOTIFICATION_WEBHOOK_URL"),
            outbound_timeout: parse_timeout_secs(&var("OUTBOUND_TIMEOUT_SECS").unwrap_or_else(|| "5".into()))?,
            default_weekly_offs: parse_weekly_offs(&var("DEFAULT_WEEKLY_OFFS").unwrap_or_else(|| "0,6".into()))?,
        })
    }
}

fn parse_timeout_secs(raw: &str) -> anyhow::Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .context("OUTBOUND_TIMEOUT_SECS must be a whole number of seconds")?;
    if secs == 0 {
        anyhow::bail!("OUTBOUND_TIMEOUT_SECS must be at least 1");
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("+05:30").unwrap(), UtcOffset::from_hms(5, 30, 0).unwrap());
        assert_eq!(parse_offset("-03:00").unwrap(), UtcOffset::from_hms(-3, 0, 0).unwrap());
        assert_eq!(parse_offset("UTC").unwrap(), UtcOffset::UTC);
        assert!(parse_offset("5").is_err());
    }

    #[test]
    fn outbound_timeout() {
        assert_eq!(parse_timeout_secs("5").unwrap(), Duration::from_secs(5));
        assert!(parse_timeout_secs("0").is_err());
        assert!(parse_timeout_secs("soon").is_err());
    }

    #[test]
    fn weekly_offs() {
        assert_eq!(parse_weekly_offs("0,6").unwrap(), WeeklyOffs::WEEKEND);
        assert_eq!(parse_weekly_offs("").unwrap(), WeeklyOffs::NONE);
        assert!(parse_weekly_offs("7").is_err());
        assert!(parse_weekly_offs("sun").is_err());
    }
}
