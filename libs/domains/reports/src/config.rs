use chrono::Duration;
use chrono_tz::Tz;
use core_config::{ConfigError, FromEnv, env_optional, env_parse};

/// Scheduler, retention and fan-out settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Region in which cadences fire and windows are cut, DST included
    pub timezone: Tz,
    pub report_retention: Duration,
    pub event_retention: Duration,
    /// Upper bound on per-user reports in one fan-out run
    pub fanout_limit: usize,
    pub session_inactivity: Duration,
    /// A report still `generating` after this long is considered abandoned
    pub generation_timeout: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            report_retention: Duration::days(365),
            event_retention: Duration::days(730),
            fanout_limit: 100,
            session_inactivity: Duration::minutes(30),
            generation_timeout: Duration::minutes(60),
        }
    }
}

impl ReportConfig {
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_report_retention(mut self, retention: Duration) -> Self {
        self.report_retention = retention;
        self
    }

    pub fn with_event_retention(mut self, retention: Duration) -> Self {
        self.event_retention = retention;
        self
    }

    pub fn with_fanout_limit(mut self, limit: usize) -> Self {
        self.fanout_limit = limit;
        self
    }

    pub fn with_session_inactivity(mut self, inactivity: Duration) -> Self {
        self.session_inactivity = inactivity;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }
}

/// Parses an IANA zone name such as `Europe/Berlin`, or `UTC`
pub fn parse_timezone(raw: &str) -> Result<Tz, ConfigError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("utc") || raw.eq_ignore_ascii_case("z") {
        return Ok(Tz::UTC);
    }
    raw.parse::<Tz>().map_err(|_| ConfigError::ParseError {
        key: "REPORT_TIMEZONE".to_string(),
        details: format!("'{}' is not an IANA timezone like Europe/Berlin", raw),
    })
}

impl FromEnv for ReportConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timezone = match env_optional("REPORT_TIMEZONE") {
            Some(raw) => parse_timezone(&raw)?,
            None => defaults.timezone,
        };

        Ok(Self::default()
            .with_timezone(timezone)
            .with_report_retention(Duration::days(env_parse(
                "REPORT_RETENTION_DAYS",
                defaults.report_retention.num_days(),
            )?))
            .with_event_retention(Duration::days(env_parse(
                "EVENT_RETENTION_DAYS",
                defaults.event_retention.num_days(),
            )?))
            .with_fanout_limit(env_parse("REPORT_FANOUT_LIMIT", defaults.fanout_limit)?)
            .with_session_inactivity(Duration::minutes(env_parse(
                "SESSION_INACTIVITY_MINUTES",
                defaults.session_inactivity.num_minutes(),
            )?))
            .with_generation_timeout(Duration::minutes(env_parse(
                "REPORT_GENERATION_TIMEOUT_MINUTES",
                defaults.generation_timeout.num_minutes(),
            )?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "REPORT_TIMEZONE",
        "REPORT_RETENTION_DAYS",
        "EVENT_RETENTION_DAYS",
        "REPORT_FANOUT_LIMIT",
        "SESSION_INACTIVITY_MINUTES",
        "REPORT_GENERATION_TIMEOUT_MINUTES",
    ];

    #[test]
    fn test_defaults_when_unset() {
        temp_env::with_vars_unset(VARS, || {
            let config = ReportConfig::from_env().unwrap();
            assert_eq!(config, ReportConfig::default());
            assert_eq!(config.report_retention, Duration::days(365));
            assert_eq!(config.event_retention, Duration::days(730));
            assert_eq!(config.timezone, Tz::UTC);
            assert_eq!(config.generation_timeout, Duration::hours(1));
        });
    }

    #[test]
    fn test_reads_overrides() {
        temp_env::with_vars(
            [
                ("REPORT_TIMEZONE", Some("America/New_York")),
                ("REPORT_RETENTION_DAYS", Some("30")),
                ("EVENT_RETENTION_DAYS", Some("90")),
                ("REPORT_FANOUT_LIMIT", Some("5")),
                ("SESSION_INACTIVITY_MINUTES", Some("15")),
                ("REPORT_GENERATION_TIMEOUT_MINUTES", Some("20")),
            ],
            || {
                let config = ReportConfig::from_env().unwrap();
                assert_eq!(config.timezone, chrono_tz::America::New_York);
                assert_eq!(config.report_retention, Duration::days(30));
                assert_eq!(config.event_retention, Duration::days(90));
                assert_eq!(config.fanout_limit, 5);
                assert_eq!(config.session_inactivity, Duration::minutes(15));
                assert_eq!(config.generation_timeout, Duration::minutes(20));
            },
        );
    }

    #[test]
    fn test_timezone_names() {
        assert_eq!(parse_timezone("Europe/Berlin").unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(parse_timezone(" utc ").unwrap(), Tz::UTC);
        assert!(parse_timezone("+02:00").is_err());
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
    }
}
