use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use time::macros::{date, format_description};
use time::Date;

use crate::position::Position;

pub const DEFAULT_SEASON_START: Date = date!(2025 - 09 - 05);

/// Remote artifact store (a version-controlled file store behind the GitHub contents API).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub api_url: String,
    pub token: String,
    pub repo: String,
    pub branch: Option<String>,
    pub rankings_path: String,
    pub timestamp_path: String,
    pub backup_dir: String,
    pub max_backups: usize,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub position_urls: BTreeMap<Position, Vec<String>>,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub http_timeout: Duration,
    pub position_pause: Duration,
    pub run_deadline: Duration,
    pub sample_size: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            position_urls: BTreeMap::new(),
            browserless_url: None,
            browserless_token: None,
            http_timeout: Duration::from_secs(15),
            position_pause: Duration::from_millis(1000),
            run_deadline: Duration::from_secs(120),
            sample_size: 10,
        }
    }
}

impl ScrapeConfig {
    /// Candidate URLs for a position, in priority order. Empty when unconfigured.
    pub fn urls_for(&self, position: Position) -> &[String] {
        self.position_urls
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub cron: String,
    /// Eastern-time hours `[start, end)` during which scheduled runs proceed.
    pub active_hours: (u8, u8),
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: "0 */30 * * * *".to_string(),
            active_hours: (6, 18),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: Option<StoreConfig>,
    pub scrape: ScrapeConfig,
    pub schedule: ScheduleConfig,
    pub monitor_url: Option<String>,
    pub last_stored_timestamp: Option<String>,
    pub admin_secret: Option<String>,
    pub admin_bind: String,
    pub notify_webhook_url: Option<String>,
    pub season_start: Date,
    pub week_override: Option<u8>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parse_or = |key: &str, default: u64| {
            get(key)
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(default)
        };

        let store = match (get("GITHUB_TOKEN"), get("GITHUB_REPO")) {
            (Some(token), Some(repo)) => Some(StoreConfig {
                api_url: get("GITHUB_API_URL")
                    .unwrap_or_else(|| "https://api.github.com".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                token,
                repo,
                branch: get("GITHUB_BRANCH"),
                rankings_path: get("RANKINGS_PATH").unwrap_or_else(|| "rankings.json".to_string()),
                timestamp_path: get("TIMESTAMP_PATH")
                    .unwrap_or_else(|| "timestamp.json".to_string()),
                backup_dir: get("BACKUP_DIR")
                    .unwrap_or_else(|| "backups".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                max_backups: parse_or("MAX_BACKUPS", 30) as usize,
            }),
            _ => None,
        };

        let position_urls = Position::ALL
            .into_iter()
            .map(|position| {
                let urls = get(&position.env_var())
                    .map(|list| split_list(&list))
                    .unwrap_or_default();
                (position, urls)
            })
            .collect();

        let scrape = ScrapeConfig {
            position_urls,
            browserless_url: get("BROWSERLESS_URL"),
            browserless_token: get("BROWSERLESS_TOKEN"),
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 15)),
            position_pause: Duration::from_millis(parse_or("POSITION_PAUSE_MS", 1000)),
            run_deadline: Duration::from_secs(parse_or("SCRAPE_DEADLINE_SECS", 120)),
            // An empty sample would always read as unchanged.
            sample_size: parse_or("SAMPLE_SIZE", 10).max(1) as usize,
        };

        let schedule_defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            cron: get("SCHEDULE_CRON").unwrap_or(schedule_defaults.cron),
            active_hours: get("ACTIVE_HOURS")
                .and_then(|s| parse_hour_range(&s))
                .unwrap_or(schedule_defaults.active_hours),
        };

        let season_start = match get("SEASON_START") {
            Some(raw) => Date::parse(&raw, format_description!("[year]-[month]-[day]"))
                .with_context(|| format!("SEASON_START must be YYYY-MM-DD, got {}", raw))?,
            None => DEFAULT_SEASON_START,
        };

        Ok(Config {
            store,
            scrape,
            schedule,
            monitor_url: get("MONITOR_URL"),
            last_stored_timestamp: get("LAST_STORED_TIMESTAMP"),
            admin_secret: get("ADMIN_SECRET"),
            admin_bind: get("ADMIN_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            notify_webhook_url: get("NOTIFY_WEBHOOK_URL"),
            season_start,
            week_override: get("WEEK").and_then(|s| s.parse::<u8>().ok()),
        })
    }

    pub fn require_store(&self) -> Result<&StoreConfig> {
        self.store
            .as_ref()
            .context("GITHUB_TOKEN and GITHUB_REPO must be set")
    }

    pub fn require_admin_secret(&self) -> Result<&String> {
        self.admin_secret
            .as_ref()
            .context("ADMIN_SECRET must be set")
    }

    /// Total number of candidate URLs across all positions.
    pub fn total_urls(&self) -> usize {
        self.scrape.position_urls.values().map(Vec::len).sum()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_hour_range(raw: &str) -> Option<(u8, u8)> {
    let (start, end) = raw.split_once('-')?;
    let start: u8 = start.trim().parse().ok()?;
    let end: u8 = end.trim().parse().ok()?;
    (start < end && end <= 24).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]);
        assert!(config.store.is_none());
        assert!(config.monitor_url.is_none());
        assert_eq!(config.total_urls(), 0);
        assert_eq!(config.scrape.run_deadline, Duration::from_secs(120));
        assert_eq!(config.schedule.active_hours, (6, 18));
        assert_eq!(config.season_start, DEFAULT_SEASON_START);
        assert!(config.require_store().is_err());
    }

    #[test]
    fn splits_candidate_url_lists() {
        let config = config_from(&[
            ("FLEX_URLS", " https://a.example/x , ,https://b.example/y"),
            ("QB_URLS", ""),
        ]);
        assert_eq!(
            config.scrape.urls_for(Position::Flex),
            &["https://a.example/x".to_string(), "https://b.example/y".to_string()]
        );
        assert!(config.scrape.urls_for(Position::Qb).is_empty());
        assert_eq!(config.total_urls(), 2);
    }

    #[test]
    fn store_requires_token_and_repo() {
        let only_token = config_from(&[("GITHUB_TOKEN", "t")]);
        assert!(only_token.store.is_none());

        let config = config_from(&[
            ("GITHUB_TOKEN", "t"),
            ("GITHUB_REPO", "owner/site"),
            ("BACKUP_DIR", "archive/"),
            ("MAX_BACKUPS", "5"),
        ]);
        let store = config.require_store().unwrap();
        assert_eq!(store.repo, "owner/site");
        assert_eq!(store.rankings_path, "rankings.json");
        assert_eq!(store.backup_dir, "archive");
        assert_eq!(store.max_backups, 5);
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("HTTP_TIMEOUT_SECS", "soon"),
            ("ACTIVE_HOURS", "20-4"),
            ("WEEK", "3"),
        ]);
        assert_eq!(config.scrape.http_timeout, Duration::from_secs(15));
        assert_eq!(config.schedule.active_hours, (6, 18));
        assert_eq!(config.week_override, Some(3));
    }

    #[test]
    fn sample_size_is_at_least_one() {
        assert_eq!(config_from(&[("SAMPLE_SIZE", "0")]).scrape.sample_size, 1);
        assert_eq!(config_from(&[("SAMPLE_SIZE", "25")]).scrape.sample_size, 25);
    }

    #[test]
    fn rejects_malformed_season_start() {
        let result = Config::from_lookup(|key| {
            (key == "SEASON_START").then(|| "September 5th".to_string())
        });
        assert!(result.is_err());
    }
}
