use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::discovery::PagingMode;
use crate::error::{AppError, AppResult};

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const DEFAULT_LOAD_MORE_INITIAL: usize = 9;
pub const DEFAULT_LOAD_MORE_STEP: usize = 6;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the hosted backend
#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` runs against the bundled demo listings
    pub supabase: Option<SupabaseConfig>,
    pub page_size: usize,
    pub paging: PagingMode,
    pub load_more_initial: usize,
    pub load_more_step: usize,
    pub toggle_timeout: Option<Duration>,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supabase: None,
            page_size: DEFAULT_PAGE_SIZE,
            paging: PagingMode::Server,
            load_more_initial: DEFAULT_LOAD_MORE_INITIAL,
            load_more_step: DEFAULT_LOAD_MORE_STEP,
            toggle_timeout: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let supabase = match get("SUPABASE_URL") {
            Some(url) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key: get("SUPABASE_ANON_KEY").ok_or_else(|| {
                    AppError::Config("SUPABASE_ANON_KEY is required when SUPABASE_URL is set".into())
                })?,
                access_token: get("SUPABASE_ACCESS_TOKEN"),
            }),
            None => None,
        };

        let page_size = parse_or(&get, "WATTSHARE_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(AppError::Config("WATTSHARE_PAGE_SIZE must be positive".into()));
        }

        let paging = match get("WATTSHARE_PAGING") {
            Some(raw) => raw.parse::<PagingMode>().map_err(AppError::Config)?,
            None => PagingMode::Server,
        };

        let load_more_initial = parse_or(&get, "WATTSHARE_LOAD_MORE_INITIAL", DEFAULT_LOAD_MORE_INITIAL)?;
        let load_more_step = parse_or(&get, "WATTSHARE_LOAD_MORE_STEP", DEFAULT_LOAD_MORE_STEP)?;

        let toggle_timeout = match get("WATTSHARE_TOGGLE_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_value("WATTSHARE_TOGGLE_TIMEOUT_SECS", &raw)?)),
            None => None,
        };
        let http_timeout = Duration::from_secs(parse_or(
            &get,
            "WATTSHARE_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);

        Ok(Config {
            supabase,
            page_size,
            paging,
            load_more_initial,
            load_more_step,
            toggle_timeout,
            http_timeout,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> AppResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} has invalid value '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.supabase.is_none());
        assert_eq!(config.page_size, 25);
        assert_eq!(config.paging, PagingMode::Server);
        assert_eq!(config.toggle_timeout, None);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_supabase_requires_anon_key() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_URL", "https://x.supabase.co")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://x.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        let supabase = config.supabase.unwrap();
        assert_eq!(supabase.url, "https://x.supabase.co");
        assert_eq!(supabase.access_token, None);
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = Config::from_lookup(lookup(&[
            ("WATTSHARE_PAGE_SIZE", "10"),
            ("WATTSHARE_PAGING", "load_more"),
            ("WATTSHARE_TOGGLE_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.paging, PagingMode::LoadMore);
        assert_eq!(config.toggle_timeout, Some(Duration::from_secs(5)));

        assert!(Config::from_lookup(lookup(&[("WATTSHARE_PAGE_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("WATTSHARE_PAGE_SIZE", "ten")])).is_err());
        assert!(Config::from_lookup(lookup(&[("WATTSHARE_PAGING", "sideways")])).is_err());
    }
}
