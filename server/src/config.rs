use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AGGREGATE_CACHE_TTL_SECS: i64 = 900; // 15 minutes
pub const DEFAULT_MAX_AGGREGATE_CACHE_ENTRIES: usize = 512;
pub const DEFAULT_COUNTRY_NAME: &str = "Uganda";
pub const DEFAULT_SEED_PATH: &str = "server/seed/sample.json";
pub const CRATE_SEED_PATH: &str = "./seed/sample.json";

pub const CACHE_EVICTION_INTERVAL_SECS: u64 = 60;
/// Boundaries never change while the process runs.
pub const BOUNDARY_CACHE_CONTROL: &str = "public, max-age=3600";
pub const DATA_CACHE_CONTROL: &str = "public, max-age=60";

pub fn server_port() -> u16 {
    std::env::var("SERVER_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SERVER_PORT)
}

/// `None` selects the in-memory seed dataset.
pub fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn seed_path() -> PathBuf {
    if let Some(path) = std::env::var("SEED_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
    {
        return PathBuf::from(path);
    }
    let workspace_path = PathBuf::from(DEFAULT_SEED_PATH);
    if workspace_path.exists() {
        return workspace_path;
    }
    PathBuf::from(CRATE_SEED_PATH)
}

pub fn db_max_connections() -> u32 {
    std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
}

pub fn query_timeout() -> Duration {
    std::env::var("QUERY_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS))
}

pub fn aggregate_cache_ttl_secs() -> i64 {
    std::env::var("AGGREGATE_CACHE_TTL_SECS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_AGGREGATE_CACHE_TTL_SECS)
}

pub fn max_aggregate_cache_entries() -> usize {
    std::env::var("MAX_AGGREGATE_CACHE_ENTRIES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_AGGREGATE_CACHE_ENTRIES)
}

pub fn country_name() -> String {
    std::env::var("COUNTRY_NAME")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_COUNTRY_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn numeric_settings_fall_back_on_invalid_values() {
        temp_env::with_vars(
            [
                ("DB_MAX_CONNECTIONS", Some("0")),
                ("QUERY_TIMEOUT_SECS", Some("soon")),
                ("AGGREGATE_CACHE_TTL_SECS", Some("-5")),
                ("MAX_AGGREGATE_CACHE_ENTRIES", None),
            ],
            || {
                assert_eq!(db_max_connections(), DEFAULT_DB_MAX_CONNECTIONS);
                assert_eq!(
                    query_timeout(),
                    Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS)
                );
                assert_eq!(aggregate_cache_ttl_secs(), DEFAULT_AGGREGATE_CACHE_TTL_SECS);
                assert_eq!(
                    max_aggregate_cache_entries(),
                    DEFAULT_MAX_AGGREGATE_CACHE_ENTRIES
                );
            },
        );
    }

    #[test]
    fn numeric_settings_read_valid_values() {
        temp_env::with_vars(
            [
                ("SERVER_PORT", Some("8088")),
                ("QUERY_TIMEOUT_SECS", Some("3")),
                ("MAX_AGGREGATE_CACHE_ENTRIES", Some("16")),
            ],
            || {
                assert_eq!(server_port(), 8088);
                assert_eq!(query_timeout(), Duration::from_secs(3));
                assert_eq!(max_aggregate_cache_entries(), 16);
            },
        );
    }

    #[test]
    fn blank_strings_count_as_unset() {
        temp_env::with_vars(
            [
                ("DATABASE_URL", Some("  ")),
                ("COUNTRY_NAME", Some("")),
                ("SEED_PATH", Some("/tmp/atlas-seed.json")),
            ],
            || {
                assert_eq!(database_url(), None);
                assert_eq!(country_name(), DEFAULT_COUNTRY_NAME);
                assert_eq!(seed_path(), std::path::PathBuf::from("/tmp/atlas-seed.json"));
            },
        );
    }
}
