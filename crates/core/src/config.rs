use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparseable config value, using default");
                default
            }
        },
        None => default,
    }
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(raw) => {
            let raw = raw.trim().to_ascii_lowercase();
            raw.starts_with('y') || raw == "true" || raw == "1"
        }
        None => default,
    }
}

fn default_log_path() -> PathBuf { PathBuf::from("data/schedule.json") }
fn default_history_days() -> u32 { 7 }
fn default_poll_interval() -> u64 { 10 }
fn default_debounce() -> u64 { 500 }
fn default_watch_failure_limit() -> u32 { 3 }
fn default_record_run_events() -> bool { true }
fn default_max_clock_skew() -> u64 { 300 }

// ── Engine config ─────────────────────────────────────────────

/// Settings for the schedule engine, typically built from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    /// Location of the persisted schedule log.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// How far back history items (transmissions, missed windows) are surfaced.
    #[serde(default = "default_history_days")]
    pub history_days: u32,
    /// Fixed-rate reconciliation timer, also the watcher's polling fallback.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Quiet time that collapses a burst of log writes into one refresh.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    /// Consecutive failed accesses before the log is reported inaccessible.
    #[serde(default = "default_watch_failure_limit")]
    pub watch_failure_limit: u32,
    /// Persist `STARTED` and `MEASURED` lines in addition to schedules and transmissions.
    #[serde(default = "default_record_run_events")]
    pub record_run_events: bool,
    /// Device/wall clock disagreement above which a reading is flagged.
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            log_path: default_log_path(),
            history_days: default_history_days(),
            poll_interval_secs: default_poll_interval(),
            debounce_ms: default_debounce(),
            watch_failure_limit: default_watch_failure_limit(),
            record_run_events: default_record_run_events(),
            max_clock_skew_secs: default_max_clock_skew(),
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CADENCE_PROFILE`. When set (e.g. `WARD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_opt("CADENCE_PROFILE").unwrap_or_default().to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            log_path: profiled_env_opt(p, "CADENCE_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_log_path),
            history_days: profiled_env_parse(p, "CADENCE_HISTORY_DAYS", default_history_days()),
            poll_interval_secs: profiled_env_parse(p, "CADENCE_POLL_SECS", default_poll_interval()).max(1),
            debounce_ms: profiled_env_parse(p, "CADENCE_DEBOUNCE_MS", default_debounce()),
            watch_failure_limit: profiled_env_parse(
                p,
                "CADENCE_WATCH_FAILURE_LIMIT",
                default_watch_failure_limit(),
            )
            .max(1),
            record_run_events: profiled_env_bool(p, "CADENCE_RECORD_RUN_EVENTS", default_record_run_events()),
            max_clock_skew_secs: profiled_env_parse(p, "CADENCE_MAX_CLOCK_SKEW_SECS", default_max_clock_skew()),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn history_horizon(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.history_days))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_clock_skew_secs.min(i64::MAX as u64) as i64)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config loaded (profile: {}):", self.profile_label());
        tracing::info!("  log:         path={}", self.log_path.display());
        tracing::info!("  history:     days={}", self.history_days);
        tracing::info!("  timer:       poll={}s, debounce={}ms", self.poll_interval_secs, self.debounce_ms);
        tracing::info!("  watcher:     failure_limit={}", self.watch_failure_limit);
        tracing::info!("  runs:        record_run_events={}, max_clock_skew={}s", self.record_run_events, self.max_clock_skew_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.history_days, 7);
        assert_eq!(cfg.poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.debounce(), Duration::from_millis(500));
        assert!(cfg.record_run_events);
        assert_eq!(cfg.profile_label(), "default");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults_when_deserializing() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"history_days": 3}"#).unwrap();
        assert_eq!(cfg.history_days, 3);
        assert_eq!(cfg.poll_interval_secs, 10);
        assert_eq!(cfg.log_path, PathBuf::from("data/schedule.json"));
    }

    #[test]
    fn profiled_keys_take_precedence() {
        // Unique key names so parallel tests do not observe each other.
        env::set_var("CFGTEST_CADENCE_HISTORY_DAYS", "14");
        env::set_var("CADENCE_DEBOUNCE_MS", "250");
        env::set_var("CFGTEST_CADENCE_RECORD_RUN_EVENTS", "no");

        let cfg = EngineConfig::for_profile("cfgtest");
        assert_eq!(cfg.profile, "CFGTEST");
        assert_eq!(cfg.history_days, 14);
        assert_eq!(cfg.debounce_ms, 250);
        assert!(!cfg.record_run_events);

        env::remove_var("CFGTEST_CADENCE_HISTORY_DAYS");
        env::remove_var("CADENCE_DEBOUNCE_MS");
        env::remove_var("CFGTEST_CADENCE_RECORD_RUN_EVENTS");
    }
}
