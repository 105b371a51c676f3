pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Load and merge all config JSON files into a single [`EngineConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   engine.json
///   oracle.json
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                         | Config Field                     |
/// |---------------------------------|----------------------------------|
/// | `ENGINE_MIN_HEALTH_FACTOR`      | `engine.min_health_factor`       |
/// | `ENGINE_MAX_LEVERAGE`           | `engine.max_leverage`            |
/// | `ENGINE_SLIPPAGE_BUFFER_BPS`    | `engine.slippage_buffer_bps`     |
/// | `ENGINE_FEE_BPS`                | `engine.fee_bps`                 |
/// | `ORACLE_MAX_AGE_SECONDS`        | `oracle.default_max_age_seconds` |
pub fn load_config(config_dir: &Path) -> Result<EngineConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig = serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let engine: EngineFileConfig =
        serde_json::from_str(&read("engine.json")?).context("parsing engine.json")?;

    let oracle: OracleFileConfig =
        serde_json::from_str(&read("oracle.json")?).context("parsing oracle.json")?;

    let mut config = EngineConfig {
        app,
        engine,
        oracle,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides to the loaded config.
///
/// Only non-empty env vars take effect. Parse failures are skipped and the
/// JSON default remains.
fn apply_env_overrides(config: &mut EngineConfig) {
    if let Some(val) = env_decimal("ENGINE_MIN_HEALTH_FACTOR") {
        info!(%val, "env override: ENGINE_MIN_HEALTH_FACTOR");
        config.engine.min_health_factor = val;
    }

    if let Some(val) = env_decimal("ENGINE_MAX_LEVERAGE") {
        info!(%val, "env override: ENGINE_MAX_LEVERAGE");
        config.engine.max_leverage = val;
    }

    if let Some(val) = env_parse::<u32>("ENGINE_SLIPPAGE_BUFFER_BPS") {
        info!(val, "env override: ENGINE_SLIPPAGE_BUFFER_BPS");
        config.engine.slippage_buffer_bps = val;
    }

    if let Some(val) = env_parse::<u32>("ENGINE_FEE_BPS") {
        info!(val, "env override: ENGINE_FEE_BPS");
        config.engine.fee_bps = val;
    }

    if let Some(val) = env_parse::<u64>("ORACLE_MAX_AGE_SECONDS") {
        info!(val, "env override: ORACLE_MAX_AGE_SECONDS");
        config.oracle.default_max_age_seconds = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serial_test::serial;

    fn write_test_configs(dir: &Path) {
        std::fs::write(
            dir.join("app.json"),
            r#"{ "logging": { "log_dir": "logs" } }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("engine.json"),
            r#"{
                "min_health_factor": "1.05",
                "max_leverage": "5.0",
                "slippage_buffer_bps": 500,
                "fee_bps": 0,
                "approved_venues": []
            }"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("oracle.json"),
            r#"{
                "default_max_age_seconds": 3600,
                "sequencer_grace_period_seconds": 1800
            }"#,
        )
        .unwrap();
    }

    /// Remove all engine env vars so tests don't interfere with each other.
    fn clean_env() {
        for key in [
            "ENGINE_MIN_HEALTH_FACTOR",
            "ENGINE_MAX_LEVERAGE",
            "ENGINE_SLIPPAGE_BUFFER_BPS",
            "ENGINE_FEE_BPS",
            "ORACLE_MAX_AGE_SECONDS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_load_test_configs() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());
        let config = load_config(tmp.path()).expect("test config should load");
        assert_eq!(config.engine.min_health_factor, dec!(1.05));
        assert_eq!(config.engine.slippage_buffer_bps, 500);
        assert_eq!(config.oracle.default_max_age_seconds, 3600);
        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_config_file_errors() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config(tmp.path()).unwrap_err();
        assert!(
            err.to_string().contains("failed to read config file"),
            "expected file-not-found error, got: {err}"
        );
        clean_env();
    }

    #[test]
    #[serial]
    fn test_env_override_slippage_buffer() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("ENGINE_SLIPPAGE_BUFFER_BPS", "750");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.engine.slippage_buffer_bps, 750);
        clean_env();
    }

    #[test]
    #[serial]
    fn test_env_override_max_leverage() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("ENGINE_MAX_LEVERAGE", "4.5");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.engine.max_leverage, dec!(4.5));
        clean_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_string_ignored() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("ENGINE_FEE_BPS", "");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.engine.fee_bps, 0);
        clean_env();
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_parse_ignored() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("ORACLE_MAX_AGE_SECONDS", "not_a_number");
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.oracle.default_max_age_seconds, 3600);
        clean_env();
    }

    #[test]
    #[serial]
    fn test_validation_rejects_sub_one_health_factor() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());

        std::env::set_var("ENGINE_MIN_HEALTH_FACTOR", "0.9");
        let err = load_config(tmp.path()).unwrap_err();
        assert!(
            err.to_string().contains("min_health_factor"),
            "expected validation error, got: {err}"
        );
        clean_env();
    }

    #[test]
    #[serial]
    fn test_validation_rejects_bad_venue_address() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());
        std::fs::write(
            tmp.path().join("engine.json"),
            r#"{
                "min_health_factor": "1.05",
                "max_leverage": "5.0",
                "slippage_buffer_bps": 500,
                "fee_bps": 0,
                "approved_venues": ["not-an-address"]
            }"#,
        )
        .unwrap();
        let err = load_config(tmp.path()).unwrap_err();
        assert!(
            err.to_string().contains("approved venue"),
            "expected venue address error, got: {err}"
        );
        clean_env();
    }

    #[test]
    #[serial]
    fn test_settings_conversion() {
        clean_env();
        let tmp = tempfile::tempdir().unwrap();
        write_test_configs(tmp.path());
        std::fs::write(
            tmp.path().join("engine.json"),
            r#"{
                "min_health_factor": "1.05",
                "max_leverage": "5.0",
                "slippage_buffer_bps": 500,
                "fee_bps": 10,
                "approved_venues": ["0x111111125421cA6dc452d289314280a0f8842A65"]
            }"#,
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.approved_venues.len(), 1);
        assert_eq!(settings.max_leverage, dec!(5));
        clean_env();
    }
}
