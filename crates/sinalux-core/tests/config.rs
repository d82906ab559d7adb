use std::collections::HashMap;

use anyhow::Result;
use sinalux_core::config::{ConfigError, StoreConfig};
use sinalux_core::conformity::Evaluator;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |var| map.get(var).cloned()
}

#[test]
fn toml_fills_only_given_fields() -> Result<()> {
    let config = StoreConfig::from_toml_str(
        r#"
database_url = "sqlite://field.db"
timezone = "America/Manaus"
"#,
    )?;
    assert_eq!(config.database_url, "sqlite://field.db");
    assert_eq!(config.max_connections, 1);
    assert_eq!(config.initial_period_days, 15);
    assert_eq!(config.timezone()?, chrono_tz::America::Manaus);
    Ok(())
}

#[test]
fn environment_overrides_file_values() -> Result<()> {
    let mut config = StoreConfig::default();
    config.apply_env(env(&[
        ("DATABASE_URL", "sqlite://fallback.db"),
        ("SINALUX_DATABASE_URL", "sqlite://preferred.db"),
        ("SINALUX_BACKFILL_BATCH_SIZE", "50"),
    ]))?;
    assert_eq!(config.database_url, "sqlite://preferred.db");
    assert_eq!(config.backfill_batch_size, 50);

    let mut config = StoreConfig::default();
    config.apply_env(env(&[("DATABASE_URL", "sqlite://fallback.db")]))?;
    assert_eq!(config.database_url, "sqlite://fallback.db");
    Ok(())
}

#[test]
fn invalid_environment_values_are_errors() {
    let mut config = StoreConfig::default();
    let err = config
        .apply_env(env(&[("SINALUX_MAX_CONNECTIONS", "0")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnv { var: "SINALUX_MAX_CONNECTIONS", .. }));
}

#[test]
fn unknown_timezone_is_reported() {
    let config = StoreConfig {
        timezone: "Mars/Olympus".to_string(),
        ..StoreConfig::default()
    };
    assert!(matches!(config.timezone(), Err(ConfigError::UnknownTimezone(_))));
    assert!(Evaluator::from_config(&config).is_err());
}
