use serde::Deserialize;
use std::{error::Error, fs};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommonConfig {
    pub project_name: String,
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcilerConfig {
    #[serde(default = "default_payment_sweep_interval_secs")]
    pub payment_sweep_interval_secs: u64,
    #[serde(default = "default_payment_deadline_mins")]
    pub payment_deadline_mins: i64,
    #[serde(default = "default_delivery_sweep_interval_secs")]
    pub delivery_sweep_interval_secs: u64,
    #[serde(default = "default_delivery_deadline_mins")]
    pub delivery_deadline_mins: i64,
    #[serde(default)]
    pub log_level: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            payment_sweep_interval_secs: default_payment_sweep_interval_secs(),
            payment_deadline_mins: default_payment_deadline_mins(),
            delivery_sweep_interval_secs: default_delivery_sweep_interval_secs(),
            delivery_deadline_mins: default_delivery_deadline_mins(),
            log_level: String::new(),
        }
    }
}

// Unpaid orders are cancelled 15 minutes after checkout; the sweep
// looking for them runs every minute. Stuck deliveries are closed an
// hour after dispatch by a once-a-day pass.
fn default_payment_sweep_interval_secs() -> u64 {
    60
}

fn default_payment_deadline_mins() -> i64 {
    15
}

fn default_delivery_sweep_interval_secs() -> u64 {
    86_400
}

fn default_delivery_deadline_mins() -> i64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub common: CommonConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let contents = fs::read_to_string(config_path)?;
        let config = serde_yml::from_str(&contents)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciler_defaults_match_operational_deadlines() {
        let config: ReconcilerConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config.payment_sweep_interval_secs, 60);
        assert_eq!(config.payment_deadline_mins, 15);
        assert_eq!(config.delivery_sweep_interval_secs, 86_400);
        assert_eq!(config.delivery_deadline_mins, 60);
    }

    #[test]
    fn config_parses_partial_yaml() {
        let yaml = r#"
common:
  project_name: takeout
  database_url: postgres://localhost/takeout
reconciler:
  payment_deadline_mins: 30
"#;
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.common.project_name, "takeout");
        assert_eq!(config.reconciler.payment_deadline_mins, 30);
        assert_eq!(config.reconciler.payment_sweep_interval_secs, 60);
    }
}
