use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_logging;
pub use settings::{
    Config, ListenConfig, LoggingConfig, MqttConfig, OutputConfig, Reconciliation,
    SettlementMode, Simulation, UpstreamConfig,
};

/// Prefix for environment overrides, e.g. `QUANTLINK__UPSTREAM__TOKEN`.
pub const ENV_PREFIX: &str = "QUANTLINK";

/// Loads the application configuration.
///
/// Values come from the optional TOML file at `path`, overlaid by environment
/// variables with the `QUANTLINK` prefix and `__` as the section separator.
/// Anything not set falls back to the section defaults. The result is
/// validated before it is returned.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn loads_sections_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[upstream]
base_url = "https://broker.test"
token = "abc"

[reconciliation]
tolerance = 0.1

[listen]
max_seconds = 42
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.upstream.base_url, "https://broker.test");
        assert_eq!(config.upstream.token, "abc");
        assert_eq!(config.reconciliation.tolerance, dec!(0.1));
        assert_eq!(config.listen.max_seconds, 42);
        // Untouched sections keep their defaults.
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config("definitely-not-here.toml").unwrap();
        assert_eq!(config.simulation.capital, dec!(1000000));
    }
}
