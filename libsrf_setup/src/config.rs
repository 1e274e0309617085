use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::constants::{ALL_CRYOMODULES, CAVITIES_PER_CRYOMODULE, HARDWARE_POLL_INTERVAL_MS};
use super::error::ConfigError;
use super::linac::CavitySettings;

/// Structure representing the application configuration. Selects the cavity to operate and
/// the hardware tolerances used while driving it.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub cryomodule: String,
    pub cavity: u8,
    pub ssa_drive_max: f64,
    pub rf_state_timeout_s: f64,
    pub detune_tolerance_hz: f64,
    pub max_tune_iterations: u32,
    pub decarad_background: f64,
    pub fault_code_path: Option<PathBuf>,
    pub sim_online: bool,
    pub sim_acon: f64,
    pub sim_detune_hz: f64,
}

impl Default for Config {
    /// Generate a new Config object pointing at the first cavity of CM02
    fn default() -> Self {
        Self {
            cryomodule: String::from("02"),
            cavity: 1,
            ssa_drive_max: 0.8,
            rf_state_timeout_s: 30.0,
            detune_tolerance_hz: 50.0,
            max_tune_iterations: 20,
            decarad_background: 0.0,
            fault_code_path: None,
            sim_online: true,
            sim_acon: 16.0,
            sim_detune_hz: 2000.0,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check that the cryomodule and cavity exist and the timeout is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !ALL_CRYOMODULES.contains(&self.cryomodule.as_str()) {
            return Err(ConfigError::BadCryomodule(self.cryomodule.clone()));
        }
        if !(1..=CAVITIES_PER_CRYOMODULE).contains(&self.cavity) {
            return Err(ConfigError::BadCavity(self.cavity));
        }
        self.rf_state_timeout()?;
        Ok(())
    }

    fn rf_state_timeout(&self) -> Result<Duration, ConfigError> {
        if self.rf_state_timeout_s < 0.0 {
            return Err(ConfigError::BadTimeout(self.rf_state_timeout_s));
        }
        Duration::try_from_secs_f64(self.rf_state_timeout_s)
            .map_err(|_| ConfigError::BadTimeout(self.rf_state_timeout_s))
    }

    /// Hardware tolerances handed to each cavity
    pub fn cavity_settings(&self) -> Result<CavitySettings, ConfigError> {
        Ok(CavitySettings {
            ssa_drive_max: self.ssa_drive_max,
            rf_state_timeout: self.rf_state_timeout()?,
            detune_tolerance_hz: self.detune_tolerance_hz,
            max_tune_iterations: self.max_tune_iterations,
            poll_interval: Duration::from_millis(HARDWARE_POLL_INTERVAL_MS),
        })
    }
}
