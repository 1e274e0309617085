use std::path::PathBuf;
use thiserror::Error;

use super::pv::Severity;

#[derive(Debug, Clone, Error)]
pub enum PvError {
    #[error("PV {0} is not connected")]
    Disconnected(String),
    #[error("PV {0} has INVALID severity")]
    Invalid(String),
    #[error("Put to PV {0} rejected with severity {1:?}")]
    Severity(String, Severity),
    #[error("PV {0} holds {1}, which cannot be read as {2}")]
    WrongType(String, String, &'static str),
}

/// Faults raised while driving cavity hardware.
///
/// Each variant carries the human readable text that ends up in the status message PV.
/// `Channel` covers PV failures that are not one of the reportable kinds and is never
/// caught by the setup sequencer.
#[derive(Debug, Clone, Error)]
pub enum CavityError {
    #[error("{0}")]
    Stepper(String),
    #[error("{0}")]
    Detune(String),
    #[error("{0}")]
    SsaCalibration(String),
    #[error("{0}")]
    PvInvalid(String),
    #[error("{0}")]
    Quench(String),
    #[error("{0}")]
    QLoadedCalibration(String),
    #[error("{0}")]
    ScaleFactorCalibration(String),
    #[error("{0}")]
    SsaFault(String),
    #[error("{0}")]
    StepperAbort(String),
    #[error("{0}")]
    HwMode(String),
    #[error("{0}")]
    CavityFault(String),
    #[error("{0}")]
    Abort(String),
    #[error("{0}")]
    Severity(String),
    #[error("{0}")]
    Characterization(String),
    #[error("Cavity PV access failed: {0}")]
    Channel(PvError),
}

impl From<PvError> for CavityError {
    fn from(value: PvError) -> Self {
        match value {
            PvError::Invalid(_) => Self::PvInvalid(value.to_string()),
            PvError::Severity(_, _) => Self::Severity(value.to_string()),
            _ => Self::Channel(value),
        }
    }
}

impl CavityError {
    /// True for every fault kind the setup sequence reports to the status PVs
    pub fn is_setup_fault(&self) -> bool {
        !matches!(self, Self::Channel(_))
    }

    /// Shutdown only reports severity errors and operator aborts
    pub fn is_shutdown_fault(&self) -> bool {
        matches!(self, Self::Severity(_) | Self::Abort(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Unknown cryomodule {0}")]
    BadCryomodule(String),
    #[error("Cavity number {0} is out of range 1-8")]
    BadCavity(u8),
    #[error("RF state timeout {0} s is not a usable duration")]
    BadTimeout(f64),
}

#[derive(Debug, Error)]
pub enum FaultCodeError {
    #[error("Could not open fault code table because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Fault code table failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Fault code table failed to parse CSV: {0}")]
    ParsingError(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum DecaradError {
    #[error("Decarad needs to be 1 or 2, got {0}")]
    BadDecarad(u8),
    #[error("Decarad head number needs to be between 1 and 10, got {0}")]
    BadHead(usize),
    #[error("Decarad read failed: {0}")]
    PvError(#[from] PvError),
}

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("Launcher failed due to cavity error: {0}")]
    CavityError(#[from] CavityError),
    #[error("Launcher failed due to PV error: {0}")]
    PvError(#[from] PvError),
    #[error("Launcher failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}
