use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::constants::{STATUS_ERROR_VALUE, STATUS_READY_VALUE, STATUS_RUNNING_VALUE};

/// State of an auto-setup script as published on its STATUS PV
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetupStatus {
    #[default]
    Ready,
    Running,
    Error,
}

impl SetupStatus {
    pub fn value(&self) -> i64 {
        match self {
            Self::Ready => STATUS_READY_VALUE,
            Self::Running => STATUS_RUNNING_VALUE,
            Self::Error => STATUS_ERROR_VALUE,
        }
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            STATUS_READY_VALUE => Some(Self::Ready),
            STATUS_RUNNING_VALUE => Some(Self::Running),
            STATUS_ERROR_VALUE => Some(Self::Error),
            _ => None,
        }
    }
}

impl Display for SetupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Which optional setup steps are requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFlags {
    pub ssa_cal: bool,
    pub auto_tune: bool,
    pub cav_char: bool,
    pub rf_ramp: bool,
}

impl RequestFlags {
    pub fn all() -> Self {
        Self {
            ssa_cal: true,
            auto_tune: true,
            cav_char: true,
            rf_ramp: true,
        }
    }
}

/// One reading of the status, progress and message PVs.
///
/// The three PVs are read one after the other, so a snapshot taken while a script runs
/// may mix values from different steps.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub status: Option<SetupStatus>,
    pub progress: f64,
    pub message: String,
}

impl StatusSnapshot {
    pub fn new(status: Option<SetupStatus>, progress: f64, message: String) -> Self {
        Self {
            status,
            progress,
            message,
        }
    }

    /// Progress as a fraction in [0, 1]
    pub fn fraction(&self) -> f32 {
        (self.progress / 100.0).clamp(0.0, 1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_values() {
        for status in [SetupStatus::Ready, SetupStatus::Running, SetupStatus::Error] {
            assert_eq!(SetupStatus::from_value(status.value()), Some(status));
        }
        assert_eq!(SetupStatus::from_value(7), None);
        assert_eq!(SetupStatus::Running.to_string(), "RUNNING");
    }

    #[test]
    fn test_fraction_clamped() {
        let snap = StatusSnapshot::new(Some(SetupStatus::Running), 150.0, String::new());
        assert_eq!(snap.fraction(), 1.0);
        let snap = StatusSnapshot::new(None, 25.0, String::new());
        assert_eq!(snap.fraction(), 0.25);
    }
}
