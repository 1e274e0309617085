use std::sync::Arc;

use super::error::PvError;
use super::pv::{ProcessVariables, Pv};
use super::status::{RequestFlags, SetupStatus, StatusSnapshot};

/// The auto-setup PVs every setup-capable object (cavity or cryomodule) publishes.
///
/// `name` is only used in messages.
#[derive(Debug, Clone)]
pub struct SetupPvs {
    name: String,
    pub progress_pv: Pv,
    pub status_pv: Pv,
    pub status_msg_pv: Pv,
    pub note_pv: Pv,
    pub abort_pv: Pv,
    pub ssa_cal_requested_pv: Pv,
    pub auto_tune_requested_pv: Pv,
    pub cav_char_requested_pv: Pv,
    pub rf_ramp_requested_pv: Pv,
    pub start_pv: Pv,
    pub stop_pv: Pv,
}

impl SetupPvs {
    /// Build the PV group under `auto_prefix` (e.g. `ACCL:L1B:0210:AUTO:`)
    pub fn new(name: &str, auto_prefix: &str, backend: Arc<dyn ProcessVariables>) -> Self {
        let pv = |suffix: &str| Pv::new(format!("{auto_prefix}{suffix}"), backend.clone());
        Self {
            name: name.to_string(),
            progress_pv: pv("PROG"),
            status_pv: pv("STATUS"),
            status_msg_pv: pv("MSG"),
            note_pv: pv("NOTE"),
            abort_pv: pv("ABORT"),
            ssa_cal_requested_pv: pv("SETUP_SSAREQ"),
            auto_tune_requested_pv: pv("SETUP_TUNEREQ"),
            cav_char_requested_pv: pv("SETUP_CHARREQ"),
            rf_ramp_requested_pv: pv("SETUP_RAMPREQ"),
            start_pv: pv("SETUPSTRT"),
            stop_pv: pv("OFFSTRT"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw STATUS value; None if it is not a known status code
    pub fn status(&self) -> Result<Option<SetupStatus>, PvError> {
        Ok(SetupStatus::from_value(self.status_pv.get_i64()?))
    }

    pub fn set_status(&self, status: SetupStatus) -> Result<(), PvError> {
        self.status_pv.put(status.value())
    }

    pub fn script_is_running(&self) -> Result<bool, PvError> {
        Ok(self.status()? == Some(SetupStatus::Running))
    }

    pub fn progress(&self) -> Result<f64, PvError> {
        self.progress_pv.get_f64()
    }

    pub fn set_progress(&self, progress: f64) -> Result<(), PvError> {
        self.progress_pv.put(progress)
    }

    pub fn status_message(&self) -> Result<String, PvError> {
        self.status_msg_pv.get_string()
    }

    /// Publish a status message; it is echoed to the log as well
    pub fn set_status_message(&self, message: &str) -> Result<(), PvError> {
        spdlog::info!("{message}");
        self.status_msg_pv.put(message)
    }

    pub fn note(&self) -> Result<String, PvError> {
        self.note_pv.get_string()
    }

    pub fn set_note(&self, note: &str) -> Result<(), PvError> {
        self.note_pv.put(note)
    }

    pub fn snapshot(&self) -> Result<StatusSnapshot, PvError> {
        Ok(StatusSnapshot::new(
            self.status()?,
            self.progress()?,
            self.status_message()?,
        ))
    }

    pub fn abort_requested(&self) -> Result<bool, PvError> {
        self.abort_pv.get_bool()
    }

    pub fn clear_abort(&self) -> Result<(), PvError> {
        self.abort_pv.put(0)
    }

    /// Set the abort flag if a script is running, otherwise just say so
    pub fn trigger_abort(&self) -> Result<(), PvError> {
        if self.script_is_running()? {
            self.set_status_message(&format!("Requesting stop for {}", self.name))?;
            self.abort_pv.put(1)
        } else {
            self.set_status_message(&format!(
                "{} script not running, no abort needed",
                self.name
            ))
        }
    }

    pub fn ssa_cal_requested(&self) -> Result<bool, PvError> {
        self.ssa_cal_requested_pv.get_bool()
    }

    pub fn auto_tune_requested(&self) -> Result<bool, PvError> {
        self.auto_tune_requested_pv.get_bool()
    }

    pub fn cav_char_requested(&self) -> Result<bool, PvError> {
        self.cav_char_requested_pv.get_bool()
    }

    pub fn rf_ramp_requested(&self) -> Result<bool, PvError> {
        self.rf_ramp_requested_pv.get_bool()
    }

    pub fn requests(&self) -> Result<RequestFlags, PvError> {
        Ok(RequestFlags {
            ssa_cal: self.ssa_cal_requested()?,
            auto_tune: self.auto_tune_requested()?,
            cav_char: self.cav_char_requested()?,
            rf_ramp: self.rf_ramp_requested()?,
        })
    }

    pub fn set_requests(&self, requests: &RequestFlags) -> Result<(), PvError> {
        self.ssa_cal_requested_pv.put(requests.ssa_cal)?;
        self.auto_tune_requested_pv.put(requests.auto_tune)?;
        self.cav_char_requested_pv.put(requests.cav_char)?;
        self.rf_ramp_requested_pv.put(requests.rf_ramp)?;
        Ok(())
    }

    pub fn trigger_setup(&self) -> Result<(), PvError> {
        self.start_pv.put(1)
    }

    pub fn trigger_shutdown(&self) -> Result<(), PvError> {
        self.stop_pv.put(1)
    }

    pub fn setup_triggered(&self) -> Result<bool, PvError> {
        self.start_pv.get_bool()
    }

    pub fn shutdown_triggered(&self) -> Result<bool, PvError> {
        self.stop_pv.get_bool()
    }

    pub fn clear_setup_trigger(&self) -> Result<(), PvError> {
        self.start_pv.put(0)
    }

    pub fn clear_shutdown_trigger(&self) -> Result<(), PvError> {
        self.stop_pv.put(0)
    }
}
