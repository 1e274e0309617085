//! The cavity auto-setup sequence.
//!
//! [`SetupCavity::setup`] runs a fixed list of steps. Each optional step is gated by its
//! request flag PV, progress (0-100) and a status message are published as the sequence
//! advances, and the abort PV is polled at fixed checkpoints. The first failing step ends
//! the sequence: the failure is reported on the status PVs and nothing is retried or
//! rolled back.
use std::sync::Arc;
use std::time::Duration;

use super::constants::{
    AMPLITUDE_WALK_STEP_MV, RAMP_START_AMPLITUDE_MV, RF_MODE_POLL_INTERVAL_MS,
    SSA_CALIBRATION_ATTEMPTS,
};
use super::error::CavityError;
use super::linac::{Cavity, CavityControl, RfMode};
use super::pv::ProcessVariables;
use super::setup_object::SetupPvs;
use super::status::SetupStatus;

/// A cavity paired with its auto-setup PVs
#[derive(Debug)]
pub struct SetupCavity<C: CavityControl> {
    pub cavity: C,
    pub pvs: SetupPvs,
    rf_mode_poll_interval: Duration,
}

impl SetupCavity<Cavity> {
    /// Attach the auto-setup PVs found under the cavity's `AUTO:` prefix
    pub fn from_cavity(cavity: Cavity, backend: Arc<dyn ProcessVariables>) -> Self {
        let pvs = SetupPvs::new(&cavity.to_string(), &cavity.auto_pv_prefix(), backend);
        Self::new(cavity, pvs)
    }
}

impl<C: CavityControl> SetupCavity<C> {
    pub fn new(cavity: C, pvs: SetupPvs) -> Self {
        Self {
            cavity,
            pvs,
            rf_mode_poll_interval: Duration::from_millis(RF_MODE_POLL_INTERVAL_MS),
        }
    }

    /// Override how often the RF mode is polled while waiting for SELA
    pub fn with_rf_mode_poll_interval(mut self, interval: Duration) -> Self {
        self.rf_mode_poll_interval = interval;
        self
    }

    fn message(&self, message: &str) -> Result<(), CavityError> {
        Ok(self.pvs.set_status_message(message)?)
    }

    fn progress(&self, progress: f64) -> Result<(), CavityError> {
        Ok(self.pvs.set_progress(progress)?)
    }

    pub fn script_is_running(&self) -> Result<bool, CavityError> {
        Ok(self.pvs.script_is_running()?)
    }

    /// Store the current amplitude setpoint as the amplitude to ramp to
    pub fn capture_acon(&mut self) -> Result<(), CavityError> {
        let ades = self.cavity.ades()?;
        self.cavity.set_acon(ades)
    }

    pub fn clear_abort(&self) -> Result<(), CavityError> {
        Ok(self.pvs.clear_abort()?)
    }

    pub fn trigger_abort(&self) -> Result<(), CavityError> {
        Ok(self.pvs.trigger_abort()?)
    }

    /// Fail with an abort error if the operator asked to stop. The flag is cleared first.
    pub fn check_abort(&self) -> Result<(), CavityError> {
        if self.pvs.abort_requested()? {
            self.clear_abort()?;
            return Err(CavityError::Abort(format!(
                "Abort requested for {}",
                self.cavity
            )));
        }
        Ok(())
    }

    fn report_failure(&self, error: &CavityError) -> Result<(), CavityError> {
        self.pvs.set_status(SetupStatus::Error)?;
        self.clear_abort()?;
        self.message(&error.to_string())
    }

    /// Turn RF and then the SSA off.
    ///
    /// Only severity errors and aborts are reported on the status PVs; anything else is
    /// returned to the caller.
    pub fn shut_down(&mut self) -> Result<(), CavityError> {
        if self.script_is_running()? {
            return self.message(&format!("{} script already running", self.cavity));
        }

        self.clear_abort()?;

        match self.run_shut_down() {
            Err(e) if e.is_shutdown_fault() => self.report_failure(&e),
            result => result,
        }
    }

    fn run_shut_down(&mut self) -> Result<(), CavityError> {
        self.pvs.set_status(SetupStatus::Running)?;
        self.progress(0.0)?;
        self.message(&format!("Turning {} RF off", self.cavity))?;
        self.cavity.turn_off()?;
        self.progress(50.0)?;
        self.message(&format!("Turning {} SSA off", self.cavity))?;
        self.cavity.ssa_turn_off()?;
        self.progress(100.0)?;
        self.pvs.set_status(SetupStatus::Ready)?;
        self.message(&format!("{} RF and SSA off", self.cavity))
    }

    /// Run the full setup sequence.
    ///
    /// Every cavity fault is reported on the status PVs (status ERROR, abort cleared,
    /// message set to the error text) and `Ok` is returned. Only PV failures that are not
    /// a cavity fault come back as `Err`.
    pub fn setup(&mut self) -> Result<(), CavityError> {
        match self.run_setup() {
            Err(e) if e.is_setup_fault() => {
                spdlog::error!("{} setup failed: {e}", self.cavity);
                self.report_failure(&e)
            }
            result => result,
        }
    }

    fn run_setup(&mut self) -> Result<(), CavityError> {
        if self.script_is_running()? {
            return self.message(&format!("{} script already running", self.cavity));
        }

        if !self.cavity.is_online()? {
            self.message(&format!("{} not online, not setting up", self.cavity))?;
            self.pvs.set_status(SetupStatus::Error)?;
            return Ok(());
        }

        self.clear_abort()?;

        self.pvs.set_status(SetupStatus::Running)?;
        self.progress(0.0)?;

        // RF has to be off first: an interlock trip with RF requested on causes trouble
        self.message(&format!("Turning {} off before starting setup", self.cavity))?;
        self.cavity.turn_off()?;
        self.progress(5.0)?;

        self.message(&format!("Turning on {} SSA if not on already", self.cavity))?;
        self.cavity.ssa_turn_on()?;
        self.progress(10.0)?;

        self.message(&format!("Resetting {} interlocks", self.cavity))?;
        self.cavity.reset_interlocks()?;
        self.progress(15.0)?;

        self.request_ssa_cal()?;
        self.request_auto_tune()?;
        self.request_characterization()?;
        self.request_ramp()?;

        self.progress(100.0)?;
        self.pvs.set_status(SetupStatus::Ready)?;
        Ok(())
    }

    pub fn request_ssa_cal(&mut self) -> Result<(), CavityError> {
        if self.pvs.ssa_cal_requested()? {
            self.message(&format!("Running {} SSA Calibration", self.cavity))?;
            self.cavity.turn_off()?;
            self.cavity.zero_dac_amplitudes()?;
            self.progress(20.0)?;
            self.cavity.calibrate_ssa(SSA_CALIBRATION_ATTEMPTS)?;
            self.message(&format!("{} SSA Calibrated", self.cavity))?;
        }
        self.progress(25.0)?;
        self.check_abort()
    }

    pub fn request_auto_tune(&mut self) -> Result<(), CavityError> {
        if self.pvs.auto_tune_requested()? {
            self.message(&format!("Tuning {} to Resonance", self.cavity))?;
            self.cavity.move_to_resonance(false)?;
            self.message(&format!("{} Tuned to Resonance", self.cavity))?;
        }
        self.progress(50.0)?;
        self.check_abort()
    }

    pub fn request_characterization(&mut self) -> Result<(), CavityError> {
        if self.pvs.cav_char_requested()? {
            self.message(&format!("Running {} Cavity Characterization", self.cavity))?;
            self.cavity.characterize()?;
            self.progress(60.0)?;
            self.cavity.trigger_probe_q_calc()?;
            self.progress(70.0)?;
            self.message(&format!("{} Characterized", self.cavity))?;
        }
        self.progress(75.0)?;
        self.check_abort()
    }

    pub fn request_ramp(&mut self) -> Result<(), CavityError> {
        if !self.pvs.rf_ramp_requested()? {
            return Ok(());
        }

        let acon = self.cavity.acon()?;
        if acon <= 0.0 {
            return Err(CavityError::CavityFault(format!(
                "Cannot ramp {} to {acon:.1}",
                self.cavity
            )));
        }

        self.message(&format!(
            "Waiting for {} piezo to be in feedback mode",
            self.cavity
        ))?;
        self.cavity.enable_piezo_feedback()?;
        self.progress(80.0)?;

        if !self.cavity.is_on()? || self.cavity.rf_mode()? != RfMode::Selap {
            self.cavity.set_ades(RAMP_START_AMPLITUDE_MV.min(acon))?;
        }

        self.cavity.turn_on()?;
        self.progress(85.0)?;

        self.check_abort()?;

        self.message(&format!("Waiting for {} to be in SELA", self.cavity))?;
        self.cavity.set_rf_mode(RfMode::Sela)?;
        while self.cavity.rf_mode()? != RfMode::Sela {
            self.check_abort()?;
            std::thread::sleep(self.rf_mode_poll_interval);
        }

        self.message(&format!("Walking {} to {acon:.1}", self.cavity))?;
        self.cavity.walk_amp(acon, AMPLITUDE_WALK_STEP_MV)?;
        self.progress(90.0)?;

        self.message(&format!("Centering {} piezo", self.cavity))?;
        self.cavity.move_to_resonance(true)?;
        self.progress(95.0)?;

        self.message(&format!("Setting {} to SELAP", self.cavity))?;
        self.cavity.set_rf_mode(RfMode::Selap)?;

        self.message(&format!("{} Ramped Up to {acon:.1} MV", self.cavity))
    }
}
