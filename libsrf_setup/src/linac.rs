//! Cavity hardware objects.
//!
//! A [`Cavity`] owns the PVs of one superconducting cavity and of the devices attached to
//! it: the solid-state amplifier ([`Ssa`]), the tuner ([`Piezo`] and [`Stepper`]) and the
//! two RF stations of its rack. The setup sequencer only sees the [`CavityControl`] trait.
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::constants::*;
use super::error::{CavityError, ConfigError, PvError};
use super::pv::{ProcessVariables, Pv, PvValue};

/// Get the linac section a cryomodule sits in
pub fn linac_for_cryomodule(cryomodule: &str) -> Result<&'static str, ConfigError> {
    match cryomodule {
        "01" => Ok("L0B"),
        "02" | "03" | "H1" | "H2" => Ok("L1B"),
        _ => match cryomodule.parse::<u8>() {
            Ok(4..=15) => Ok("L2B"),
            Ok(16..=35) => Ok("L3B"),
            _ => Err(ConfigError::BadCryomodule(cryomodule.to_string())),
        },
    }
}

/// PV prefix shared by every PV of a cryomodule (as opposed to one of its cavities)
pub fn cryomodule_pv_prefix(cryomodule: &str) -> Result<String, ConfigError> {
    let linac = linac_for_cryomodule(cryomodule)?;
    Ok(format!("ACCL:{linac}:{cryomodule}00:"))
}

/// RF control loop modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfMode {
    Selap,
    Sela,
    Sel,
    SelRaw,
    Pulse,
    Chirp,
}

impl RfMode {
    pub fn value(&self) -> i64 {
        match self {
            Self::Selap => 0,
            Self::Sela => 1,
            Self::Sel => 2,
            Self::SelRaw => 3,
            Self::Pulse => 4,
            Self::Chirp => 5,
        }
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Selap),
            1 => Some(Self::Sela),
            2 => Some(Self::Sel),
            3 => Some(Self::SelRaw),
            4 => Some(Self::Pulse),
            5 => Some(Self::Chirp),
            _ => None,
        }
    }
}

impl Display for RfMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Selap => "SELAP",
            Self::Sela => "SELA",
            Self::Sel => "SEL",
            Self::SelRaw => "SEL Raw",
            Self::Pulse => "Pulse",
            Self::Chirp => "Chirp",
        };
        write!(f, "{name}")
    }
}

/// Tolerances and timing used while driving the hardware
#[derive(Debug, Clone)]
pub struct CavitySettings {
    pub ssa_drive_max: f64,
    pub rf_state_timeout: Duration,
    pub detune_tolerance_hz: f64,
    pub max_tune_iterations: u32,
    pub poll_interval: Duration,
}

/// The hardware operations the setup sequence needs from a cavity.
///
/// Every operation blocks until the hardware reports it is done (or fails).
pub trait CavityControl: Display {
    fn is_online(&self) -> Result<bool, CavityError>;
    fn is_on(&self) -> Result<bool, CavityError>;
    fn rf_mode(&self) -> Result<RfMode, CavityError>;
    fn acon(&self) -> Result<f64, CavityError>;
    fn set_acon(&mut self, amplitude: f64) -> Result<(), CavityError>;
    fn ades(&self) -> Result<f64, CavityError>;
    fn set_ades(&mut self, amplitude: f64) -> Result<(), CavityError>;
    fn turn_on(&mut self) -> Result<(), CavityError>;
    fn turn_off(&mut self) -> Result<(), CavityError>;
    fn ssa_turn_on(&mut self) -> Result<(), CavityError>;
    fn ssa_turn_off(&mut self) -> Result<(), CavityError>;
    fn reset_interlocks(&mut self) -> Result<(), CavityError>;
    /// Zero the DAC amplitude of both RF stations in the rack
    fn zero_dac_amplitudes(&mut self) -> Result<(), CavityError>;
    fn calibrate_ssa(&mut self, attempts: u32) -> Result<(), CavityError>;
    fn move_to_resonance(&mut self, use_sela: bool) -> Result<(), CavityError>;
    fn characterize(&mut self) -> Result<(), CavityError>;
    fn trigger_probe_q_calc(&mut self) -> Result<(), CavityError>;
    fn enable_piezo_feedback(&mut self) -> Result<(), CavityError>;
    fn set_rf_mode(&mut self, mode: RfMode) -> Result<(), CavityError>;
    fn walk_amp(&mut self, target: f64, step: f64) -> Result<(), CavityError>;
}

/// Poll `pv` until `done` accepts its value or `timeout` passes.
/// Returns false on timeout.
fn wait_for<F>(pv: &Pv, timeout: Duration, poll: Duration, done: F) -> Result<bool, PvError>
where
    F: Fn(&PvValue) -> bool,
{
    let start = Instant::now();
    loop {
        if done(&pv.get()?) {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            return Ok(false);
        }
        std::thread::sleep(poll);
    }
}

fn pv_equals(expected: i64) -> impl Fn(&PvValue) -> bool {
    move |value| value.as_i64() == Some(expected)
}

/// Solid-state amplifier
#[derive(Debug, Clone)]
pub struct Ssa {
    name: String,
    pub power_on_pv: Pv,
    pub power_off_pv: Pv,
    pub status_pv: Pv,
    pub calibration_start_pv: Pv,
    pub calibration_status_pv: Pv,
    pub calibration_result_pv: Pv,
    pub drive_max_pv: Pv,
}

impl Ssa {
    fn new(cavity_name: &str, prefix: &str, backend: &Arc<dyn ProcessVariables>) -> Self {
        let pv = |suffix: &str| Pv::new(format!("{prefix}{suffix}"), backend.clone());
        Self {
            name: format!("{cavity_name} SSA"),
            power_on_pv: pv("PWRON"),
            power_off_pv: pv("PWROFF"),
            status_pv: pv("STATUS_RBV"),
            calibration_start_pv: pv("CALSTRT"),
            calibration_status_pv: pv("CALSTS"),
            calibration_result_pv: pv("CALSTAT"),
            drive_max_pv: pv("DRV_MAX_REQ"),
        }
    }

    pub fn status(&self) -> Result<String, PvError> {
        self.status_pv.get_string()
    }

    pub fn is_on(&self) -> Result<bool, PvError> {
        Ok(self.status()? == SSA_STATUS_ON_VALUE)
    }

    fn set_power(&self, on: bool, settings: &CavitySettings) -> Result<(), CavityError> {
        let (target, control) = if on {
            (SSA_STATUS_ON_VALUE, &self.power_on_pv)
        } else {
            (SSA_STATUS_OFF_VALUE, &self.power_off_pv)
        };
        let status = self.status()?;
        if status == target {
            return Ok(());
        }
        if on && status == SSA_STATUS_FAULTED_VALUE {
            return Err(CavityError::SsaFault(format!("{} is faulted", self.name)));
        }
        control.put(1)?;
        let reached = wait_for(
            &self.status_pv,
            settings.rf_state_timeout,
            settings.poll_interval,
            |v| v.as_string() == target,
        )?;
        if !reached {
            return Err(CavityError::SsaFault(format!(
                "{} did not reach {target}",
                self.name
            )));
        }
        Ok(())
    }

    /// Run the SSA calibration up to `attempts` times
    fn calibrate(
        &self,
        drive_max: f64,
        attempts: u32,
        settings: &CavitySettings,
    ) -> Result<(), CavityError> {
        for attempt in 1..=attempts {
            spdlog::info!("{} calibration attempt {attempt} of {attempts}", self.name);
            self.drive_max_pv.put(drive_max)?;
            self.calibration_start_pv.put(1)?;
            let finished = wait_for(
                &self.calibration_status_pv,
                settings.rf_state_timeout,
                settings.poll_interval,
                pv_equals(CALIBRATION_COMPLETE_VALUE),
            )?;
            if finished && self.calibration_result_pv.get_i64()? == CALIBRATION_RESULT_SUCCESS {
                return Ok(());
            }
            spdlog::warn!("{} calibration attempt {attempt} failed", self.name);
        }
        Err(CavityError::SsaCalibration(format!(
            "{} failed to calibrate after {attempts} attempts",
            self.name
        )))
    }
}

impl Display for Ssa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Piezo tuner
#[derive(Debug, Clone)]
pub struct Piezo {
    name: String,
    pub mode_control_pv: Pv,
    pub mode_status_pv: Pv,
}

impl Piezo {
    fn new(cavity_name: &str, prefix: &str, backend: &Arc<dyn ProcessVariables>) -> Self {
        Self {
            name: format!("{cavity_name} Piezo"),
            mode_control_pv: Pv::new(format!("{prefix}MODECTRL"), backend.clone()),
            mode_status_pv: Pv::new(format!("{prefix}MODESTAT"), backend.clone()),
        }
    }

    pub fn in_feedback(&self) -> Result<bool, PvError> {
        Ok(self.mode_status_pv.get_i64()? == PIEZO_FEEDBACK_VALUE)
    }

    fn enable_feedback(&self, settings: &CavitySettings) -> Result<(), CavityError> {
        if self.in_feedback()? {
            return Ok(());
        }
        self.mode_control_pv.put(PIEZO_FEEDBACK_VALUE)?;
        let reached = wait_for(
            &self.mode_status_pv,
            settings.rf_state_timeout,
            settings.poll_interval,
            pv_equals(PIEZO_FEEDBACK_VALUE),
        )?;
        if !reached {
            return Err(CavityError::CavityFault(format!(
                "{} did not enter feedback mode",
                self.name
            )));
        }
        Ok(())
    }
}

impl Display for Piezo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Stepper motor tuner
#[derive(Debug, Clone)]
pub struct Stepper {
    name: String,
    pub steps_pv: Pv,
    pub move_positive_pv: Pv,
    pub move_negative_pv: Pv,
    pub abort_pv: Pv,
    pub fault_pv: Pv,
}

impl Stepper {
    fn new(cavity_name: &str, prefix: &str, backend: &Arc<dyn ProcessVariables>) -> Self {
        let pv = |suffix: &str| Pv::new(format!("{prefix}{suffix}"), backend.clone());
        Self {
            name: format!("{cavity_name} Stepper"),
            steps_pv: pv("NSTEPS"),
            move_positive_pv: pv("MOV_REQ_POS"),
            move_negative_pv: pv("MOV_REQ_NEG"),
            abort_pv: pv("ABORT_REQ"),
            fault_pv: pv("FAULT"),
        }
    }

    fn check_ready(&self) -> Result<(), CavityError> {
        if self.abort_pv.get_bool()? {
            return Err(CavityError::StepperAbort(format!(
                "Abort requested for {}",
                self.name
            )));
        }
        if self.fault_pv.get_bool()? {
            return Err(CavityError::Stepper(format!("{} is faulted", self.name)));
        }
        Ok(())
    }

    fn step(&self, steps: i64) -> Result<(), CavityError> {
        self.check_ready()?;
        self.steps_pv.put(steps.abs())?;
        if steps >= 0 {
            self.move_positive_pv.put(1)?;
        } else {
            self.move_negative_pv.put(1)?;
        }
        Ok(())
    }
}

/// One RF station (two per rack)
#[derive(Debug, Clone)]
pub struct RfStation {
    pub dac_amp_pv: Pv,
}

/// Rack A holds cavities 1-4, rack B holds cavities 5-8
#[derive(Debug, Clone)]
pub struct Rack {
    pub name: char,
    pub rfs1: RfStation,
    pub rfs2: RfStation,
}

impl Rack {
    fn new(cavity_number: u8, cm_prefix: &str, backend: &Arc<dyn ProcessVariables>) -> Self {
        let name = if cavity_number <= 4 { 'A' } else { 'B' };
        let station = |n: u8| RfStation {
            dac_amp_pv: Pv::new(format!("{cm_prefix}RFS{n}{name}:DAC_AMPLTD"), backend.clone()),
        };
        Self {
            name,
            rfs1: station(1),
            rfs2: station(2),
        }
    }
}

/// A superconducting cavity and its PVs
#[derive(Debug, Clone)]
pub struct Cavity {
    pub cryomodule: String,
    pub number: u8,
    pv_prefix: String,
    settings: CavitySettings,
    pub ssa: Ssa,
    pub piezo: Piezo,
    pub stepper: Stepper,
    pub rack: Rack,
    pub hw_mode_pv: Pv,
    pub rf_control_pv: Pv,
    pub rf_state_pv: Pv,
    pub rf_mode_control_pv: Pv,
    pub rf_mode_pv: Pv,
    pub ades_pv: Pv,
    pub acon_pv: Pv,
    pub amean_pv: Pv,
    pub quench_latch_pv: Pv,
    pub interlock_reset_pv: Pv,
    pub probe_cal_start_pv: Pv,
    pub probe_cal_status_pv: Pv,
    pub probe_cal_result_pv: Pv,
    pub loaded_q_pv: Pv,
    pub scale_factor_pv: Pv,
    pub calc_probe_q_pv: Pv,
    pub detune_best_pv: Pv,
    pub detune_sela_pv: Pv,
}

impl Cavity {
    /// Create the cavity `number` (1-8) of `cryomodule`
    pub fn new(
        cryomodule: &str,
        number: u8,
        backend: Arc<dyn ProcessVariables>,
        settings: CavitySettings,
    ) -> Result<Self, ConfigError> {
        if !(1..=CAVITIES_PER_CRYOMODULE).contains(&number) {
            return Err(ConfigError::BadCavity(number));
        }
        let linac = linac_for_cryomodule(cryomodule)?;
        let cm_prefix = cryomodule_pv_prefix(cryomodule)?;
        let prefix = format!("ACCL:{linac}:{cryomodule}{number}0:");
        let name = format!("CM{cryomodule} Cavity {number}");
        let pv = |suffix: &str| Pv::new(format!("{prefix}{suffix}"), backend.clone());

        Ok(Self {
            cryomodule: cryomodule.to_string(),
            number,
            ssa: Ssa::new(&name, &format!("{prefix}SSA:"), &backend),
            piezo: Piezo::new(&name, &format!("{prefix}PZT:"), &backend),
            stepper: Stepper::new(&name, &format!("{prefix}STEP:"), &backend),
            rack: Rack::new(number, &cm_prefix, &backend),
            hw_mode_pv: pv("HWMODE"),
            rf_control_pv: pv("RFCTRL"),
            rf_state_pv: pv("RFSTATE"),
            rf_mode_control_pv: pv("RFMODECTRL"),
            rf_mode_pv: pv("RFMODE"),
            ades_pv: pv("ADES"),
            acon_pv: pv("ACON"),
            amean_pv: pv("AACTMEAN"),
            quench_latch_pv: pv("QUENCH_LTCH"),
            interlock_reset_pv: pv("INTLK_RESET_ALL"),
            probe_cal_start_pv: pv("PROBECALSTRT"),
            probe_cal_status_pv: pv("PROBECALSTS"),
            probe_cal_result_pv: pv("PROBECALSTAT"),
            loaded_q_pv: pv("QLOADED"),
            scale_factor_pv: pv("CAV:SCALE"),
            calc_probe_q_pv: pv("QPROBE_CALC1"),
            detune_best_pv: pv("DFBEST"),
            detune_sela_pv: pv("DF"),
            pv_prefix: prefix,
            settings,
        })
    }

    pub fn pv_prefix(&self) -> &str {
        &self.pv_prefix
    }

    /// Prefix of the auto-setup PVs of this cavity
    pub fn auto_pv_prefix(&self) -> String {
        format!("{}AUTO:", self.pv_prefix)
    }

    fn set_rf_state(&self, on: bool) -> Result<(), CavityError> {
        let target = if on { RF_STATE_ON } else { RF_STATE_OFF };
        self.rf_control_pv.put(target)?;
        let reached = wait_for(
            &self.rf_state_pv,
            self.settings.rf_state_timeout,
            self.settings.poll_interval,
            pv_equals(target),
        )?;
        if !reached {
            return Err(CavityError::CavityFault(format!(
                "{self} RF did not turn {}",
                if on { "on" } else { "off" }
            )));
        }
        Ok(())
    }

    fn check_quench(&self) -> Result<(), CavityError> {
        if self.quench_latch_pv.get_bool()? {
            return Err(CavityError::Quench(format!("{self} quenched")));
        }
        Ok(())
    }
}

impl Display for Cavity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CM{} Cavity {}", self.cryomodule, self.number)
    }
}

impl CavityControl for Cavity {
    fn is_online(&self) -> Result<bool, CavityError> {
        Ok(self.hw_mode_pv.get_i64()? == HW_MODE_ONLINE_VALUE)
    }

    fn is_on(&self) -> Result<bool, CavityError> {
        Ok(self.rf_state_pv.get_i64()? == RF_STATE_ON)
    }

    fn rf_mode(&self) -> Result<RfMode, CavityError> {
        let value = self.rf_mode_pv.get_i64()?;
        RfMode::from_value(value).ok_or_else(|| {
            CavityError::CavityFault(format!("{self} reports unknown RF mode {value}"))
        })
    }

    fn acon(&self) -> Result<f64, CavityError> {
        Ok(self.acon_pv.get_f64()?)
    }

    fn set_acon(&mut self, amplitude: f64) -> Result<(), CavityError> {
        Ok(self.acon_pv.put(amplitude)?)
    }

    fn ades(&self) -> Result<f64, CavityError> {
        Ok(self.ades_pv.get_f64()?)
    }

    fn set_ades(&mut self, amplitude: f64) -> Result<(), CavityError> {
        Ok(self.ades_pv.put(amplitude)?)
    }

    fn turn_on(&mut self) -> Result<(), CavityError> {
        if !self.is_online()? {
            return Err(CavityError::HwMode(format!("{self} not online")));
        }
        self.set_rf_state(true)
    }

    fn turn_off(&mut self) -> Result<(), CavityError> {
        self.set_rf_state(false)
    }

    fn ssa_turn_on(&mut self) -> Result<(), CavityError> {
        self.ssa.set_power(true, &self.settings)
    }

    fn ssa_turn_off(&mut self) -> Result<(), CavityError> {
        self.ssa.set_power(false, &self.settings)
    }

    fn reset_interlocks(&mut self) -> Result<(), CavityError> {
        self.interlock_reset_pv.put(1)?;
        std::thread::sleep(self.settings.poll_interval);
        self.check_quench()
    }

    fn zero_dac_amplitudes(&mut self) -> Result<(), CavityError> {
        self.rack.rfs1.dac_amp_pv.put(0.0)?;
        self.rack.rfs2.dac_amp_pv.put(0.0)?;
        Ok(())
    }

    fn calibrate_ssa(&mut self, attempts: u32) -> Result<(), CavityError> {
        self.ssa
            .calibrate(self.settings.ssa_drive_max, attempts, &self.settings)
    }

    fn move_to_resonance(&mut self, use_sela: bool) -> Result<(), CavityError> {
        let detune_pv = if use_sela {
            &self.detune_sela_pv
        } else {
            &self.detune_best_pv
        };
        let tolerance = self.settings.detune_tolerance_hz;
        let mut detune = detune_pv.get_f64()?;
        for _ in 0..self.settings.max_tune_iterations {
            if detune.abs() <= tolerance {
                return Ok(());
            }
            let steps = -(detune * STEPPER_STEPS_PER_HZ).round() as i64;
            spdlog::info!("Moving {} {steps} steps to correct {detune} Hz", self.stepper.name);
            self.stepper.step(steps)?;
            std::thread::sleep(self.settings.poll_interval);
            detune = detune_pv.get_f64()?;
        }
        if detune.abs() <= tolerance {
            return Ok(());
        }
        Err(CavityError::Detune(format!(
            "{self} detune {detune} Hz outside {tolerance} Hz after {} moves",
            self.settings.max_tune_iterations
        )))
    }

    fn characterize(&mut self) -> Result<(), CavityError> {
        self.probe_cal_start_pv.put(1)?;
        let finished = wait_for(
            &self.probe_cal_status_pv,
            self.settings.rf_state_timeout,
            self.settings.poll_interval,
            pv_equals(CALIBRATION_COMPLETE_VALUE),
        )?;
        if !finished || self.probe_cal_result_pv.get_i64()? != CALIBRATION_RESULT_SUCCESS {
            return Err(CavityError::Characterization(format!(
                "{self} characterization did not complete successfully"
            )));
        }

        let loaded_q = self.loaded_q_pv.get_f64()?;
        if !(LOADED_Q_LOWER_LIMIT..=LOADED_Q_UPPER_LIMIT).contains(&loaded_q) {
            return Err(CavityError::QLoadedCalibration(format!(
                "{self} loaded Q {loaded_q:e} out of tolerance"
            )));
        }
        let scale_factor = self.scale_factor_pv.get_f64()?;
        if !(SCALE_FACTOR_LOWER_LIMIT..=SCALE_FACTOR_UPPER_LIMIT).contains(&scale_factor) {
            return Err(CavityError::ScaleFactorCalibration(format!(
                "{self} scale factor {scale_factor} out of tolerance"
            )));
        }
        Ok(())
    }

    fn trigger_probe_q_calc(&mut self) -> Result<(), CavityError> {
        Ok(self.calc_probe_q_pv.put(1)?)
    }

    fn enable_piezo_feedback(&mut self) -> Result<(), CavityError> {
        self.piezo.enable_feedback(&self.settings)
    }

    fn set_rf_mode(&mut self, mode: RfMode) -> Result<(), CavityError> {
        Ok(self.rf_mode_control_pv.put(mode.value())?)
    }

    fn walk_amp(&mut self, target: f64, step: f64) -> Result<(), CavityError> {
        let step = step.abs();
        let mut amplitude = self.ades()?;
        while (amplitude - target).abs() > f64::EPSILON {
            self.check_quench()?;
            amplitude = if amplitude < target {
                (amplitude + step).min(target)
            } else {
                (amplitude - step).max(target)
            };
            self.set_ades(amplitude)?;
            std::thread::sleep(self.settings.poll_interval);
        }
        self.check_quench()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pv::SimulatedPvs;
    use crate::simulation::{install_cavity, test_settings};

    fn sim_cavity() -> (Arc<SimulatedPvs>, Cavity) {
        let pvs = Arc::new(SimulatedPvs::new());
        let cavity = Cavity::new("02", 3, pvs.clone(), test_settings()).unwrap();
        install_cavity(&pvs, &cavity, 16.0, true, 400.0);
        (pvs, cavity)
    }

    #[test]
    fn test_linac_lookup() {
        assert_eq!(linac_for_cryomodule("01").unwrap(), "L0B");
        assert_eq!(linac_for_cryomodule("H2").unwrap(), "L1B");
        assert_eq!(linac_for_cryomodule("15").unwrap(), "L2B");
        assert_eq!(linac_for_cryomodule("16").unwrap(), "L3B");
        assert!(linac_for_cryomodule("36").is_err());
        assert!(linac_for_cryomodule("H3").is_err());
    }

    #[test]
    fn test_pv_names() {
        let (_, cavity) = sim_cavity();
        assert_eq!(cavity.to_string(), "CM02 Cavity 3");
        assert_eq!(cavity.pv_prefix(), "ACCL:L1B:0230:");
        assert_eq!(cavity.auto_pv_prefix(), "ACCL:L1B:0230:AUTO:");
        assert_eq!(cavity.ssa.status_pv.name(), "ACCL:L1B:0230:SSA:STATUS_RBV");
        assert_eq!(cavity.rack.name, 'A');
        assert_eq!(
            cavity.rack.rfs2.dac_amp_pv.name(),
            "ACCL:L1B:0200:RFS2A:DAC_AMPLTD"
        );
        let pvs: Arc<dyn ProcessVariables> = Arc::new(SimulatedPvs::new());
        let rack_b = Cavity::new("20", 6, pvs.clone(), test_settings()).unwrap();
        assert_eq!(rack_b.rack.name, 'B');
        assert!(Cavity::new("20", 0, pvs, test_settings()).is_err());
    }

    #[test]
    fn test_rf_on_off() {
        let (_, mut cavity) = sim_cavity();
        cavity.turn_on().unwrap();
        assert!(cavity.is_on().unwrap());
        cavity.turn_off().unwrap();
        assert!(!cavity.is_on().unwrap());
    }

    #[test]
    fn test_turn_on_offline_is_hw_mode_fault() {
        let (pvs, mut cavity) = sim_cavity();
        pvs.set(cavity.hw_mode_pv.name(), HW_MODE_OFFLINE_VALUE);
        assert!(matches!(cavity.turn_on(), Err(CavityError::HwMode(_))));
    }

    #[test]
    fn test_rejected_rf_control_is_severity_fault() {
        let (pvs, mut cavity) = sim_cavity();
        pvs.reject_puts(cavity.rf_control_pv.name(), crate::pv::Severity::Major);
        assert!(matches!(cavity.turn_off(), Err(CavityError::Severity(_))));
    }

    #[test]
    fn test_ssa_calibration_failure_after_attempts() {
        let (pvs, mut cavity) = sim_cavity();
        pvs.set(
            cavity.ssa.calibration_result_pv.name(),
            CALIBRATION_RESULT_FAILURE,
        );
        match cavity.calibrate_ssa(SSA_CALIBRATION_ATTEMPTS) {
            Err(CavityError::SsaCalibration(msg)) => {
                assert!(msg.contains("after 2 attempts"))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pvs.history(cavity.ssa.calibration_start_pv.name()).len(), 2);
    }

    #[test]
    fn test_faulted_ssa() {
        let (pvs, mut cavity) = sim_cavity();
        pvs.set(cavity.ssa.status_pv.name(), SSA_STATUS_FAULTED_VALUE);
        assert!(matches!(cavity.ssa_turn_on(), Err(CavityError::SsaFault(_))));
    }

    #[test]
    fn test_move_to_resonance() {
        let (pvs, mut cavity) = sim_cavity();
        cavity.move_to_resonance(false).unwrap();
        assert_eq!(pvs.history(cavity.stepper.move_negative_pv.name()).len(), 1);
        assert_eq!(
            pvs.history(cavity.stepper.steps_pv.name()),
            vec![PvValue::Int(2000)]
        );

        pvs.set(cavity.stepper.abort_pv.name(), 1);
        pvs.set(cavity.detune_sela_pv.name(), 300.0);
        assert!(matches!(
            cavity.move_to_resonance(true),
            Err(CavityError::StepperAbort(_))
        ));
    }

    #[test]
    fn test_detune_not_converging() {
        let (_, cavity) = sim_cavity();
        // Without responders the detune never changes
        let stuck = SimulatedPvs::new();
        stuck.set(cavity.detune_best_pv.name(), 500.0);
        stuck.set(cavity.stepper.abort_pv.name(), 0);
        stuck.set(cavity.stepper.fault_pv.name(), 0);
        let mut stuck_cavity = Cavity::new("02", 3, Arc::new(stuck), test_settings()).unwrap();
        assert!(matches!(
            stuck_cavity.move_to_resonance(false),
            Err(CavityError::Detune(_))
        ));
    }

    #[test]
    fn test_sela_resonance_uses_sela_detune_and_stepper() {
        let (_, cavity) = sim_cavity();
        let stuck = Arc::new(SimulatedPvs::new());
        stuck.set(cavity.detune_best_pv.name(), 0.0);
        stuck.set(cavity.detune_sela_pv.name(), 500.0);
        stuck.set(cavity.stepper.abort_pv.name(), 0);
        stuck.set(cavity.stepper.fault_pv.name(), 0);
        let mut stuck_cavity = Cavity::new("02", 3, stuck.clone(), test_settings()).unwrap();

        stuck_cavity.move_to_resonance(false).unwrap();
        assert!(stuck.history(cavity.stepper.steps_pv.name()).is_empty());

        assert!(matches!(
            stuck_cavity.move_to_resonance(true),
            Err(CavityError::Detune(_))
        ));
        assert!(!stuck.history(cavity.stepper.steps_pv.name()).is_empty());
    }

    #[test]
    fn test_characterization_bounds() {
        let (pvs, mut cavity) = sim_cavity();
        cavity.characterize().unwrap();
        pvs.set(cavity.loaded_q_pv.name(), 1.0e7);
        assert!(matches!(
            cavity.characterize(),
            Err(CavityError::QLoadedCalibration(_))
        ));
        pvs.set(cavity.loaded_q_pv.name(), 4.0e7);
        pvs.set(cavity.scale_factor_pv.name(), 80.0);
        assert!(matches!(
            cavity.characterize(),
            Err(CavityError::ScaleFactorCalibration(_))
        ));
        pvs.set(cavity.probe_cal_result_pv.name(), CALIBRATION_RESULT_FAILURE);
        assert!(matches!(
            cavity.characterize(),
            Err(CavityError::Characterization(_))
        ));
    }

    #[test]
    fn test_walk_amp_steps() {
        let (pvs, mut cavity) = sim_cavity();
        cavity.set_ades(2.0).unwrap();
        pvs.clear_history();
        cavity.walk_amp(2.35, AMPLITUDE_WALK_STEP_MV).unwrap();
        let steps: Vec<f64> = pvs
            .history(cavity.ades_pv.name())
            .iter()
            .filter_map(|v| v.as_f64())
            .collect();
        assert_eq!(steps.len(), 4);
        assert!((steps[0] - 2.1).abs() < 1e-9);
        assert_eq!(*steps.last().unwrap(), 2.35);
    }

    #[test]
    fn test_walk_amp_quench() {
        let (pvs, mut cavity) = sim_cavity();
        pvs.set(cavity.quench_latch_pv.name(), 1);
        assert!(matches!(
            cavity.walk_amp(5.0, 0.1),
            Err(CavityError::Quench(_))
        ));
    }
}
