//! A simulated linac for dry runs.
//!
//! These helpers seed a [`SimulatedPvs`] with the PVs of a cavity (or cryomodule, or
//! decarad) and register responders so that writing a control PV moves its readback the
//! way the real IOC would. Nothing here models physics: calibrations succeed, tuning moves
//! land on resonance and RF follows its control PV immediately.
use std::sync::Arc;

use super::config::Config;
use super::constants::*;
use super::decarad::Decarad;
use super::error::ConfigError;
use super::linac::{cryomodule_pv_prefix, Cavity, RfMode};
use super::pv::{PvValue, SimulatedPvs};
use super::setup_cavity::SetupCavity;
use super::setup_cryomodule::SetupCryomodule;

/// Seed the auto-setup PV group under `auto_prefix`
pub fn install_setup_pvs(pvs: &SimulatedPvs, auto_prefix: &str) {
    let seed = |suffix: &str, value: PvValue| pvs.set(&format!("{auto_prefix}{suffix}"), value);
    seed("PROG", PvValue::Float(0.0));
    seed("STATUS", PvValue::Int(STATUS_READY_VALUE));
    seed("MSG", PvValue::Str(String::new()));
    seed("NOTE", PvValue::Str(String::new()));
    seed("ABORT", PvValue::Int(0));
    for request in ["SETUP_SSAREQ", "SETUP_TUNEREQ", "SETUP_CHARREQ", "SETUP_RAMPREQ"] {
        seed(request, PvValue::Int(0));
    }
    seed("SETUPSTRT", PvValue::Int(0));
    seed("OFFSTRT", PvValue::Int(0));
}

/// Seed every hardware PV of `cavity` and wire up the control/readback responders
pub fn install_cavity(pvs: &SimulatedPvs, cavity: &Cavity, acon: f64, online: bool, detune_hz: f64) {
    let hw_mode = if online {
        HW_MODE_ONLINE_VALUE
    } else {
        HW_MODE_OFFLINE_VALUE
    };
    pvs.set(cavity.hw_mode_pv.name(), hw_mode);

    pvs.set(cavity.rf_control_pv.name(), RF_STATE_OFF);
    pvs.set(cavity.rf_state_pv.name(), RF_STATE_OFF);
    pvs.mirror(cavity.rf_control_pv.name(), cavity.rf_state_pv.name());

    pvs.set(cavity.rf_mode_control_pv.name(), RfMode::Chirp.value());
    pvs.set(cavity.rf_mode_pv.name(), RfMode::Chirp.value());
    pvs.mirror(cavity.rf_mode_control_pv.name(), cavity.rf_mode_pv.name());

    pvs.set(cavity.acon_pv.name(), acon);
    pvs.set(cavity.ades_pv.name(), 0.0);
    pvs.set(cavity.amean_pv.name(), 0.0);
    pvs.mirror(cavity.ades_pv.name(), cavity.amean_pv.name());

    pvs.set(cavity.quench_latch_pv.name(), 0);
    pvs.set(cavity.interlock_reset_pv.name(), 0);
    pvs.respond(
        cavity.interlock_reset_pv.name(),
        cavity.quench_latch_pv.name(),
        0,
    );

    let ssa = &cavity.ssa;
    pvs.set(ssa.status_pv.name(), SSA_STATUS_OFF_VALUE);
    pvs.respond(ssa.power_on_pv.name(), ssa.status_pv.name(), SSA_STATUS_ON_VALUE);
    pvs.respond(ssa.power_off_pv.name(), ssa.status_pv.name(), SSA_STATUS_OFF_VALUE);
    pvs.set(ssa.calibration_status_pv.name(), 0);
    pvs.set(ssa.calibration_result_pv.name(), CALIBRATION_RESULT_SUCCESS);
    pvs.respond(
        ssa.calibration_start_pv.name(),
        ssa.calibration_status_pv.name(),
        CALIBRATION_COMPLETE_VALUE,
    );
    pvs.set(ssa.drive_max_pv.name(), 0.0);

    pvs.set(cavity.piezo.mode_control_pv.name(), PIEZO_MANUAL_VALUE);
    pvs.set(cavity.piezo.mode_status_pv.name(), PIEZO_MANUAL_VALUE);
    pvs.mirror(
        cavity.piezo.mode_control_pv.name(),
        cavity.piezo.mode_status_pv.name(),
    );

    let stepper = &cavity.stepper;
    pvs.set(stepper.steps_pv.name(), 0);
    pvs.set(stepper.abort_pv.name(), 0);
    pvs.set(stepper.fault_pv.name(), 0);
    pvs.set(cavity.detune_best_pv.name(), detune_hz);
    pvs.set(cavity.detune_sela_pv.name(), detune_hz);
    for request in [&stepper.move_positive_pv, &stepper.move_negative_pv] {
        pvs.respond(request.name(), cavity.detune_best_pv.name(), 0.0);
        pvs.respond(request.name(), cavity.detune_sela_pv.name(), 0.0);
    }

    pvs.set(cavity.probe_cal_status_pv.name(), 0);
    pvs.set(cavity.probe_cal_result_pv.name(), CALIBRATION_RESULT_SUCCESS);
    pvs.respond(
        cavity.probe_cal_start_pv.name(),
        cavity.probe_cal_status_pv.name(),
        CALIBRATION_COMPLETE_VALUE,
    );
    pvs.set(cavity.loaded_q_pv.name(), 4.1e7);
    pvs.set(cavity.scale_factor_pv.name(), 22.0);
    pvs.set(cavity.calc_probe_q_pv.name(), 0);

    pvs.set(cavity.rack.rfs1.dac_amp_pv.name(), 0.0);
    pvs.set(cavity.rack.rfs2.dac_amp_pv.name(), 0.0);
}

/// Seed a decarad and its ten heads with a flat dose reading
pub fn install_decarad(pvs: &SimulatedPvs, decarad: &Decarad, dose: f64) {
    pvs.set(decarad.power_control_pv.name(), 1);
    pvs.set(decarad.power_status_pv.name(), 1);
    pvs.set(decarad.voltage_readback_pv.name(), 800.0);
    for head in decarad.heads() {
        pvs.set(head.dose_rate_pv.name(), dose);
    }
}

/// Build a simulated cavity ready for setup, as selected by `config`
pub fn simulate_cavity(
    config: &Config,
) -> Result<(Arc<SimulatedPvs>, SetupCavity<Cavity>), ConfigError> {
    let pvs = Arc::new(SimulatedPvs::new());
    let cavity = Cavity::new(
        &config.cryomodule,
        config.cavity,
        pvs.clone(),
        config.cavity_settings()?,
    )?;
    install_cavity(
        &pvs,
        &cavity,
        config.sim_acon,
        config.sim_online,
        config.sim_detune_hz,
    );
    install_setup_pvs(&pvs, &cavity.auto_pv_prefix());
    let setup = SetupCavity::from_cavity(cavity, pvs.clone());
    Ok((pvs, setup))
}

/// Build a simulated cryomodule (with all eight cavities) as selected by `config`
pub fn simulate_cryomodule(
    config: &Config,
) -> Result<(Arc<SimulatedPvs>, SetupCryomodule), ConfigError> {
    let pvs = Arc::new(SimulatedPvs::new());
    install_setup_pvs(
        &pvs,
        &format!("{}AUTO:", cryomodule_pv_prefix(&config.cryomodule)?),
    );
    let cryomodule =
        SetupCryomodule::new(&config.cryomodule, pvs.clone(), config.cavity_settings()?)?;
    for setup in cryomodule.cavities() {
        install_cavity(
            &pvs,
            &setup.cavity,
            config.sim_acon,
            config.sim_online,
            config.sim_detune_hz,
        );
        install_setup_pvs(&pvs, &setup.cavity.auto_pv_prefix());
    }
    Ok((pvs, cryomodule))
}

/// Settings with no waiting, for tests
#[cfg(test)]
pub(crate) fn test_settings() -> super::linac::CavitySettings {
    super::linac::CavitySettings {
        ssa_drive_max: 0.8,
        rf_state_timeout: std::time::Duration::ZERO,
        detune_tolerance_hz: 50.0,
        max_tune_iterations: 5,
        poll_interval: std::time::Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linac::CavityControl;
    use crate::pv::ProcessVariables;
    use crate::status::SetupStatus;

    #[test]
    fn test_simulated_cavity_from_config() {
        let mut config = Config::default();
        config.cryomodule = String::from("17");
        config.cavity = 5;
        let (pvs, setup) = simulate_cavity(&config).unwrap();
        assert_eq!(setup.cavity.to_string(), "CM17 Cavity 5");
        assert!(setup.cavity.is_online().unwrap());
        assert_eq!(setup.pvs.status().unwrap(), Some(SetupStatus::Ready));
        assert_eq!(
            pvs.get("ACCL:L3B:1700:RFS1B:DAC_AMPLTD").unwrap(),
            PvValue::Float(0.0)
        );
    }

    #[test]
    fn test_offline_simulation() {
        let mut config = Config::default();
        config.sim_online = false;
        let (_, setup) = simulate_cavity(&config).unwrap();
        assert!(!setup.cavity.is_online().unwrap());
    }

    #[test]
    fn test_bad_config_rejected() {
        let mut config = Config::default();
        config.cryomodule = String::from("99");
        assert!(simulate_cavity(&config).is_err());
    }
}
