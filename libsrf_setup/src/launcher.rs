//! Launching setup scripts.
//!
//! Launching does not run anything: it copies the cryomodule requests onto a cavity and
//! sets the cavity's start (or stop) trigger PV. Whatever watches those triggers then calls
//! [`run_requested`], which clears the trigger and runs the sequence in-process.
use super::error::LauncherError;
use super::linac::CavityControl;
use super::setup_cavity::SetupCavity;
use super::setup_cryomodule::SetupCryomodule;
use super::status::RequestFlags;

/// Launch setup (or shutdown) for one cavity
pub fn setup_cavity<C: CavityControl>(
    setup: &SetupCavity<C>,
    cryomodule_requests: &RequestFlags,
    shutdown: bool,
) -> Result<(), LauncherError> {
    if setup.pvs.script_is_running()? {
        setup
            .pvs
            .set_status_message(&format!("{} script already running", setup.cavity))?;
        return Ok(());
    }

    if shutdown {
        setup.pvs.trigger_shutdown()?;
    } else {
        setup.pvs.set_requests(cryomodule_requests)?;
        setup.pvs.trigger_setup()?;
    }
    Ok(())
}

/// Launch every cavity of a cryomodule with the cryomodule's requests
pub fn setup_cryomodule(cryomodule: &SetupCryomodule, shutdown: bool) -> Result<(), LauncherError> {
    let requests = cryomodule.pvs.requests()?;
    spdlog::info!("Launching {cryomodule} with {requests:?} (shutdown: {shutdown})");
    for setup in cryomodule.cavities() {
        setup_cavity(setup, &requests, shutdown)?;
    }
    Ok(())
}

/// Run whatever the trigger PVs of `setup` ask for.
///
/// Returns true if a sequence was run.
pub fn run_requested<C: CavityControl>(setup: &mut SetupCavity<C>) -> Result<bool, LauncherError> {
    if setup.pvs.setup_triggered()? {
        setup.pvs.clear_setup_trigger()?;
        setup.setup()?;
        return Ok(true);
    }
    if setup.pvs.shutdown_triggered()? {
        setup.pvs.clear_shutdown_trigger()?;
        setup.shut_down()?;
        return Ok(true);
    }
    Ok(false)
}

/// Run the triggered sequence of every cavity in the cryomodule, one after the other.
///
/// Returns the number of cavities that ran.
pub fn run_cryomodule_requests(cryomodule: &mut SetupCryomodule) -> Result<usize, LauncherError> {
    let mut count = 0;
    for setup in cryomodule.cavities_mut() {
        if run_requested(setup)? {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::simulation::{simulate_cavity, simulate_cryomodule};
    use crate::status::SetupStatus;

    #[test]
    fn test_setup_cavity_copies_cryomodule_requests() {
        let (_, cm) = simulate_cryomodule(&Config::default()).unwrap();
        let requests = RequestFlags {
            ssa_cal: true,
            auto_tune: false,
            cav_char: true,
            rf_ramp: false,
        };
        cm.pvs.set_requests(&requests).unwrap();
        cm.trigger_setup().unwrap();

        for setup in cm.cavities() {
            assert_eq!(setup.pvs.requests().unwrap(), requests);
            assert!(setup.pvs.setup_triggered().unwrap());
            assert!(!setup.pvs.shutdown_triggered().unwrap());
        }
    }

    #[test]
    fn test_shutdown_leaves_requests_alone() {
        let (_, cm) = simulate_cryomodule(&Config::default()).unwrap();
        cm.pvs.set_requests(&RequestFlags::all()).unwrap();
        cm.trigger_shutdown().unwrap();
        let setup = cm.cavity(1).unwrap();
        assert_eq!(setup.pvs.requests().unwrap(), RequestFlags::default());
        assert!(setup.pvs.shutdown_triggered().unwrap());
    }

    #[test]
    fn test_running_cavity_not_launched() {
        let (pvs, setup) = simulate_cavity(&Config::default()).unwrap();
        setup.pvs.set_status(SetupStatus::Running).unwrap();
        pvs.clear_history();
        setup_cavity(&setup, &RequestFlags::all(), false).unwrap();
        assert_eq!(pvs.written(), vec![setup.pvs.status_msg_pv.name().to_string()]);
        assert_eq!(
            setup.pvs.status_message().unwrap(),
            "CM02 Cavity 1 script already running"
        );
    }

    #[test]
    fn test_run_requested() {
        let mut config = Config::default();
        config.rf_state_timeout_s = 0.0;
        let (_, mut setup) = simulate_cavity(&config).unwrap();
        assert!(!run_requested(&mut setup).unwrap());

        setup_cavity(&setup, &RequestFlags::default(), false).unwrap();
        assert!(run_requested(&mut setup).unwrap());
        assert!(!setup.pvs.setup_triggered().unwrap());
        assert_eq!(setup.pvs.status().unwrap(), Some(SetupStatus::Ready));
        assert_eq!(setup.pvs.progress().unwrap(), 100.0);

        setup_cavity(&setup, &RequestFlags::default(), true).unwrap();
        assert!(run_requested(&mut setup).unwrap());
        assert!(!setup.cavity.ssa.is_on().unwrap());
        assert_eq!(
            setup.pvs.status_message().unwrap(),
            "CM02 Cavity 1 RF and SSA off"
        );
        assert!(!setup.cavity.is_on().unwrap());
    }

    #[test]
    fn test_run_cryomodule_requests() {
        let mut config = Config::default();
        config.rf_state_timeout_s = 0.0;
        let (_, mut cm) = simulate_cryomodule(&config).unwrap();
        cm.cavity(3).unwrap().pvs.trigger_shutdown().unwrap();
        cm.cavity(6).unwrap().pvs.trigger_shutdown().unwrap();
        assert_eq!(run_cryomodule_requests(&mut cm).unwrap(), 2);
        assert_eq!(run_cryomodule_requests(&mut cm).unwrap(), 0);
    }
}
