use std::fmt::Display;
use std::sync::Arc;

use super::constants::CAVITIES_PER_CRYOMODULE;
use super::error::{ConfigError, LauncherError};
use super::launcher;
use super::linac::{cryomodule_pv_prefix, Cavity, CavitySettings};
use super::pv::ProcessVariables;
use super::setup_cavity::SetupCavity;
use super::setup_object::SetupPvs;

/// A cryomodule's auto-setup PVs and its eight cavities.
///
/// The request flags published at cryomodule level are what gets copied to each cavity
/// when the cryomodule is launched.
#[derive(Debug)]
pub struct SetupCryomodule {
    pub name: String,
    pub pvs: SetupPvs,
    cavities: Vec<SetupCavity<Cavity>>,
}

impl SetupCryomodule {
    pub fn new(
        name: &str,
        backend: Arc<dyn ProcessVariables>,
        settings: CavitySettings,
    ) -> Result<Self, ConfigError> {
        let prefix = cryomodule_pv_prefix(name)?;
        let pvs = SetupPvs::new(&format!("CM{name}"), &format!("{prefix}AUTO:"), backend.clone());
        let mut cavities = Vec::with_capacity(CAVITIES_PER_CRYOMODULE as usize);
        for number in 1..=CAVITIES_PER_CRYOMODULE {
            let cavity = Cavity::new(name, number, backend.clone(), settings.clone())?;
            cavities.push(SetupCavity::from_cavity(cavity, backend.clone()));
        }
        Ok(Self {
            name: name.to_string(),
            pvs,
            cavities,
        })
    }

    pub fn cavities(&self) -> &[SetupCavity<Cavity>] {
        &self.cavities
    }

    pub fn cavities_mut(&mut self) -> &mut [SetupCavity<Cavity>] {
        &mut self.cavities
    }

    /// Cavity by number (1-8)
    pub fn cavity(&self, number: u8) -> Option<&SetupCavity<Cavity>> {
        self.cavities.iter().find(|c| c.cavity.number == number)
    }

    pub fn cavity_mut(&mut self, number: u8) -> Option<&mut SetupCavity<Cavity>> {
        self.cavities.iter_mut().find(|c| c.cavity.number == number)
    }

    /// Copy the cryomodule requests to every cavity and trigger their setup
    pub fn trigger_setup(&self) -> Result<(), LauncherError> {
        launcher::setup_cryomodule(self, false)
    }

    pub fn trigger_shutdown(&self) -> Result<(), LauncherError> {
        launcher::setup_cryomodule(self, true)
    }

    /// Ask every running cavity script to stop
    pub fn trigger_abort(&self) -> Result<(), LauncherError> {
        for setup in self.cavities.iter() {
            setup.pvs.trigger_abort()?;
        }
        Ok(())
    }
}

impl Display for SetupCryomodule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CM{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::pv::PvValue;
    use crate::simulation::simulate_cryomodule;
    use crate::status::SetupStatus;

    #[test]
    fn test_cavities_built() {
        let (_, cm) = simulate_cryomodule(&Config::default()).unwrap();
        assert_eq!(cm.cavities().len(), 8);
        assert_eq!(cm.to_string(), "CM02");
        assert_eq!(cm.pvs.status_pv.name(), "ACCL:L1B:0200:AUTO:STATUS");
        assert_eq!(cm.cavity(8).unwrap().cavity.to_string(), "CM02 Cavity 8");
        assert!(cm.cavity(9).is_none());
    }

    #[test]
    fn test_trigger_abort_fans_out() {
        let (pvs, cm) = simulate_cryomodule(&Config::default()).unwrap();
        cm.cavity(2).unwrap().pvs.set_status(SetupStatus::Running).unwrap();
        pvs.clear_history();
        cm.trigger_abort().unwrap();
        assert_eq!(
            pvs.history("ACCL:L1B:0220:AUTO:ABORT"),
            vec![PvValue::Int(1)]
        );
        assert!(pvs.history("ACCL:L1B:0230:AUTO:ABORT").is_empty());
    }
}
