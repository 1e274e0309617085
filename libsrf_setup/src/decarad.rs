use std::sync::Arc;

use parking_lot::Mutex;

use super::constants::DECARAD_HEADS;
use super::error::DecaradError;
use super::pv::{ProcessVariables, Pv};

/// One detector head of a decarad
#[derive(Debug)]
pub struct DecaradHead {
    pub number: usize,
    pub dose_rate_pv: Pv,
    background: f64,
    last_normalized: Mutex<Option<f64>>,
}

impl DecaradHead {
    fn new(
        number: usize,
        decarad_prefix: &str,
        backend: Arc<dyn ProcessVariables>,
        background: f64,
    ) -> Result<Self, DecaradError> {
        if !(1..=DECARAD_HEADS).contains(&number) {
            return Err(DecaradError::BadHead(number));
        }
        Ok(Self {
            number,
            dose_rate_pv: Pv::new(format!("{decarad_prefix}{number:02}:GAMMAAVE"), backend),
            background,
            last_normalized: Mutex::new(None),
        })
    }

    /// Raw dose rate
    pub fn dose(&self) -> Result<f64, DecaradError> {
        Ok(self.dose_rate_pv.get_f64()?)
    }

    /// Dose rate above background, never negative
    pub fn normalized_dose(&self) -> Result<f64, DecaradError> {
        let dose = (self.dose()? - self.background).max(0.0);
        *self.last_normalized.lock() = Some(dose);
        Ok(dose)
    }

    /// Normalized dose, or the last good normalized reading if the head can't be read
    pub fn avg_dose(&self) -> Result<f64, DecaradError> {
        match self.normalized_dose() {
            Ok(dose) => Ok(dose),
            Err(e) => match *self.last_normalized.lock() {
                Some(dose) => {
                    spdlog::warn!(
                        "Decarad head {} read failed ({e}), using last reading {dose}",
                        self.number
                    );
                    Ok(dose)
                }
                None => Err(e),
            },
        }
    }
}

/// A decarad radiation monitor with ten heads
#[derive(Debug)]
pub struct Decarad {
    pub number: u8,
    pub power_control_pv: Pv,
    pub power_status_pv: Pv,
    pub voltage_readback_pv: Pv,
    heads: Vec<DecaradHead>,
}

impl Decarad {
    pub fn new(
        number: u8,
        backend: Arc<dyn ProcessVariables>,
        background: f64,
    ) -> Result<Self, DecaradError> {
        if !matches!(number, 1 | 2) {
            return Err(DecaradError::BadDecarad(number));
        }
        let prefix = format!("RADM:SYS0:{number}00:");
        let heads = (1..=DECARAD_HEADS)
            .map(|head| DecaradHead::new(head, &prefix, backend.clone(), background))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            number,
            power_control_pv: Pv::new(format!("{prefix}HVCTRL"), backend.clone()),
            power_status_pv: Pv::new(format!("{prefix}HVSTATUS"), backend.clone()),
            voltage_readback_pv: Pv::new(format!("{prefix}HVMON"), backend),
            heads,
        })
    }

    pub fn heads(&self) -> &[DecaradHead] {
        &self.heads
    }

    /// Head by number (1-10)
    pub fn head(&self, number: usize) -> Result<&DecaradHead, DecaradError> {
        if !(1..=DECARAD_HEADS).contains(&number) {
            return Err(DecaradError::BadHead(number));
        }
        Ok(&self.heads[number - 1])
    }

    pub fn max_avg_dose(&self) -> Result<f64, DecaradError> {
        let mut max = 0.0_f64;
        for head in self.heads.iter() {
            max = max.max(head.avg_dose()?);
        }
        Ok(max)
    }

    /// Largest raw reading over all heads
    pub fn max_dose(&self) -> Result<f64, DecaradError> {
        let mut max = f64::NEG_INFINITY;
        for head in self.heads.iter() {
            max = max.max(head.dose()?);
        }
        Ok(max)
    }
}
