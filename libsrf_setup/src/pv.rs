//! Process variable access.
//!
//! Everything in this crate talks to the control system through the [`ProcessVariables`]
//! trait: a get/put interface over named channels. The crate does not speak Channel Access
//! itself; [`SimulatedPvs`] is an in-memory backend used by the front ends and the tests.
use std::fmt::Display;
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::error::PvError;

/// EPICS alarm severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    Invalid,
}

/// The value held by a PV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PvValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl PvValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(f.round() as i64),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }

    /// Non-zero numbers are true, like an EPICS binary record
    pub fn as_bool(&self) -> Option<bool> {
        self.as_f64().map(|v| v != 0.0)
    }

    pub fn as_string(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
        }
    }
}

impl Display for PvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<i64> for PvValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PvValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<bool> for PvValue {
    fn from(value: bool) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for PvValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PvValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PvValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Get/put access to named process variables
pub trait ProcessVariables: Send + Sync {
    fn get(&self, name: &str) -> Result<PvValue, PvError>;
    fn put(&self, name: &str, value: PvValue) -> Result<(), PvError>;
}

/// A handle to a single named PV on a shared backend
#[derive(Clone)]
pub struct Pv {
    name: String,
    backend: Arc<dyn ProcessVariables>,
}

impl std::fmt::Debug for Pv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pv").field("name", &self.name).finish()
    }
}

impl Pv {
    pub fn new(name: impl Into<String>, backend: Arc<dyn ProcessVariables>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Result<PvValue, PvError> {
        self.backend.get(&self.name)
    }

    pub fn put(&self, value: impl Into<PvValue>) -> Result<(), PvError> {
        self.backend.put(&self.name, value.into())
    }

    pub fn get_f64(&self) -> Result<f64, PvError> {
        let value = self.get()?;
        value
            .as_f64()
            .ok_or_else(|| PvError::WrongType(self.name.clone(), value.as_string(), "float"))
    }

    pub fn get_i64(&self) -> Result<i64, PvError> {
        let value = self.get()?;
        value
            .as_i64()
            .ok_or_else(|| PvError::WrongType(self.name.clone(), value.as_string(), "integer"))
    }

    pub fn get_bool(&self) -> Result<bool, PvError> {
        let value = self.get()?;
        value
            .as_bool()
            .ok_or_else(|| PvError::WrongType(self.name.clone(), value.as_string(), "bool"))
    }

    pub fn get_string(&self) -> Result<String, PvError> {
        Ok(self.get()?.as_string())
    }
}

/// What a simulated control PV does to its readback when written
#[derive(Debug, Clone)]
enum Responder {
    Mirror(String),
    Fixed(String, PvValue),
}

#[derive(Debug, Default)]
struct SimulatedState {
    values: FxHashMap<String, PvValue>,
    severities: FxHashMap<String, Severity>,
    rejected_puts: FxHashMap<String, Severity>,
    responders: FxHashMap<String, Vec<Responder>>,
    history: FxHashMap<String, Vec<PvValue>>,
}

/// In-memory PV backend.
///
/// Unknown PVs read as disconnected. Puts create the PV if needed, record the value in the
/// put history and then fire any responders registered on that PV.
#[derive(Debug, Default)]
pub struct SimulatedPvs {
    state: Mutex<SimulatedState>,
}

impl SimulatedPvs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without recording history or firing responders
    pub fn set(&self, name: &str, value: impl Into<PvValue>) {
        self.state.lock().values.insert(name.to_string(), value.into());
    }

    pub fn set_severity(&self, name: &str, severity: Severity) {
        self.state
            .lock()
            .severities
            .insert(name.to_string(), severity);
    }

    /// Make every put to `name` fail with the given severity
    pub fn reject_puts(&self, name: &str, severity: Severity) {
        self.state
            .lock()
            .rejected_puts
            .insert(name.to_string(), severity);
    }

    /// Writing `control` copies the written value into `readback`
    pub fn mirror(&self, control: &str, readback: &str) {
        self.state
            .lock()
            .responders
            .entry(control.to_string())
            .or_default()
            .push(Responder::Mirror(readback.to_string()));
    }

    /// Writing `control` stores `value` into `readback`
    pub fn respond(&self, control: &str, readback: &str, value: impl Into<PvValue>) {
        self.state
            .lock()
            .responders
            .entry(control.to_string())
            .or_default()
            .push(Responder::Fixed(readback.to_string(), value.into()));
    }

    /// Every value put to `name`, oldest first
    pub fn history(&self, name: &str) -> Vec<PvValue> {
        self.state
            .lock()
            .history
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// Names of PVs written since the last history clear
    pub fn written(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().history.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ProcessVariables for SimulatedPvs {
    fn get(&self, name: &str) -> Result<PvValue, PvError> {
        let state = self.state.lock();
        if state.severities.get(name) == Some(&Severity::Invalid) {
            return Err(PvError::Invalid(name.to_string()));
        }
        state
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| PvError::Disconnected(name.to_string()))
    }

    fn put(&self, name: &str, value: PvValue) -> Result<(), PvError> {
        let mut state = self.state.lock();
        if let Some(severity) = state.rejected_puts.get(name) {
            return Err(PvError::Severity(name.to_string(), *severity));
        }
        state
            .history
            .entry(name.to_string())
            .or_default()
            .push(value.clone());
        let responders = state.responders.get(name).cloned().unwrap_or_default();
        state.values.insert(name.to_string(), value.clone());
        for responder in responders {
            match responder {
                Responder::Mirror(readback) => {
                    state.values.insert(readback, value.clone());
                }
                Responder::Fixed(readback, fixed) => {
                    state.values.insert(readback, fixed);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_pv_is_disconnected() {
        let pvs = SimulatedPvs::new();
        match pvs.get("ACCL:L1B:0210:NOPE") {
            Err(PvError::Disconnected(name)) => assert_eq!(name, "ACCL:L1B:0210:NOPE"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_severity_fails_get() {
        let pvs = SimulatedPvs::new();
        pvs.set("A:B", 1);
        pvs.set_severity("A:B", Severity::Invalid);
        assert!(matches!(pvs.get("A:B"), Err(PvError::Invalid(_))));
        pvs.set_severity("A:B", Severity::Minor);
        assert_eq!(pvs.get("A:B").unwrap(), PvValue::Int(1));
    }

    #[test]
    fn test_responders_and_history() {
        let pvs = SimulatedPvs::new();
        pvs.mirror("CTRL", "RBV");
        pvs.respond("START", "STS", 2);
        pvs.put("CTRL", PvValue::Float(3.5)).unwrap();
        pvs.put("START", PvValue::Int(1)).unwrap();
        pvs.put("CTRL", PvValue::Float(4.0)).unwrap();

        assert_eq!(pvs.get("RBV").unwrap(), PvValue::Float(4.0));
        assert_eq!(pvs.get("STS").unwrap(), PvValue::Int(2));
        assert_eq!(
            pvs.history("CTRL"),
            vec![PvValue::Float(3.5), PvValue::Float(4.0)]
        );
        assert!(pvs.history("RBV").is_empty());
        assert_eq!(pvs.written(), vec!["CTRL".to_string(), "START".to_string()]);
    }

    #[test]
    fn test_rejected_put() {
        let pvs = SimulatedPvs::new();
        pvs.reject_puts("X", Severity::Major);
        assert!(matches!(
            pvs.put("X", PvValue::Int(1)),
            Err(PvError::Severity(_, Severity::Major))
        ));
        assert!(pvs.history("X").is_empty());
    }

    #[test]
    fn test_typed_handle() {
        let pvs: Arc<SimulatedPvs> = Arc::new(SimulatedPvs::new());
        let pv = Pv::new("MSG", pvs.clone());
        pv.put("hello").unwrap();
        assert_eq!(pv.get_string().unwrap(), "hello");
        assert!(matches!(pv.get_f64(), Err(PvError::WrongType(..))));
        let num = Pv::new("NUM", pvs);
        num.put(2.6).unwrap();
        assert_eq!(num.get_i64().unwrap(), 3);
        assert!(num.get_bool().unwrap());
    }
}
