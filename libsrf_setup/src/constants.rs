// Auto-setup status codes as written to the STATUS PV
pub const STATUS_READY_VALUE: i64 = 0;
pub const STATUS_RUNNING_VALUE: i64 = 1;
pub const STATUS_ERROR_VALUE: i64 = 2;

// Hardware mode (HWMODE) values
pub const HW_MODE_ONLINE_VALUE: i64 = 0;
pub const HW_MODE_MAINTENANCE_VALUE: i64 = 1;
pub const HW_MODE_OFFLINE_VALUE: i64 = 2;

// RF on/off control and readback
pub const RF_STATE_OFF: i64 = 0;
pub const RF_STATE_ON: i64 = 1;

// SSA status readback strings
pub const SSA_STATUS_ON_VALUE: &str = "SSA On";
pub const SSA_STATUS_OFF_VALUE: &str = "SSA Off";
pub const SSA_STATUS_FAULTED_VALUE: &str = "Faulted";

// Calibration status (SSA and probe) readbacks
pub const CALIBRATION_RUNNING_VALUE: i64 = 1;
pub const CALIBRATION_COMPLETE_VALUE: i64 = 2;
pub const CALIBRATION_RESULT_SUCCESS: i64 = 0;
pub const CALIBRATION_RESULT_FAILURE: i64 = 1;

// Piezo control modes
pub const PIEZO_MANUAL_VALUE: i64 = 0;
pub const PIEZO_FEEDBACK_VALUE: i64 = 1;

// Stepper status
pub const STEPPER_ON_LIMIT_SWITCH_VALUE: i64 = 1;

/// Number of cavities in a cryomodule
pub const CAVITIES_PER_CRYOMODULE: u8 = 8;

/// Every cryomodule in the superconducting linac, in beamline order
pub const ALL_CRYOMODULES: [&str; 37] = [
    "01", "02", "03", "H1", "H2", "04", "05", "06", "07", "08", "09", "10", "11", "12", "13",
    "14", "15", "16", "17", "18", "19", "20", "21", "22", "23", "24", "25", "26", "27", "28",
    "29", "30", "31", "32", "33", "34", "35",
];

// Sequencer constants
pub const SSA_CALIBRATION_ATTEMPTS: u32 = 2;
pub const RAMP_START_AMPLITUDE_MV: f64 = 2.0;
pub const AMPLITUDE_WALK_STEP_MV: f64 = 0.1;
pub const RF_MODE_POLL_INTERVAL_MS: u64 = 500;

// Hardware wait loop polling
pub const HARDWARE_POLL_INTERVAL_MS: u64 = 100;

// Characterization acceptance windows
pub const LOADED_Q_LOWER_LIMIT: f64 = 2.5e7;
pub const LOADED_Q_UPPER_LIMIT: f64 = 5.5e7;
pub const SCALE_FACTOR_LOWER_LIMIT: f64 = 10.0;
pub const SCALE_FACTOR_UPPER_LIMIT: f64 = 50.0;

// Stepper steps per Hz of detune
pub const STEPPER_STEPS_PER_HZ: f64 = 5.0;

/// Decarad heads are numbered 1 through this value
pub const DECARAD_HEADS: usize = 10;
