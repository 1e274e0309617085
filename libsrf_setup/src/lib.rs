//! # srf_setup
//!
//! srf_setup is the automated setup sequencer for the superconducting RF cavities of the
//! linac, written in Rust. Given a cavity and a set of requested steps it brings the
//! cavity from off to running in closed loop (SELAP) at its operating amplitude,
//! reporting progress and status through a group of auto-setup PVs so that operator
//! displays can follow along. It also knows how to shut a cavity down, how to honor an
//! operator abort, and how to launch a whole cryomodule at once.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the GUI use `cargo install --path ./srf_setup` from the top level
//! srf_setup repository. To build and install the CLI use
//! `cargo install --path ./srf_setup_cli`.
//!
//! ## Control system access
//!
//! All hardware access goes through the [`pv::ProcessVariables`] trait. The library ships
//! an in-memory backend, [`pv::SimulatedPvs`], which the [`simulation`] module seeds with a
//! coherent cavity so that setup can be dry-run end to end. A Channel Access backend only
//! needs to implement `get` and `put`.
//!
//! ## The setup sequence
//!
//! Setup is driven by four request flags published on the cavity's auto-setup PVs:
//!
//! - SSA calibration (`SETUP_SSAREQ`)
//! - Auto tune (`SETUP_TUNEREQ`)
//! - Cavity characterization (`SETUP_CHARREQ`)
//! - RF ramp (`SETUP_RAMPREQ`)
//!
//! Whatever is requested runs in that order. Progress goes to `PROG` (0 to 100), status to
//! `STATUS` (0 ready, 1 running, 2 error) and a human readable message to `MSG`. Writing 1
//! to `ABORT` stops a running script at its next checkpoint.
//!
//! ## Configuration
//!
//! A configuration file saved using the UI is compatible with the CLI and vice-versa. The
//! YAML format of a configuration file is as follows:
//!
//! ```yml
//! cryomodule: '02'
//! cavity: 1
//! ssa_drive_max: 0.8
//! rf_state_timeout_s: 30.0
//! detune_tolerance_hz: 50.0
//! max_tune_iterations: 20
//! decarad_background: 0.0
//! fault_code_path: null
//! sim_online: true
//! sim_acon: 16.0
//! sim_detune_hz: 2000.0
//! ```
//!
//! The `sim_` fields only affect the simulated backend.
//!
//! ### Fault Code Format
//!
//! The fault decoder is a CSV export of the fault spreadsheet. It must contain the columns
//!
//! ```csv
//! Three Letter Code,Long Description,Generic Short Description for Decoder,Recommended Corrective Actions
//! ```
//!
//! Other columns are ignored.
//!
//! ## Output
//!
//! Both front ends write a log file. If a setup fails the status message PV carries the
//! fault, and the log file has the detail.
pub mod config;
pub mod constants;
pub mod decarad;
pub mod error;
pub mod fault_codes;
pub mod launcher;
pub mod linac;
pub mod pv;
pub mod setup_cavity;
pub mod setup_cryomodule;
pub mod setup_object;
pub mod simulation;
pub mod status;
