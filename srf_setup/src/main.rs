//! # srf_setup
//!
//! Part of the srf_setup crate family.
//!
//! This is the application to set up SRF cavities with a GUI using [egui](https://github.com/emilk/egui).
//!
//! ## Install
//!
//! Use `cargo install --path ./srf_setup`
//!
//! ## Use
//!
//! To launch the application simply invoke it after it is installed
//!
//! ```bash
//! srf_setup
//! ```
//!
//! Pick a cryomodule and cavity, click Load, tick the requested steps and click Set Up.
//! The progress bar follows the cavity's progress PV and is colored by its status: green
//! when ready, blue while running and red after a fault. Abort asks the running script to
//! stop at its next checkpoint.
//!
//! ## Configuration
//!
//! The following configuration controls are available in the GUI:
//!
//! - Cryomodule: The cryomodule holding the cavity
//! - Cavity: The cavity number, 1 to 8
//! - SSA Drive Max: Drive limit written to the SSA before calibrating
//! - RF State Timeout: How long to wait for RF and SSA state changes, in seconds
//! - Detune Tolerance: Detune below which the cavity is considered on resonance, in Hz
//! - Simulated ACON / Online: Starting state of the simulated cavity
//! - Fault codes: CSV fault decoder table used by the Decode box
//!
//! Configurations can be saved using File->Save and loaded using File->Open

mod app;
use app::SetupApp;
use std::path::PathBuf;
use std::sync::Arc;

fn init_logging() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./srf_setup.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

/// The program entry point
fn main() {
    // Setup logging to a file
    if let Err(e) = init_logging() {
        eprintln!("Could not create log file srf_setup.log: {e}");
    }
    spdlog::info!("Starting SRF Setup UI");

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("SRF Cavity Setup")
            .with_inner_size(eframe::epaint::vec2(600.0, 560.0))
            .with_min_inner_size(eframe::epaint::vec2(500.0, 400.0)),
        ..Default::default()
    };
    match eframe::run_native(
        "srf_setup",
        native_options,
        Box::new(|cc| Ok(Box::new(SetupApp::new(cc)))),
    ) {
        Ok(()) => (),
        Err(e) => spdlog::error!("Eframe error: {}", e),
    }
}
