use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use eframe::egui::{Color32, DragValue, ProgressBar, RichText};
use rfd::FileDialog;

use libsrf_setup::config::Config;
use libsrf_setup::constants::{ALL_CRYOMODULES, CAVITIES_PER_CRYOMODULE};
use libsrf_setup::error::LauncherError;
use libsrf_setup::fault_codes::FaultCodeTable;
use libsrf_setup::launcher;
use libsrf_setup::linac::Cavity;
use libsrf_setup::setup_cavity::SetupCavity;
use libsrf_setup::setup_object::SetupPvs;
use libsrf_setup::simulation::simulate_cavity;
use libsrf_setup::status::{RequestFlags, SetupStatus, StatusSnapshot};

type Worker = JoinHandle<(SetupCavity<Cavity>, Result<bool, LauncherError>)>;

fn render_error_dialog(show: &mut bool, ctx: &eframe::egui::Context) {
    eframe::egui::Window::new("Error")
        .open(show)
        .show(ctx, |ui| {
            ui.label("There was an error! Check the log file srf_setup.log for more information.")
        });
}

fn status_color(status: Option<SetupStatus>) -> Color32 {
    match status {
        Some(SetupStatus::Ready) => Color32::DARK_GREEN,
        Some(SetupStatus::Running) => Color32::BLUE,
        Some(SetupStatus::Error) => Color32::RED,
        None => Color32::GRAY,
    }
}

fn start_directory() -> PathBuf {
    std::env::current_dir().unwrap_or_default()
}

/// The simulated cavity has to be rebuilt when the config changed since it was loaded
fn cavity_is_stale(loaded: Option<&Config>, current: &Config) -> bool {
    loaded != Some(current)
}

/// The UI app which inherits the eframe::App trait.
///
/// Owns the simulated cavity between runs and hands it to a worker thread while a
/// sequence is running.
pub struct SetupApp {
    config: Config,
    requests: RequestFlags,
    setup: Option<SetupCavity<Cavity>>,
    loaded_config: Option<Config>,
    status_pvs: Option<SetupPvs>,
    snapshot: StatusSnapshot,
    worker: Option<Worker>,
    fault_code: String,
    decoded: String,
    show_error_window: bool,
}

impl SetupApp {
    /// Create the application
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let mut visuals = eframe::egui::Visuals::dark();
        visuals.override_text_color = Some(Color32::LIGHT_GRAY);
        cc.egui_ctx.set_visuals(visuals);
        SetupApp {
            config: Config::default(),
            requests: RequestFlags::all(),
            setup: None,
            loaded_config: None,
            status_pvs: None,
            snapshot: StatusSnapshot::default(),
            worker: None,
            fault_code: String::new(),
            decoded: String::new(),
            show_error_window: false,
        }
    }

    /// Build a fresh simulated cavity from the current Config
    fn load_cavity(&mut self) {
        if self.worker.is_some() {
            return;
        }
        if let Err(e) = self.config.validate() {
            self.show_error_window = true;
            spdlog::error!("{e}");
            return;
        }
        match simulate_cavity(&self.config) {
            Ok((_, setup)) => {
                spdlog::info!("Loaded simulated {}", setup.cavity);
                self.status_pvs = Some(setup.pvs.clone());
                self.setup = Some(setup);
                self.loaded_config = Some(self.config.clone());
            }
            Err(e) => {
                self.show_error_window = true;
                spdlog::error!("{e}");
            }
        }
    }

    /// Launch setup (or shutdown) and hand the cavity to a worker
    fn start_worker(&mut self, shutdown: bool) {
        if self.worker.is_some() {
            return;
        }
        if self.setup.is_none() || cavity_is_stale(self.loaded_config.as_ref(), &self.config) {
            self.load_cavity();
        }
        // A failed reload leaves the old cavity behind; never run it against the new config
        if cavity_is_stale(self.loaded_config.as_ref(), &self.config) {
            return;
        }
        let mut setup = match self.setup.take() {
            Some(s) => s,
            None => return,
        };
        if let Err(e) = launcher::setup_cavity(&setup, &self.requests, shutdown) {
            self.show_error_window = true;
            spdlog::error!("Launching failed: {e}");
            self.setup = Some(setup);
            return;
        }
        self.worker = Some(std::thread::spawn(move || {
            let result = launcher::run_requested(&mut setup);
            (setup, result)
        }));
    }

    /// Take the cavity back from a finished worker
    fn join_worker(&mut self) {
        let finished = self.worker.as_ref().is_some_and(|w| w.is_finished());
        if !finished {
            return;
        }
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok((setup, result)) => {
                    match result {
                        Ok(_) => spdlog::info!("{} worker complete", setup.cavity),
                        Err(e) => {
                            self.show_error_window = true;
                            spdlog::error!("Setup error: {e}")
                        }
                    }
                    self.setup = Some(setup);
                }
                Err(_) => {
                    self.show_error_window = true;
                    spdlog::error!("An error occured joining the setup worker!")
                }
            }
        }
    }

    fn abort(&mut self) {
        if let Some(pvs) = &self.status_pvs {
            if let Err(e) = pvs.trigger_abort() {
                self.show_error_window = true;
                spdlog::error!("Abort failed: {e}");
            }
        }
    }

    fn poll_status(&mut self) {
        if let Some(pvs) = &self.status_pvs {
            match pvs.snapshot() {
                Ok(snapshot) => self.snapshot = snapshot,
                Err(e) => spdlog::error!("Could not read setup status: {e}"),
            }
        }
    }

    fn decode_fault(&mut self) {
        let path = match &self.config.fault_code_path {
            Some(p) => p.clone(),
            None => {
                self.decoded = String::from("No fault code table selected");
                return;
            }
        };
        match FaultCodeTable::from_path(&path) {
            Ok(table) => {
                self.decoded = match table.lookup(&self.fault_code) {
                    Some(row) => format!(
                        "{}: {}\n{}\nAction: {}",
                        row.tlc, row.short_desc, row.long_desc, row.corrective_action
                    ),
                    None => format!("Unknown fault code {}", self.fault_code),
                }
            }
            Err(e) => {
                self.show_error_window = true;
                spdlog::error!("{e}");
            }
        }
    }

    /// Write the current Config to a file
    fn write_config(&mut self, path: &Path) {
        match self.config.write_config_file(path) {
            Ok(()) => spdlog::info!("Saved configuration to {}", path.display()),
            Err(e) => {
                self.show_error_window = true;
                spdlog::error!("Could not save configuration to {}: {e}", path.display());
            }
        }
    }

    /// Read the Config from a file
    fn read_config(&mut self, path: &Path) {
        match Config::read_config_file(path) {
            Ok(conf) => {
                self.config = conf;
                self.load_cavity();
            }
            Err(e) => spdlog::error!("{}", e),
        }
    }
}

impl eframe::App for SetupApp {
    fn update(&mut self, ctx: &eframe::egui::Context, _frame: &mut eframe::Frame) {
        self.join_worker();
        self.poll_status();
        render_error_dialog(&mut self.show_error_window, ctx);
        eframe::egui::CentralPanel::default().show(ctx, |ui| {
            //Menus
            ui.menu_button("File", |ui| {
                if ui.button("Open...").clicked() {
                    if let Some(path) = FileDialog::new()
                        .set_directory(start_directory())
                        .add_filter("YAML file", &["yaml", "yml"])
                        .pick_file()
                    {
                        self.read_config(&path);
                    }
                }
                if ui.button("Save...").clicked() {
                    if let Some(path) = FileDialog::new()
                        .set_directory(start_directory())
                        .add_filter("YAML file", &["yaml", "yml"])
                        .save_file()
                    {
                        self.write_config(&path);
                    }
                }
            });

            //Config
            ui.separator();
            ui.label(
                RichText::new("Configuration")
                    .color(Color32::LIGHT_BLUE)
                    .size(18.0),
            );
            let idle = self.worker.is_none();
            ui.add_enabled_ui(idle, |ui| {
                eframe::egui::Grid::new("ConfigGrid").show(ui, |ui| {
                    ui.label("Cryomodule");
                    eframe::egui::ComboBox::from_id_source("Cryomodule")
                        .selected_text(self.config.cryomodule.clone())
                        .show_ui(ui, |ui| {
                            for cm in ALL_CRYOMODULES {
                                ui.selectable_value(
                                    &mut self.config.cryomodule,
                                    cm.to_string(),
                                    cm,
                                );
                            }
                        });
                    ui.end_row();

                    ui.label("Cavity");
                    ui.add(
                        DragValue::new(&mut self.config.cavity)
                            .speed(1)
                            .range(1..=CAVITIES_PER_CRYOMODULE),
                    );
                    if ui.button("Load").clicked() {
                        self.load_cavity();
                    }
                    ui.end_row();

                    ui.label("SSA Drive Max");
                    ui.add(
                        DragValue::new(&mut self.config.ssa_drive_max)
                            .speed(0.01)
                            .range(0.0..=1.0),
                    );
                    ui.end_row();

                    ui.label("RF State Timeout (s)");
                    ui.add(
                        DragValue::new(&mut self.config.rf_state_timeout_s)
                            .speed(1)
                            .range(0.0..=600.0),
                    );
                    ui.end_row();

                    ui.label("Detune Tolerance (Hz)");
                    ui.add(DragValue::new(&mut self.config.detune_tolerance_hz).speed(1));
                    ui.end_row();

                    ui.label("Simulated ACON (MV)");
                    ui.add(DragValue::new(&mut self.config.sim_acon).speed(0.1));
                    ui.checkbox(&mut self.config.sim_online, "Online");
                    ui.end_row();

                    //Fault codes
                    let table_render_text: String = match &self.config.fault_code_path {
                        Some(p) => p.to_string_lossy().to_string(),
                        None => String::from("None"),
                    };
                    ui.label(format!("Fault codes: {table_render_text}"));
                    if ui.button("Open...").clicked() {
                        if let Some(path) = FileDialog::new()
                            .set_directory(start_directory())
                            .add_filter("CSV file", &["csv", "CSV", "txt"])
                            .pick_file()
                        {
                            self.config.fault_code_path = Some(path);
                        }
                    }
                    ui.end_row();
                });
            });

            //Requests
            ui.separator();
            ui.label(RichText::new("Requests").color(Color32::LIGHT_BLUE).size(18.0));
            ui.add_enabled_ui(idle, |ui| {
                ui.horizontal(|ui| {
                    ui.checkbox(&mut self.requests.ssa_cal, "SSA Calibration");
                    ui.checkbox(&mut self.requests.auto_tune, "Auto Tune");
                    ui.checkbox(&mut self.requests.cav_char, "Characterization");
                    ui.checkbox(&mut self.requests.rf_ramp, "RF Ramp");
                });
            });

            //Controls
            // Setup and shutdown can only start when nothing is running
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(idle, eframe::egui::Button::new("Set Up"))
                    .clicked()
                {
                    spdlog::info!("Starting setup...");
                    self.start_worker(false);
                }
                if ui
                    .add_enabled(idle, eframe::egui::Button::new("Shut Down"))
                    .clicked()
                {
                    spdlog::info!("Starting shutdown...");
                    self.start_worker(true);
                }
                if ui
                    .add_enabled(!idle, eframe::egui::Button::new("Abort"))
                    .clicked()
                {
                    self.abort();
                }
            });

            //Progress
            ui.separator();
            let title = match &self.setup {
                Some(setup) => format!("{} Status", setup.cavity),
                None => String::from("Status"),
            };
            ui.label(RichText::new(title).color(Color32::LIGHT_BLUE).size(18.0));
            let state = match self.snapshot.status {
                Some(status) => status.to_string(),
                None => String::from("Unknown"),
            };
            ui.add(
                ProgressBar::new(self.snapshot.fraction())
                    .text(format!(
                        "{} - {}%",
                        state,
                        self.snapshot.progress.clamp(0.0, 100.0) as i32
                    ))
                    .fill(status_color(self.snapshot.status)),
            );
            ui.label(&self.snapshot.message);

            //Decoder
            ui.separator();
            ui.horizontal(|ui| {
                ui.label("Fault code");
                ui.text_edit_singleline(&mut self.fault_code);
                if ui.button("Decode").clicked() {
                    self.decode_fault();
                }
            });
            if !self.decoded.is_empty() {
                ui.label(&self.decoded);
            }

            ctx.request_repaint_after(std::time::Duration::from_millis(250));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_edit_marks_cavity_stale() {
        let loaded = Config::default();
        assert!(cavity_is_stale(None, &loaded));
        assert!(!cavity_is_stale(Some(&loaded), &loaded.clone()));

        let mut edited = loaded.clone();
        edited.cavity = 5;
        assert!(cavity_is_stale(Some(&loaded), &edited));

        let mut edited = loaded.clone();
        edited.rf_state_timeout_s += 1.0;
        assert!(cavity_is_stale(Some(&loaded), &edited));
    }
}
