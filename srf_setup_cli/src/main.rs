use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use libsrf_setup::config::Config;
use libsrf_setup::decarad::Decarad;
use libsrf_setup::error::LauncherError;
use libsrf_setup::fault_codes::FaultCodeTable;
use libsrf_setup::launcher;
use libsrf_setup::setup_object::SetupPvs;
use libsrf_setup::simulation::{install_decarad, simulate_cavity, simulate_cryomodule};
use libsrf_setup::status::RequestFlags;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = match serde_yaml::to_string(&config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Could not serialize template config: {e}");
            return;
        }
    };
    match File::create(path) {
        Ok(mut file) => {
            if let Err(e) = file.write_all(yaml_str.as_bytes()) {
                log::error!("Failed to write yaml data to file: {e}");
            }
        }
        Err(e) => log::error!("Could not create template config file: {e}"),
    }
}

fn request_args() -> [Arg; 4] {
    [
        Arg::new("ssa-cal")
            .long("ssa-cal")
            .action(ArgAction::SetTrue)
            .help("Calibrate the SSA"),
        Arg::new("tune")
            .long("tune")
            .action(ArgAction::SetTrue)
            .help("Tune the cavity to resonance"),
        Arg::new("char")
            .long("char")
            .action(ArgAction::SetTrue)
            .help("Characterize the cavity"),
        Arg::new("ramp")
            .long("ramp")
            .action(ArgAction::SetTrue)
            .help("Ramp RF to the operating amplitude"),
    ]
}

/// Requests from the command line. Asking for nothing means asking for everything.
fn parse_requests(matches: &ArgMatches) -> RequestFlags {
    let requests = RequestFlags {
        ssa_cal: matches.get_flag("ssa-cal"),
        auto_tune: matches.get_flag("tune"),
        cav_char: matches.get_flag("char"),
        rf_ramp: matches.get_flag("ramp"),
    };
    if requests == RequestFlags::default() {
        RequestFlags::all()
    } else {
        requests
    }
}

/// Drive a progress bar from the status PVs until the worker finishes.
///
/// With `abort_after` set, an abort is requested once that much time has passed.
fn follow_progress<T>(
    pb: &ProgressBar,
    pvs: &SetupPvs,
    handle: std::thread::JoinHandle<T>,
    abort_after: Option<Duration>,
) -> Option<T> {
    let start = Instant::now();
    let mut abort_sent = false;
    loop {
        std::thread::sleep(POLL_INTERVAL);
        match pvs.snapshot() {
            Ok(snapshot) => {
                pb.set_position(snapshot.progress.clamp(0.0, 100.0) as u64);
                pb.set_message(snapshot.message);
            }
            Err(e) => log::error!("{e}"),
        }

        if !abort_sent && abort_after.is_some_and(|after| start.elapsed() >= after) {
            abort_sent = true;
            if let Err(e) = pvs.trigger_abort() {
                log::error!("Abort failed: {e}");
            }
        }

        if handle.is_finished() {
            return match handle.join() {
                Ok(result) => Some(result),
                Err(_) => {
                    log::error!("Failed to join setup task!");
                    None
                }
            };
        }
    }
}

fn run_cavity(
    config: Config,
    requests: RequestFlags,
    shutdown: bool,
    abort_after: Option<Duration>,
    pb: &ProgressBar,
) {
    let (_pvs, mut setup) = match simulate_cavity(&config) {
        Ok(sim) => sim,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Cavity: {}", setup.cavity);
    log::info!("Requests: {requests:?}");
    if let Err(e) = launcher::setup_cavity(&setup, &requests, shutdown) {
        log::error!("Launching failed with error: {e}");
        return;
    }

    let status_pvs = setup.pvs.clone();
    // Spawn the task!
    let handle = std::thread::spawn(move || {
        let result = launcher::run_requested(&mut setup);
        (result, setup.pvs.snapshot())
    });

    match follow_progress(pb, &status_pvs, handle, abort_after) {
        Some((Ok(_), Ok(snapshot))) => {
            log::info!("Final status: {:?}", snapshot.status);
            log::info!("Final message: {}", snapshot.message);
        }
        Some((Err(e), _)) => log::error!("Setup failed with error: {e}"),
        Some((_, Err(e))) => log::error!("Could not read final status: {e}"),
        None => (),
    }
}

fn run_cryomodule(config: Config, requests: RequestFlags, shutdown: bool, pb: &ProgressBar) {
    let (_pvs, mut cryomodule) = match simulate_cryomodule(&config) {
        Ok(sim) => sim,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Cryomodule: {cryomodule}");
    log::info!("Requests: {requests:?}");
    let launched = cryomodule
        .pvs
        .set_requests(&requests)
        .map_err(LauncherError::from)
        .and_then(|_| {
            if shutdown {
                cryomodule.trigger_shutdown()
            } else {
                cryomodule.trigger_setup()
            }
        });
    if let Err(e) = launched {
        log::error!("Launching failed with error: {e}");
        return;
    }

    // The bar follows the last cavity; cavities run one after the other
    let status_pvs = match cryomodule.cavities().last() {
        Some(setup) => setup.pvs.clone(),
        None => return,
    };
    let handle = std::thread::spawn(move || launcher::run_cryomodule_requests(&mut cryomodule));

    match follow_progress(pb, &status_pvs, handle, None) {
        Some(Ok(count)) => log::info!("Ran {count} cavities"),
        Some(Err(e)) => log::error!("Cryomodule setup failed with error: {e}"),
        None => (),
    }
}

fn decode(config: &Config, code: &str) {
    let path = match &config.fault_code_path {
        Some(p) => p,
        None => {
            log::error!("No fault_code_path in the configuration");
            return;
        }
    };
    let table = match FaultCodeTable::from_path(path) {
        Ok(t) => t,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    match table.lookup(code) {
        Some(row) => {
            log::info!("{}: {}", row.tlc, row.short_desc);
            log::info!("Description: {}", row.long_desc);
            log::info!("Corrective action: {}", row.corrective_action);
        }
        None => log::warn!("No fault code {code} in {} entries", table.len()),
    }
}

/// Seed the simulated heads with `reading` and report the doses the decarad computes
fn dose(config: &Config, number: u8, reading: f64) {
    let pvs = Arc::new(libsrf_setup::pv::SimulatedPvs::new());
    let decarad = match Decarad::new(number, pvs.clone(), config.decarad_background) {
        Ok(d) => d,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    install_decarad(&pvs, &decarad, reading);
    match (decarad.max_dose(), decarad.max_avg_dose()) {
        (Ok(max), Ok(avg)) => {
            log::info!("Decarad {number} max dose: {max}");
            log::info!("Decarad {number} max normalized dose: {avg}");
        }
        (Err(e), _) | (_, Err(e)) => log::error!("{e}"),
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("srf_setup_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(
            Command::new("setup")
                .about("Set up the configured cavity on the simulated linac")
                .args(request_args())
                .arg(
                    Arg::new("abort-after")
                        .long("abort-after")
                        .value_parser(clap::value_parser!(f64))
                        .help("Request an abort after this many seconds"),
                ),
        )
        .subcommand(Command::new("shutdown").about("Turn the configured cavity off"))
        .subcommand(
            Command::new("cryomodule")
                .about("Launch every cavity of the configured cryomodule")
                .args(request_args())
                .arg(
                    Arg::new("off")
                        .long("off")
                        .action(ArgAction::SetTrue)
                        .help("Shut the cavities down instead"),
                ),
        )
        .subcommand(
            Command::new("decode")
                .about("Look up a fault code in the configured fault table")
                .arg(Arg::new("code").required(true)),
        )
        .subcommand(
            Command::new("dose")
                .about("Read the simulated decarad heads")
                .arg(
                    Arg::new("decarad")
                        .short('d')
                        .long("decarad")
                        .value_parser(clap::value_parser!(u8))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("reading")
                        .short('r')
                        .long("reading")
                        .value_parser(clap::value_parser!(f64))
                        .required(true)
                        .help("Raw dose rate to seed every head with"),
                ),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A configuration path is required (--path)");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Cryomodule: {}", config.cryomodule);
    log::info!("Cavity: {}", config.cavity);
    log::info!("SSA Drive Max: {}", config.ssa_drive_max);
    log::info!("RF State Timeout: {} s", config.rf_state_timeout_s);

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos:>3}% {msg}") {
        pb.set_style(style);
    }

    match matches.subcommand() {
        Some(("setup", sub)) => {
            let abort_after = match sub.get_one::<f64>("abort-after") {
                Some(secs) => match Duration::try_from_secs_f64(*secs) {
                    Ok(after) => Some(after),
                    Err(e) => {
                        log::error!("Bad --abort-after value {secs}: {e}");
                        return;
                    }
                },
                None => None,
            };
            run_cavity(config, parse_requests(sub), false, abort_after, &pb)
        }
        Some(("shutdown", _)) => run_cavity(config, RequestFlags::default(), true, None, &pb),
        Some(("cryomodule", sub)) => {
            run_cryomodule(config, parse_requests(sub), sub.get_flag("off"), &pb)
        }
        Some(("decode", sub)) => {
            if let Some(code) = sub.get_one::<String>("code") {
                decode(&config, code);
            }
        }
        Some(("dose", sub)) => {
            let number = sub.get_one::<u8>("decarad").copied().unwrap_or(1);
            match sub.get_one::<f64>("reading") {
                Some(reading) => dose(&config, number, *reading),
                None => log::error!("A raw reading is required (--reading)"),
            }
        }
        _ => log::warn!("Nothing to do."),
    }

    pb.finish();

    log::info!("Done.");
}
