use clap::{Arg, ArgAction, ArgMatches, Command, value_parser, ValueEnum};
use pdp8_console::{effective_cycles, ConsoleConfig, DEFAULT_SERVER_URL};
use simplelog::{ConfigBuilder, LevelFilter, LevelPadding, WriteLogger};
use std::fs::{self, File};
use std::path::PathBuf;
use std::time::Duration;
use time::macros::format_description;

const SERVER_URL: &str = "server-url";
const POLL_INTERVAL: &str = "poll-interval";
const REQUEST_TIMEOUT: &str = "request-timeout";
const RUN_CYCLES: &str = "run-cycles";
const NO_AUTO_RUN: &str = "no-auto-run";
const INITIAL_IMAGE: &str = "initial-image";
const LOG_PATH: &str = "log-path";
const LOG_LEVEL: &str = "log-level";

/// Possible log levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone, ValueEnum)]
enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
}

fn cli() -> Command {
    // Hack to make the build dirty when the toml changes.
    include_str!("../../Cargo.toml");

    clap::command!()
        .max_term_width(100)
        .after_help("\
This is the PDP-8 operator console. It connects to a running PDP-8 simulator \
service over HTTP and takes over your terminal, showing the machine registers \
and the teleprinter and printer output. While auto-run is on, the console \
steps the machine one cycle at a time whenever it is not halted. Press q or \
Alt+Shift+Q to exit.")
        .arg(Arg::new(SERVER_URL)
            .help("Base URL of the simulator service.")
            .short('s')
            .long("server")
            .action(ArgAction::Set)
            .default_value(DEFAULT_SERVER_URL))
        .arg(Arg::new(POLL_INTERVAL)
            .help("Auto-run cadence in milliseconds.")
            .long("interval")
            .action(ArgAction::Set)
            .value_parser(value_parser!(u64).range(1..))
            .default_value("100"))
        .arg(Arg::new(REQUEST_TIMEOUT)
            .help("Give up on any single request after this many milliseconds.")
            .long("timeout")
            .action(ArgAction::Set)
            .value_parser(value_parser!(u64).range(1..))
            .default_value("5000"))
        .arg(Arg::new(RUN_CYCLES)
            .help("Cycle budget for the run command. Values below 1 fall back \
                   to the default; large values are capped.")
            .long("cycles")
            .action(ArgAction::Set)
            .allow_negative_numbers(true)
            .value_parser(value_parser!(i64))
            .default_value("1024"))
        .arg(Arg::new(NO_AUTO_RUN)
            .help("Start with auto-run switched off.")
            .long("no-auto-run")
            .action(ArgAction::SetTrue))
        .arg(Arg::new(INITIAL_IMAGE)
            .help("Upload this S-record file before the console starts.")
            .long("load")
            .action(ArgAction::Set)
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new(LOG_PATH)
            .help("If set, a debug log will be written to the given path.")
            .short('l')
            .long("log")
            .action(ArgAction::Set))
        .arg(Arg::new(LOG_LEVEL)
            .help("Set the log level. Has no effect without \
                   specifying --log as well. Case insensitive.")
            .short('L')
            .long("log-level")
            .action(ArgAction::Set)
            .value_parser(value_parser!(LogLevel))
            .ignore_case(true)
            .default_value("TRACE"))
}

/// Build the console configuration from the command line, checking anything
/// that can be checked before the terminal is taken over.
fn config_from_args(args: &ArgMatches) -> Result<ConsoleConfig, String> {
    let server_url = args.get_one::<String>(SERVER_URL).unwrap();
    if server_url.starts_with("https://") {
        return Err(format!("'{}' needs TLS, which is not supported; use http://.", server_url));
    }
    if !server_url.starts_with("http://") {
        return Err(format!("'{}' is not an http:// URL.", server_url));
    }

    let initial_image = args.get_one::<PathBuf>(INITIAL_IMAGE).cloned();
    if let Some(path) = &initial_image {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(format!("'{}' is not a file.", path.display())),
            Err(e) => return Err(
                format!("Could not access '{}': {}", path.display(), e)),
        }
    }

    Ok(ConsoleConfig {
        server_url: server_url.clone(),
        poll_interval: Duration::from_millis(*args.get_one::<u64>(POLL_INTERVAL).unwrap()),
        request_timeout: Duration::from_millis(*args.get_one::<u64>(REQUEST_TIMEOUT).unwrap()),
        run_cycles: effective_cycles(args.get_one::<i64>(RUN_CYCLES).copied()),
        auto_run: !args.get_flag(NO_AUTO_RUN),
        initial_image,
    })
}

/// Initialise logging to the given file.
fn init_logging(logfile: File, level: LevelFilter) -> Result<(), String> {
    // The terminal belongs to the console, so logs only ever go to a file.
    let config = ConfigBuilder::new()
        .set_level_padding(LevelPadding::Right)
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_custom(format_description!(
            "[hour]:[minute]:[second].[subsecond digits:6]"))
        .add_filter_ignore_str("mio")
        .add_filter_ignore_str("ureq")
        .build();

    WriteLogger::init(level, config, logfile)
        .map_err(|e| format!("Failed to initialise logging: {}", e))
}

/// Main run function; returns an exit code.
fn run(args: ArgMatches) -> u8 {
    return match _run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    fn _run(args: ArgMatches) -> Result<(), String> {
        let config = config_from_args(&args)?;

        // Initialise logging if configured.
        if let Some(log_path) = args.get_one::<String>(LOG_PATH) {
            let logfile = File::create(log_path)
                .map_err(|e| format!("Failed to create log file: {}", e))?;
            let level = match args.get_one::<LogLevel>(LOG_LEVEL).unwrap() {
                LogLevel::TRACE => LevelFilter::Trace,
                LogLevel::DEBUG => LevelFilter::Debug,
                LogLevel::INFO => LevelFilter::Info,
            };
            init_logging(logfile, level)?;
        }

        // Run the console.
        pdp8_console::run(config)
            .map_err(|e| format!("Terminal error: {}", e))
    }
}

fn main() {
    let args = cli().get_matches();
    std::process::exit(run(args).into());
}
