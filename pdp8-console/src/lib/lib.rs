#[macro_use]
mod error;

mod config;
mod dispatch;
mod output;
mod poll;
mod registers;
mod status;
mod transport;
mod ui;
mod upload;
mod worker;

use log::info;
use std::sync::{mpsc, Arc};

pub use crate::config::{effective_cycles, parse_cycle_budget, ConsoleConfig,
                        DEFAULT_CYCLES, DEFAULT_POLL_INTERVAL_MS,
                        DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SERVER_URL, MAX_CYCLES};
pub use crate::dispatch::{Acknowledgement, Command, CommandDispatcher};
pub use crate::error::{ConsoleError, ConsoleResult};
pub use crate::output::{OutputAccumulator, Stream};
pub use crate::poll::{AutoRunLoop, TickOutcome};
pub use crate::registers::{merge, LinkValue, RegisterMirror, RegisterSnapshot};
pub use crate::status::{Channel, Status, StatusReporter, Tone};
pub use crate::transport::{Body, HttpTransport, Method, Request, Transport};
pub use crate::upload::{ProgramImage, UploadResult};
pub use crate::worker::{Action, ActionSender, CommandWorker};

/// Connect to the simulator and run the operator console until the operator
/// quits. Only terminal failures are returned; anything the simulator does
/// wrong ends up on the console's status lines.
pub fn run(config: ConsoleConfig) -> crossterm::Result<()> {
    // Create communication channels.
    let (ui_tx, ui_rx) = mpsc::channel();

    // Create components.
    let transport = Arc::new(HttpTransport::new(&config.server_url, config.request_timeout));
    let mirror = RegisterMirror::with_notifier(ui_tx.clone());
    let output = OutputAccumulator::with_notifier(ui_tx.clone());
    let status = StatusReporter::with_notifier(ui_tx.clone());
    let dispatcher = CommandDispatcher::new(
        transport,
        mirror.clone(),
        output.clone(),
        status.clone());
    info!("Console connecting to {}.", config.server_url);

    // Bring the mirror up to date before anything is drawn.
    if let Some(path) = &config.initial_image {
        dispatcher.upload(&ProgramImage::File(path.clone()));
    }
    dispatcher.refresh_registers();
    dispatcher.refresh_output();

    let mut worker = CommandWorker::new(dispatcher, &config);
    let mut ui = ui::UI::new(ui_tx, ui_rx, worker.sender(),
                             mirror, output, status, &config.server_url);

    // Run the console.
    worker.start();
    let result = ui.run();
    worker.stop();
    result
}

/// Logging setup for tests. Ignores repeated initialisation.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = simplelog::TestLogger::init(
        simplelog::LevelFilter::Trace, simplelog::Config::default());
}
