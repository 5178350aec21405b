use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::MAX_CYCLES;
use crate::error::{ConsoleError, ConsoleResult};
use crate::output::{OutputAccumulator, OutputFragment, Stream};
use crate::registers::{RegisterMirror, RegisterSnapshot};
use crate::status::{Channel, StatusReporter};
use crate::transport::*;

/// Control commands that go through the dispatch contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    Continue,
    Halt,
    Trace { cycles: Option<u32> },
    KeyboardInput(String),
    SetSwitchRegister(String),
}

impl Command {
    /// Lower the command to the request that carries it.
    pub fn request(&self) -> Request {
        match self {
            Command::Reset => Request::post(PATH_RESET, Body::Empty),
            Command::Continue => Request::post(PATH_CONTINUE, Body::Empty),
            Command::Halt => Request::post(PATH_HALT, Body::Empty),
            Command::Trace { cycles: None } => Request::post(PATH_TRACE, Body::Empty),
            Command::Trace { cycles: Some(n) } => Request::post(
                format!("{}?cycles={}", PATH_TRACE, (*n).clamp(1, MAX_CYCLES)), Body::Empty),
            Command::KeyboardInput(chars) => Request::post(
                PATH_KEYBOARD, Body::Json(json!({ "chars": chars }))),
            // A leading zero makes the service read the value as octal.
            Command::SetSwitchRegister(octal) => Request::put(
                PATH_SWITCH, Body::Json(json!({ "val": format!("0{}", octal) }))),
        }
    }
}

/// What a command endpoint answers with. Only the embedded register snapshot
/// matters to the console.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub registers: Option<RegisterSnapshot>,
}

impl Acknowledgement {
    /// Parse an acknowledgement body. Anything unparseable counts as `{}`.
    pub fn parse(body: &str) -> Self {
        if body.trim().is_empty() {
            return Acknowledgement::default();
        }
        serde_json::from_str(body).unwrap_or_else(|e| {
            debug!("Treating unparseable acknowledgement as empty: {}", e);
            Acknowledgement::default()
        })
    }
}

/// Sends commands to the simulator and reconciles the shared state with what
/// comes back.
pub struct CommandDispatcher<T> {
    transport: Arc<T>,
    mirror: RegisterMirror,
    output: OutputAccumulator,
    status: StatusReporter,
}

impl<T> Clone for CommandDispatcher<T> {
    fn clone(&self) -> Self {
        CommandDispatcher {
            transport: Arc::clone(&self.transport),
            mirror: self.mirror.clone(),
            output: self.output.clone(),
            status: self.status.clone(),
        }
    }
}

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(transport: Arc<T>,
               mirror: RegisterMirror,
               output: OutputAccumulator,
               status: StatusReporter) -> Self {
        CommandDispatcher {
            transport,
            mirror,
            output,
            status,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mirror(&self) -> &RegisterMirror {
        &self.mirror
    }

    pub fn output(&self) -> &OutputAccumulator {
        &self.output
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    /// Send one command and reconcile its result. Failures end up on the
    /// execution status line; the return value says whether it succeeded.
    pub fn dispatch(&self, command: &Command) -> bool {
        self.status.info(Channel::Execution, "Sending command…");
        match self.execute(command) {
            Ok(()) => {
                self.status.info(Channel::Execution, "Command dispatched.");
                true
            }
            Err(e) => {
                warn!("{:?} failed: {}", command, e);
                self.status.error(Channel::Execution, format!("Command failed: {}", e));
                false
            }
        }
    }

    fn execute(&self, command: &Command) -> ConsoleResult<()> {
        let request = command.request();
        debug!("Dispatching {}.", request);
        let body = self.transport.send(&request)?;

        // Prefer the snapshot the command itself reported; a separate poll
        // could already be newer than the command's effect.
        match Acknowledgement::parse(&body).registers {
            Some(snapshot) => {
                self.mirror.apply(&snapshot);
            }
            None => {
                if let Err(e) = self.sync_registers() {
                    warn!("Register refresh after {} failed: {}", request, e);
                }
            }
        }
        self.refresh_output();
        Ok(())
    }

    pub fn reset(&self) -> bool {
        self.dispatch(&Command::Reset)
    }

    pub fn halt(&self) -> bool {
        self.dispatch(&Command::Halt)
    }

    /// Clear any halt and execute a single cycle.
    pub fn step(&self) -> bool {
        self.run(1)
    }

    /// Clear any halt and execute up to `cycles` cycles.
    pub fn run(&self, cycles: u32) -> bool {
        if let Err(e) = self.transport.send(&Command::Continue.request()) {
            warn!("Continue failed: {}", e);
        }
        self.dispatch(&Command::Trace { cycles: Some(cycles) })
    }

    /// Queue characters on the console keyboard. Empty input is ignored.
    pub fn send_input(&self, chars: &str) -> bool {
        if chars.is_empty() {
            return false;
        }
        let request = Command::KeyboardInput(chars.to_string()).request();
        match self.transport.send(&request) {
            Ok(_) => {
                debug!("Queued {} characters of keyboard input.", chars.chars().count());
                self.refresh_output();
                true
            }
            Err(e) => {
                warn!("Keyboard input failed: {}", e);
                self.status.error(Channel::Execution, format!("Keyboard input failed: {}", e));
                false
            }
        }
    }

    /// Set the front-panel switch register from 1 to 4 octal digits.
    pub fn set_switch_register(&self, octal: &str) -> bool {
        match validate_switch_register(octal) {
            Ok(octal) => self.dispatch(&Command::SetSwitchRegister(octal)),
            Err(e) => {
                self.status.error(Channel::Execution, format!("Command failed: {}", e));
                false
            }
        }
    }

    /// Operator-requested register refresh, reported on the execution line.
    pub fn refresh_registers(&self) -> bool {
        match self.sync_registers() {
            Ok(_) => {
                self.status.info(Channel::Execution, "Registers refreshed.");
                true
            }
            Err(e) => {
                self.status.error(Channel::Execution,
                                  format!("Unable to refresh registers: {}", e));
                false
            }
        }
    }

    /// Fetch the current registers without applying them.
    pub fn fetch_registers(&self) -> ConsoleResult<RegisterSnapshot> {
        let body = self.transport.send(&Request::get(PATH_REGISTERS))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch the current registers and apply them to the mirror.
    pub fn sync_registers(&self) -> ConsoleResult<RegisterSnapshot> {
        let snapshot = self.fetch_registers()?;
        Ok(self.mirror.apply(&snapshot))
    }

    /// Pull new output from both streams. Each stream is best-effort.
    pub fn refresh_output(&self) {
        for stream in Stream::ALL {
            if let Err(e) = self.fetch_output(stream) {
                debug!("Fetching {} output failed: {}", stream, e);
            }
        }
    }

    fn fetch_output(&self, stream: Stream) -> ConsoleResult<bool> {
        let body = self.transport.send(&Request::get(stream.path()))?;
        let fragment: OutputFragment = serde_json::from_str(&body)?;
        Ok(self.output.append(stream, fragment.text.as_deref()))
    }

    /// Advance the machine by one cycle without touching the status lines.
    /// Used by the auto-run loop, which re-reads the registers every tick
    /// anyway, so only an embedded snapshot is applied.
    pub fn trace_step(&self) -> ConsoleResult<()> {
        let body = self.transport.send(&Command::Trace { cycles: Some(1) }.request())?;
        if let Some(snapshot) = Acknowledgement::parse(&body).registers {
            self.mirror.apply(&snapshot);
        }
        Ok(())
    }
}

fn validate_switch_register(text: &str) -> ConsoleResult<String> {
    let text = text.trim();
    validate_or_error!(!text.is_empty() && text.len() <= 4
                           && text.chars().all(|c| ('0'..='7').contains(&c)),
                       "switch register must be 1 to 4 octal digits");
    info!("Setting switch register to {}.", text);
    Ok(text.to_string())
}
