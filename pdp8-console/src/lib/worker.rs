use log::{debug, error, info};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::config::{parse_cycle_budget, ConsoleConfig};
use crate::dispatch::CommandDispatcher;
use crate::poll::AutoRunLoop;
use crate::status::Channel;
use crate::transport::Transport;
use crate::upload::ProgramImage;

/// Operator requests, as raised by the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Reset,
    Step,
    Run,
    Halt,
    RefreshRegisters,
    SendInput(String),
    SetCycles(String),
    SetSwitchRegister(String),
    Upload(ProgramImage),
    ToggleAutoRun,
}

/// Messages understood by the worker thread.
enum WorkerMessage {
    Action(Action),
    JoinThread, // Only the worker itself may send this.
}

/// A cloneable handle for queueing actions on a running worker.
#[derive(Clone)]
pub struct ActionSender(Sender<WorkerMessage>);

impl ActionSender {
    /// Queue an action. Returns false if the worker is gone.
    pub fn send(&self, action: Action) -> bool {
        self.0.send(WorkerMessage::Action(action)).is_ok()
    }
}

/// State owned by the worker thread while it runs.
struct WorkerState<T> {
    auto_run: AutoRunLoop<T>,
    auto_run_enabled: bool,
    run_cycles: u32,
}

/// Performs operator actions one at a time on a background thread, so a slow
/// simulator never blocks the console. Also owns the auto-run loop.
pub struct CommandWorker<T> {
    action_tx: Sender<WorkerMessage>,
    action_rx: Option<Receiver<WorkerMessage>>,
    dispatcher: CommandDispatcher<T>,
    state: Option<WorkerState<T>>,
    thread_handle: Option<thread::JoinHandle<(Receiver<WorkerMessage>, WorkerState<T>)>>,
}

impl<T: Transport + 'static> CommandWorker<T> {
    pub fn new(dispatcher: CommandDispatcher<T>, config: &ConsoleConfig) -> Self {
        let (action_tx, action_rx) = mpsc::channel();
        let auto_run = AutoRunLoop::new(dispatcher.clone(), config.poll_interval);
        CommandWorker {
            action_tx,
            action_rx: Some(action_rx),
            dispatcher,
            state: Some(WorkerState {
                auto_run,
                auto_run_enabled: config.auto_run,
                run_cycles: config.run_cycles,
            }),
            thread_handle: None,
        }
    }

    pub fn sender(&self) -> ActionSender {
        ActionSender(self.action_tx.clone())
    }

    /// Start the worker thread, and the auto-run loop if enabled. Panics if
    /// already running.
    pub fn start(&mut self) {
        let action_rx = self.action_rx.take().expect("CommandWorker was already running.");
        let mut state = self.state.take().unwrap();
        let dispatcher = self.dispatcher.clone();
        info!("Command worker starting.");

        if state.auto_run_enabled {
            state.auto_run.start();
        }
        let thread_handle = thread::spawn(move || loop {
            match action_rx.recv() {
                Ok(WorkerMessage::Action(action)) => state.perform(&dispatcher, action),
                Ok(WorkerMessage::JoinThread) | Err(_) => return (action_rx, state),
            }
        });
        self.thread_handle = Some(thread_handle);
    }

    /// Stop the worker after everything already queued has been performed,
    /// then stop the auto-run loop. Panics if not running.
    pub fn stop(&mut self) {
        let _ = self.action_tx.send(WorkerMessage::JoinThread);
        let thread_handle = self.thread_handle.take().expect("CommandWorker was already stopped.");
        let (action_rx, mut state) = match thread_handle.join() {
            Ok(parts) => parts,
            Err(_) => {
                error!("Command worker thread terminated with error.");
                return;
            }
        };
        state.auto_run.stop();
        self.action_rx = Some(action_rx);
        self.state = Some(state);
        info!("Command worker stopped.");
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }
}

impl<T: Transport + 'static> WorkerState<T> {
    fn perform(&mut self, dispatcher: &CommandDispatcher<T>, action: Action) {
        debug!("Performing {:?}.", action);
        match action {
            Action::Reset => {
                dispatcher.reset();
            }
            Action::Step => {
                dispatcher.step();
            }
            Action::Run => {
                dispatcher.run(self.run_cycles);
            }
            Action::Halt => {
                dispatcher.halt();
            }
            Action::RefreshRegisters => {
                dispatcher.refresh_registers();
            }
            Action::SendInput(chars) => {
                dispatcher.send_input(&chars);
            }
            Action::SetCycles(text) => {
                self.run_cycles = parse_cycle_budget(&text);
                dispatcher.status().info(
                    Channel::Execution, format!("Cycle budget set to {}.", self.run_cycles));
            }
            Action::SetSwitchRegister(octal) => {
                dispatcher.set_switch_register(&octal);
            }
            Action::Upload(image) => {
                dispatcher.upload(&image);
            }
            Action::ToggleAutoRun => {
                self.auto_run_enabled = !self.auto_run_enabled;
                if self.auto_run_enabled {
                    self.auto_run.start();
                    dispatcher.status().info(Channel::Execution, "Auto-run started.");
                } else {
                    self.auto_run.stop();
                    dispatcher.status().info(Channel::Execution, "Auto-run stopped.");
                }
            }
        }
    }
}
