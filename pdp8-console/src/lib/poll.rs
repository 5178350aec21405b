use log::{debug, error, info, trace};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, RecvTimeoutError, Sender},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use crate::dispatch::CommandDispatcher;
use crate::transport::Transport;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    /// The register fetch failed; nothing was applied.
    Abandoned,
    /// The machine reported itself halted; output was refreshed only.
    Halted,
    /// A step was issued and output refreshed.
    Stepped,
    /// The step failed; output was still refreshed.
    StepFailed,
}

/// Commands that can be sent to the loop thread.
enum LoopCommand {
    JoinThread,
}

/// The background synchronisation loop. While running, every `interval` it
/// reads the registers, advances the machine by one cycle unless it is
/// halted, and pulls new output.
pub struct AutoRunLoop<T> {
    dispatcher: CommandDispatcher<T>,
    interval: Duration,
    ticking: Arc<AtomicBool>,
    command_tx: Option<Sender<LoopCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl<T: Transport + 'static> AutoRunLoop<T> {
    pub fn new(dispatcher: CommandDispatcher<T>, interval: Duration) -> Self {
        AutoRunLoop {
            dispatcher,
            interval,
            ticking: Arc::new(AtomicBool::new(false)),
            command_tx: None,
            thread_handle: None,
        }
    }

    /// Start ticking on a separate thread. Does nothing if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let dispatcher = self.dispatcher.clone();
        let ticking = Arc::clone(&self.ticking);
        let interval = self.interval;
        info!("Auto-run starting with a {:?} interval.", interval);

        let thread_handle = thread::spawn(move || {
            let mut deadline = Instant::now() + interval;
            loop {
                // Wait for a command until the next tick is due, then tick.
                match cmd_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Err(RecvTimeoutError::Timeout) => {
                        let outcome = tick(&dispatcher, &ticking);
                        trace!("Tick: {:?}.", outcome);
                        deadline = next_deadline(deadline, interval, Instant::now());
                    }
                    Ok(LoopCommand::JoinThread) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        });
        self.thread_handle = Some(thread_handle);
        self.command_tx = Some(cmd_tx);
    }

    /// Run one tick on the calling thread.
    pub fn tick(&self) -> TickOutcome {
        tick(&self.dispatcher, &self.ticking)
    }
}

impl<T> AutoRunLoop<T> {
    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Stop ticking. No new tick starts after this is called; a tick already
    /// in progress runs to completion before this returns.
    pub fn stop(&mut self) {
        if let Some(cmd_tx) = self.command_tx.take() {
            let _ = cmd_tx.send(LoopCommand::JoinThread);
        }
        if let Some(thread_handle) = self.thread_handle.take() {
            if thread_handle.join().is_err() {
                error!("Auto-run thread terminated with error.");
            }
            info!("Auto-run stopped.");
        }
    }
}

impl<T> Drop for AutoRunLoop<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The first slot on the `interval` grid after `now`. Slots missed while a
/// slow tick ran are dropped, not made up.
fn next_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next > now {
        return next;
    }
    let behind = now.duration_since(next).as_nanos();
    let missed = behind / interval.as_nanos() + 1;
    next + interval * missed as u32
}

/// Single-flight wrapper: a tick requested while another is in progress is
/// skipped rather than queued.
fn tick<T: Transport>(dispatcher: &CommandDispatcher<T>, ticking: &AtomicBool) -> TickOutcome {
    if ticking.swap(true, Ordering::AcqRel) {
        debug!("Previous tick still in progress; skipping.");
        return TickOutcome::Skipped;
    }
    let outcome = run_tick(dispatcher);
    ticking.store(false, Ordering::Release);
    outcome
}

fn run_tick<T: Transport>(dispatcher: &CommandDispatcher<T>) -> TickOutcome {
    // Every exchange here is best-effort: failures are logged and the next
    // tick tries again.
    let snapshot = match dispatcher.fetch_registers() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!("Tick abandoned: {}", e);
            return TickOutcome::Abandoned;
        }
    };
    dispatcher.mirror().apply(&snapshot);

    let outcome = if snapshot.halted == Some(true) {
        TickOutcome::Halted
    } else {
        // The step must finish before output is read, so anything it printed
        // shows up in this tick.
        match dispatcher.trace_step() {
            Ok(()) => TickOutcome::Stepped,
            Err(e) => {
                debug!("Auto-run step failed: {}", e);
                TickOutcome::StepFailed
            }
        }
    };

    dispatcher.refresh_output();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    use ntest::timeout;

    use crate::error::ConsoleError;
    use crate::init_test_logging;
    use crate::output::{OutputAccumulator, Stream};
    use crate::registers::{RegisterMirror, RegisterSnapshot};
    use crate::status::{Channel, StatusReporter};
    use crate::transport::*;

    struct LoopFixture {
        transport: Arc<MockTransport>,
        auto_run: AutoRunLoop<MockTransport>,
    }

    impl LoopFixture {
        fn new(interval: Duration) -> Self {
            init_test_logging();

            let transport = Arc::new(MockTransport::new());
            transport.respond(PATH_TELEPRINTER, Ok(r#"{"text": ""}"#.into()));
            transport.respond(PATH_PRINTER, Ok(r#"{"text": ""}"#.into()));
            let dispatcher = CommandDispatcher::new(
                Arc::clone(&transport),
                RegisterMirror::new(),
                OutputAccumulator::new(),
                StatusReporter::new());
            LoopFixture {
                transport,
                auto_run: AutoRunLoop::new(dispatcher, interval),
            }
        }

        fn dispatcher(&self) -> &CommandDispatcher<MockTransport> {
            &self.auto_run.dispatcher
        }
    }

    #[test]
    fn test_halted_tick_does_not_step() {
        let fixture = LoopFixture::new(Duration::from_millis(100));
        fixture.transport.respond(PATH_REGISTERS, Ok(
            r#"{"pc": "0203", "ac": "0000", "link": 0, "halted": true}"#.into()));

        assert_eq!(fixture.auto_run.tick(), TickOutcome::Halted);
        assert_eq!(fixture.transport.count(PATH_TRACE), 0);
        assert_eq!(fixture.transport.paths(),
                   vec!["/regs", "/output/teleprinter", "/output/printer"]);
        assert_eq!(fixture.dispatcher().mirror().current_halt_state(), Some(true));
    }

    #[test]
    fn test_running_tick_steps_before_output() {
        let fixture = LoopFixture::new(Duration::from_millis(100));
        fixture.transport.respond(PATH_REGISTERS, Ok(r#"{"pc": "0200", "halted": false}"#.into()));
        fixture.transport.respond(PATH_TRACE, Ok(r#"{"steps": [], "halted": false}"#.into()));
        fixture.transport.respond_once(PATH_TELEPRINTER, Ok(r#"{"text": "*"}"#.into()));

        assert_eq!(fixture.auto_run.tick(), TickOutcome::Stepped);
        assert_eq!(fixture.transport.paths(), vec![
            "/regs", "/trace?cycles=1", "/output/teleprinter", "/output/printer"]);
        assert_eq!(fixture.dispatcher().output().contents(Stream::Teleprinter), "*");
    }

    #[test]
    fn test_unreported_halt_flag_steps() {
        let fixture = LoopFixture::new(Duration::from_millis(100));
        fixture.transport.respond(PATH_REGISTERS, Ok(
            r#"{"pc": "0200", "ac": "0000", "link": 0, "cycles": 7}"#.into()));

        assert_eq!(fixture.auto_run.tick(), TickOutcome::Stepped);
        assert_eq!(fixture.transport.count(PATH_TRACE), 1);
    }

    #[test]
    fn test_step_snapshot_applied() {
        let fixture = LoopFixture::new(Duration::from_millis(100));
        fixture.transport.respond(PATH_REGISTERS, Ok(r#"{"pc": "0200"}"#.into()));
        fixture.transport.respond(PATH_TRACE, Ok(
            r#"{"registers": {"pc": "0201", "halted": true}}"#.into()));

        fixture.auto_run.tick();
        let regs = fixture.dispatcher().mirror().current();
        assert_eq!(regs.pc.as_deref(), Some("0201"));
        assert_eq!(regs.halted, Some(true));
    }

    #[test]
    fn test_failed_register_fetch_abandons_tick() {
        let fixture = LoopFixture::new(Duration::from_millis(100));
        fixture.dispatcher().output().append(Stream::Printer, Some("EARLIER"));
        fixture.transport.respond(PATH_REGISTERS, Err(
            ConsoleError::ServerRejected("503 SERVICE UNAVAILABLE".into())));
        fixture.transport.respond(PATH_PRINTER, Ok(r#"{"text": "LATER"}"#.into()));

        assert_eq!(fixture.auto_run.tick(), TickOutcome::Abandoned);
        assert_eq!(fixture.transport.paths(), vec!["/regs"]);
        assert_eq!(fixture.dispatcher().mirror().current(), RegisterSnapshot::default());
        assert_eq!(fixture.dispatcher().output().contents(Stream::Printer), "EARLIER");
        assert_eq!(fixture.dispatcher().status().get(Channel::Execution), None);
        assert_eq!(fixture.dispatcher().status().get(Channel::Load), None);
    }

    #[test]
    fn test_malformed_registers_abandon_tick() {
        let fixture = LoopFixture::new(Duration::from_millis(100));
        fixture.transport.respond(PATH_REGISTERS, Ok("<html>".into()));

        assert_eq!(fixture.auto_run.tick(), TickOutcome::Abandoned);
        assert_eq!(fixture.transport.count(PATH_TRACE), 0);
    }

    #[test]
    fn test_failed_step_still_refreshes_output() {
        let fixture = LoopFixture::new(Duration::from_millis(100));
        fixture.transport.respond(PATH_REGISTERS, Ok(r#"{"halted": false}"#.into()));
        fixture.transport.respond(PATH_TRACE, Err(ConsoleError::Transport("timed out".into())));

        assert_eq!(fixture.auto_run.tick(), TickOutcome::StepFailed);
        assert_eq!(fixture.transport.count(PATH_TELEPRINTER), 1);
        assert_eq!(fixture.transport.count(PATH_PRINTER), 1);
        assert_eq!(fixture.dispatcher().status().get(Channel::Execution), None);
    }

    #[test]
    fn test_overlapping_tick_skipped() {
        let fixture = LoopFixture::new(Duration::from_millis(100));
        fixture.auto_run.ticking.store(true, Ordering::Release);

        assert_eq!(fixture.auto_run.tick(), TickOutcome::Skipped);
        assert!(fixture.transport.requests().is_empty());

        fixture.auto_run.ticking.store(false, Ordering::Release);
        fixture.transport.respond(PATH_REGISTERS, Ok(r#"{"halted": true}"#.into()));
        assert_eq!(fixture.auto_run.tick(), TickOutcome::Halted);
    }

    #[test]
    fn test_next_deadline_keeps_cadence() {
        let interval = Duration::from_millis(100);
        let start = Instant::now();

        // A quick tick leaves the grid untouched.
        let now = start + Duration::from_millis(30);
        assert_eq!(next_deadline(start, interval, now), start + interval);

        // A slow tick that overran a slot lands on the next one after it.
        let now = start + Duration::from_millis(250);
        assert_eq!(next_deadline(start, interval, now), start + Duration::from_millis(300));

        // Landing exactly on a slot still moves past it.
        let now = start + Duration::from_millis(200);
        assert_eq!(next_deadline(start, interval, now), start + Duration::from_millis(300));
    }

    #[test]
    #[timeout(2000)]
    fn test_start_stop() {
        let mut fixture = LoopFixture::new(Duration::from_millis(5));
        fixture.transport.respond(PATH_REGISTERS, Ok(r#"{"halted": true}"#.into()));

        assert!(!fixture.auto_run.is_running());
        fixture.auto_run.start();
        assert!(fixture.auto_run.is_running());
        thread::sleep(Duration::from_millis(100));
        fixture.auto_run.stop();
        assert!(!fixture.auto_run.is_running());

        let polls = fixture.transport.count(PATH_REGISTERS);
        assert!(polls >= 2, "only {} polls", polls);
        // Every tick that started also finished.
        assert_eq!(fixture.transport.count(PATH_PRINTER), polls);

        // Nothing happens after stop.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(fixture.transport.count(PATH_REGISTERS), polls);
    }

    #[test]
    #[timeout(2000)]
    fn test_restart() {
        let mut fixture = LoopFixture::new(Duration::from_millis(5));
        fixture.transport.respond(PATH_REGISTERS, Ok(r#"{"halted": true}"#.into()));

        fixture.auto_run.start();
        fixture.auto_run.start();
        fixture.auto_run.stop();
        fixture.auto_run.stop();
        fixture.transport.clear_log();

        fixture.auto_run.start();
        thread::sleep(Duration::from_millis(50));
        fixture.auto_run.stop();
        assert!(fixture.transport.count(PATH_REGISTERS) >= 1);
    }
}
