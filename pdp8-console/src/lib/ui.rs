use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    queue,
    style::{self, Color},
    terminal,
};
use log::{debug, info};
use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, RecvTimeoutError, Sender},
    Arc,
};
use std::thread;
use std::time::Duration;

use crate::output::{OutputAccumulator, Stream};
use crate::registers::{RegisterMirror, RegisterSnapshot};
use crate::status::{Channel, Status, StatusReporter, Tone};
use crate::upload::ProgramImage;
use crate::worker::{Action, ActionSender};

// UI Constants.
const TITLE: &str = "PDP-8 Operator Console";
const HELP: &str = "r reset  s step  g run  h halt  f refresh  a auto-run  \
                    i input  c cycles  w switches  u upload  q quit";
const UNKNOWN: &str = "----";
const REDRAW_INTERVAL: Duration = Duration::from_millis(500);
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Commands that get sent to the UI thread.
#[derive(Debug, PartialEq, Eq)]
pub enum UICommand {
    RegistersChanged,
    OutputAppended(Stream),
    StatusChanged(Channel),
    Key(KeyEvent),
    Quit,
}

/// Line-entry prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    Input,
    Cycles,
    Switch,
    Upload,
}

impl PromptKind {
    fn label(&self) -> &'static str {
        match self {
            PromptKind::Input => "Keyboard input",
            PromptKind::Cycles => "Cycle budget",
            PromptKind::Switch => "Switch register (octal)",
            PromptKind::Upload => "S-record file",
        }
    }

    fn submit(&self, text: String) -> Action {
        match self {
            PromptKind::Input => Action::SendInput(text),
            PromptKind::Cycles => Action::SetCycles(text),
            PromptKind::Switch => Action::SetSwitchRegister(text),
            PromptKind::Upload => {
                let path = text.trim();
                if path.is_empty() {
                    // Let the upload pipeline report the empty payload.
                    Action::Upload(ProgramImage::Text(String::new()))
                } else {
                    Action::Upload(ProgramImage::File(PathBuf::from(path)))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Prompt {
    kind: PromptKind,
    buffer: String,
}

/// What a key press asks of the UI.
#[derive(Debug, PartialEq, Eq)]
enum KeyResponse {
    Perform(Action),
    Redraw,
    Ignore,
    Quit,
}

/// Keyboard state: either the command keys are live, or a prompt is open.
#[derive(Debug, Default)]
struct KeyHandler {
    prompt: Option<Prompt>,
}

impl KeyHandler {
    fn handle(&mut self, key: KeyEvent) -> KeyResponse {
        // Quit on Alt+Shift+Q or Ctrl+C, even mid-prompt.
        if (key.code == KeyCode::Char('Q')
            && key.modifiers.contains(KeyModifiers::union(KeyModifiers::ALT, KeyModifiers::SHIFT)))
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            return KeyResponse::Quit;
        }

        if let Some(prompt) = &mut self.prompt {
            return match key.code {
                KeyCode::Char(c) => {
                    prompt.buffer.push(c);
                    KeyResponse::Redraw
                }
                KeyCode::Backspace => {
                    prompt.buffer.pop();
                    KeyResponse::Redraw
                }
                KeyCode::Enter => {
                    let prompt = self.prompt.take().unwrap();
                    KeyResponse::Perform(prompt.kind.submit(prompt.buffer))
                }
                KeyCode::Esc => {
                    self.prompt = None;
                    KeyResponse::Redraw
                }
                _ => KeyResponse::Ignore,
            };
        }

        let open = |kind| Some(Prompt { kind, buffer: String::new() });
        match key.code {
            KeyCode::Char('r') => KeyResponse::Perform(Action::Reset),
            KeyCode::Char('s') => KeyResponse::Perform(Action::Step),
            KeyCode::Char('g') => KeyResponse::Perform(Action::Run),
            KeyCode::Char('h') => KeyResponse::Perform(Action::Halt),
            KeyCode::Char('f') => KeyResponse::Perform(Action::RefreshRegisters),
            KeyCode::Char('a') => KeyResponse::Perform(Action::ToggleAutoRun),
            KeyCode::Char('q') => KeyResponse::Quit,
            KeyCode::Char(c) => {
                self.prompt = match c {
                    'i' => open(PromptKind::Input),
                    'c' => open(PromptKind::Cycles),
                    'w' => open(PromptKind::Switch),
                    'u' => open(PromptKind::Upload),
                    _ => return KeyResponse::Ignore,
                };
                KeyResponse::Redraw
            }
            _ => KeyResponse::Ignore,
        }
    }
}

/// The UI state.
pub struct UI {
    ui_tx: Option<Sender<UICommand>>,
    ui_rx: Receiver<UICommand>,
    actions: ActionSender,
    mirror: RegisterMirror,
    output: OutputAccumulator,
    status: StatusReporter,
    server_url: String,
    keys: KeyHandler,
}

impl UI {
    /// Construct a new UI state. Nothing happens till it is run.
    pub fn new(
        ui_tx: Sender<UICommand>,
        ui_rx: Receiver<UICommand>,
        actions: ActionSender,
        mirror: RegisterMirror,
        output: OutputAccumulator,
        status: StatusReporter,
        server_url: &str,
    ) -> Self {
        Self {
            ui_tx: Some(ui_tx),
            ui_rx,
            actions,
            mirror,
            output,
            status,
            server_url: server_url.to_string(),
            keys: KeyHandler::default(),
        }
    }

    /// Run the UI, blocking the current thread till the operator quits.
    pub fn run(&mut self) -> crossterm::Result<()> {
        info!("Initialising UI.");
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        queue!(
            stdout,
            terminal::EnterAlternateScreen,
            terminal::Clear(terminal::ClearType::All),
            cursor::Hide,
        )?;
        self.draw(&mut stdout)?;

        // Launch the key listener thread.
        let join = Arc::new(AtomicBool::new(false));
        let join1 = join.clone();
        let ui_tx = self.ui_tx.take().unwrap();
        let join_handle = thread::spawn(move || {
            loop {
                // Poll rather than block, so the join flag is noticed.
                match event::poll(KEY_POLL_INTERVAL) {
                    Ok(true) => match event::read() {
                        Ok(Event::Key(key)) => {
                            if ui_tx.send(UICommand::Key(key)).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {} // Ignore non-keyboard events.
                        Err(e) => {
                            debug!("Reading terminal event failed: {}", e);
                            let _ = ui_tx.send(UICommand::Quit);
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        debug!("Polling terminal failed: {}", e);
                        let _ = ui_tx.send(UICommand::Quit);
                        break;
                    }
                }
                if join1.load(Ordering::Relaxed) {
                    break;
                }
            }
            ui_tx
        });

        // Listen for UICommands, redrawing periodically regardless.
        info!("UI online.");
        let result = self.event_loop(&mut stdout);

        // Join the key listener thread.
        join.store(true, Ordering::Relaxed);
        if let Ok(ui_tx) = join_handle.join() {
            self.ui_tx = Some(ui_tx);
        }

        // Cleanup.
        queue!(
            stdout,
            terminal::Clear(terminal::ClearType::All),
            style::ResetColor,
            cursor::Show,
            terminal::LeaveAlternateScreen,
        )?;
        stdout.flush()?;
        terminal::disable_raw_mode()?;

        info!("UI exited.");
        result
    }

    fn event_loop(&mut self, stdout: &mut Stdout) -> crossterm::Result<()> {
        loop {
            match self.ui_rx.recv_timeout(REDRAW_INTERVAL) {
                Ok(UICommand::Key(key)) => match self.keys.handle(key) {
                    KeyResponse::Perform(action) => {
                        debug!("Key {:?} requests {:?}.", key.code, action);
                        if !self.actions.send(action) {
                            return Ok(());
                        }
                    }
                    KeyResponse::Redraw => {}
                    KeyResponse::Ignore => continue,
                    KeyResponse::Quit => return Ok(()),
                },
                Ok(UICommand::Quit) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            }
            self.draw(stdout)?;
        }
    }

    /// Redraw the whole screen from the shared state.
    fn draw(&self, stdout: &mut Stdout) -> crossterm::Result<()> {
        let (cols, rows) = terminal::size()?;
        let width = usize::from(cols);
        let mut row = 0;

        let line = |stdout: &mut Stdout, row: &mut u16, text: &str, color: Color| {
            queue!(
                stdout,
                cursor::MoveTo(0, *row),
                terminal::Clear(terminal::ClearType::CurrentLine),
                style::SetForegroundColor(color),
            )?;
            write!(stdout, "{}", fit(text, width))?;
            *row += 1;
            Ok::<(), io::Error>(())
        };

        line(stdout, &mut row, &format!("{} [{}]", TITLE, self.server_url), Color::Cyan)?;
        line(stdout, &mut row, &format_registers(&self.mirror.current()), Color::White)?;
        for channel in [Channel::Load, Channel::Execution] {
            let status = self.status.get(channel);
            line(stdout, &mut row, &format_status(channel, status.as_ref()),
                 status_color(status.as_ref()))?;
        }

        // The two output panes share whatever is left above the bottom lines.
        let pane_rows = rows.saturating_sub(row + 4) / 2;
        for stream in Stream::ALL {
            line(stdout, &mut row, &format!("── {} ──", stream), Color::DarkGrey)?;
            let contents = self.output.contents(stream);
            let tail = tail_lines(&contents, usize::from(pane_rows));
            for i in 0..pane_rows {
                let text = tail.get(usize::from(i)).copied().unwrap_or("");
                line(stdout, &mut row, text, Color::Green)?;
            }
        }

        let prompt = match &self.keys.prompt {
            Some(prompt) => format!("{}: {}_", prompt.kind.label(), prompt.buffer),
            None => String::new(),
        };
        line(stdout, &mut row, &prompt, Color::Yellow)?;
        line(stdout, &mut row, HELP, Color::DarkGrey)?;

        queue!(stdout, style::ResetColor)?;
        stdout.flush()
    }
}

/// The register line. Fields never reported show as dashes, not zeros.
fn format_registers(regs: &RegisterSnapshot) -> String {
    let text = |field: &Option<String>| field.clone().unwrap_or_else(|| UNKNOWN.to_string());
    let link = regs.link.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
    let run_state = match regs.halted {
        Some(true) => "HALT",
        Some(false) => "RUN",
        None => UNKNOWN,
    };
    format!("PC {}  AC {}  L {}  {}  SR {}",
            text(&regs.pc), text(&regs.ac), link, run_state, text(&regs.switch_register))
}

fn format_status(channel: Channel, status: Option<&Status>) -> String {
    let label = match channel {
        Channel::Load => "Load",
        Channel::Execution => "Exec",
    };
    match status {
        Some(status) => format!("{}: {}", label, status.message),
        None => format!("{}:", label),
    }
}

fn status_color(status: Option<&Status>) -> Color {
    match status.map(|s| s.tone) {
        Some(Tone::Error) => Color::Red,
        _ => Color::White,
    }
}

/// The last `count` lines of `text`, without line terminators. A trailing
/// newline does not produce an empty final line.
fn tail_lines(text: &str, count: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].to_vec()
}

/// Truncate to `width` characters, dropping control characters.
fn fit(text: &str, width: usize) -> String {
    text.chars().filter(|c| !c.is_control()).take(width).collect()
}
