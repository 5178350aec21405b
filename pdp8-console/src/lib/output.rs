use log::trace;
use serde::Deserialize;
use std::fmt;
use std::sync::{mpsc::Sender, Arc, Mutex};

use crate::transport::{PATH_PRINTER, PATH_TELEPRINTER};
use crate::ui::UICommand;

/// The two independent output devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Teleprinter,
    Printer,
}

impl Stream {
    pub const ALL: [Stream; 2] = [Stream::Teleprinter, Stream::Printer];

    /// The endpoint that yields new output for this stream.
    pub fn path(&self) -> &'static str {
        match self {
            Stream::Teleprinter => PATH_TELEPRINTER,
            Stream::Printer => PATH_PRINTER,
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Teleprinter => write!(f, "teleprinter"),
            Stream::Printer => write!(f, "printer"),
        }
    }
}

/// The body of an output endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputFragment {
    #[serde(default)]
    pub text: Option<String>,
}

struct Buffers {
    teleprinter: String,
    printer: String,
}

impl Buffers {
    fn get_mut(&mut self, stream: Stream) -> &mut String {
        match stream {
            Stream::Teleprinter => &mut self.teleprinter,
            Stream::Printer => &mut self.printer,
        }
    }
}

/// Append-only text buffers, one per stream.
#[derive(Clone)]
pub struct OutputAccumulator {
    buffers: Arc<Mutex<Buffers>>,
    ui_tx: Option<Sender<UICommand>>,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        OutputAccumulator {
            buffers: Arc::new(Mutex::new(Buffers {
                teleprinter: String::new(),
                printer: String::new(),
            })),
            ui_tx: None,
        }
    }

    /// An accumulator that tells the console whenever new text arrives.
    pub fn with_notifier(ui_tx: Sender<UICommand>) -> Self {
        OutputAccumulator {
            ui_tx: Some(ui_tx),
            ..Self::new()
        }
    }

    /// Append `text` to the stream's buffer. Returns whether anything was
    /// appended; empty and missing text are ignored.
    pub fn append(&self, stream: Stream, text: Option<&str>) -> bool {
        let text = match text {
            Some(text) if !text.is_empty() => text,
            _ => return false,
        };
        self.buffers.lock().unwrap().get_mut(stream).push_str(text);
        trace!("Appended {} bytes to {}.", text.len(), stream);
        if let Some(ui_tx) = &self.ui_tx {
            let _ = ui_tx.send(UICommand::OutputAppended(stream));
        }
        true
    }

    /// Everything received on the stream so far.
    pub fn contents(&self, stream: Stream) -> String {
        self.buffers.lock().unwrap().get_mut(stream).clone()
    }
}

impl Default for OutputAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;

    #[test]
    fn test_empty_is_noop() {
        let output = OutputAccumulator::new();
        output.append(Stream::Teleprinter, Some("HELLO"));
        assert!(!output.append(Stream::Teleprinter, Some("")));
        assert!(!output.append(Stream::Teleprinter, None));
        assert_eq!(output.contents(Stream::Teleprinter), "HELLO");
    }

    #[test]
    fn test_order_preserved() {
        let output = OutputAccumulator::new();
        output.append(Stream::Printer, Some("A"));
        output.append(Stream::Printer, Some("B"));
        assert_eq!(output.contents(Stream::Printer), "AB");
    }

    #[test]
    fn test_streams_independent() {
        let output = OutputAccumulator::new();
        output.append(Stream::Teleprinter, Some("TTY\r\n"));
        output.append(Stream::Printer, Some("LPT"));
        assert_eq!(output.contents(Stream::Teleprinter), "TTY\r\n");
        assert_eq!(output.contents(Stream::Printer), "LPT");
    }

    #[test]
    fn test_clones_share_buffers() {
        let output = OutputAccumulator::new();
        let other = output.clone();
        other.append(Stream::Teleprinter, Some("X"));
        assert_eq!(output.contents(Stream::Teleprinter), "X");
    }

    #[test]
    fn test_notifies_on_new_content_only() {
        let (ui_tx, ui_rx) = mpsc::channel();
        let output = OutputAccumulator::with_notifier(ui_tx);
        output.append(Stream::Printer, None);
        output.append(Stream::Printer, Some(""));
        output.append(Stream::Printer, Some("Z"));
        let notifications: Vec<_> = ui_rx.try_iter().collect();
        assert_eq!(notifications, vec![UICommand::OutputAppended(Stream::Printer)]);
    }

    #[test]
    fn test_parse_fragment() {
        let fragment: OutputFragment =
            serde_json::from_str(r#"{"text": "OK\r\n", "bytes": ["117", "113"]}"#).unwrap();
        assert_eq!(fragment.text.as_deref(), Some("OK\r\n"));
        let empty: OutputFragment = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text, None);
    }
}
