use std::sync::{mpsc::Sender, Arc, Mutex};

use crate::ui::UICommand;

/// Where a status line is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Load,
    Execution,
}

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub tone: Tone,
}

/// Two independent status lines. Only the latest message in each is kept.
#[derive(Clone)]
pub struct StatusReporter {
    lines: Arc<Mutex<[Option<Status>; 2]>>,
    ui_tx: Option<Sender<UICommand>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        StatusReporter {
            lines: Arc::new(Mutex::new([None, None])),
            ui_tx: None,
        }
    }

    pub fn with_notifier(ui_tx: Sender<UICommand>) -> Self {
        StatusReporter {
            ui_tx: Some(ui_tx),
            ..Self::new()
        }
    }

    pub fn report(&self, channel: Channel, message: impl Into<String>, tone: Tone) {
        let status = Status {
            message: message.into(),
            tone,
        };
        self.lines.lock().unwrap()[index(channel)] = Some(status);
        if let Some(ui_tx) = &self.ui_tx {
            let _ = ui_tx.send(UICommand::StatusChanged(channel));
        }
    }

    pub fn info(&self, channel: Channel, message: impl Into<String>) {
        self.report(channel, message, Tone::Info);
    }

    pub fn error(&self, channel: Channel, message: impl Into<String>) {
        self.report(channel, message, Tone::Error);
    }

    pub fn get(&self, channel: Channel) -> Option<Status> {
        self.lines.lock().unwrap()[index(channel)].clone()
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn index(channel: Channel) -> usize {
    match channel {
        Channel::Load => 0,
        Channel::Execution => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let status = StatusReporter::new();
        assert_eq!(status.get(Channel::Execution), None);
        status.info(Channel::Execution, "Sending command…");
        status.error(Channel::Execution, "Command failed: boom");
        assert_eq!(status.get(Channel::Execution), Some(Status {
            message: "Command failed: boom".into(),
            tone: Tone::Error,
        }));
    }

    #[test]
    fn test_channels_independent() {
        let status = StatusReporter::new();
        status.info(Channel::Load, "Loaded 3 words.");
        status.error(Channel::Execution, "nope");
        assert_eq!(status.get(Channel::Load).unwrap().tone, Tone::Info);
        assert_eq!(status.get(Channel::Load).unwrap().message, "Loaded 3 words.");
        assert_eq!(status.get(Channel::Execution).unwrap().tone, Tone::Error);
    }
}
