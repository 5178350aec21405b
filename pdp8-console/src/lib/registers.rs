use log::trace;
use serde::Deserialize;
use std::fmt;
use std::sync::{mpsc::Sender, Arc, Mutex};

use crate::ui::UICommand;

/// The link flag, which the service may report either as a boolean or as a
/// 0/1 number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LinkValue {
    Flag(bool),
    Bit(i64),
}

impl fmt::Display for LinkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkValue::Flag(true) => write!(f, "1"),
            LinkValue::Flag(false) => write!(f, "0"),
            LinkValue::Bit(n) => write!(f, "{}", n),
        }
    }
}

/// A possibly partial report of machine registers. `None` always means
/// "not reported", never "zero".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegisterSnapshot {
    #[serde(default)]
    pub pc: Option<String>,
    #[serde(default)]
    pub ac: Option<String>,
    #[serde(default)]
    pub link: Option<LinkValue>,
    #[serde(default)]
    pub halted: Option<bool>,
    #[serde(default, rename = "switch")]
    pub switch_register: Option<String>,
}

/// Field-wise last-write-wins merge of `update` onto `current`. Empty register
/// strings count as absent.
pub fn merge(current: &RegisterSnapshot, update: &RegisterSnapshot) -> RegisterSnapshot {
    fn text(current: &Option<String>, update: &Option<String>) -> Option<String> {
        match update {
            Some(value) if !value.is_empty() => Some(value.clone()),
            _ => current.clone(),
        }
    }

    RegisterSnapshot {
        pc: text(&current.pc, &update.pc),
        ac: text(&current.ac, &update.ac),
        link: update.link.or(current.link),
        halted: update.halted.or(current.halted),
        switch_register: text(&current.switch_register, &update.switch_register),
    }
}

/// The last-known machine state, shared between the command path, the
/// auto-run loop and the console.
#[derive(Clone)]
pub struct RegisterMirror {
    state: Arc<Mutex<RegisterSnapshot>>,
    ui_tx: Option<Sender<UICommand>>,
}

impl RegisterMirror {
    pub fn new() -> Self {
        RegisterMirror {
            state: Arc::new(Mutex::new(RegisterSnapshot::default())),
            ui_tx: None,
        }
    }

    /// A mirror that tells the console whenever a field changes.
    pub fn with_notifier(ui_tx: Sender<UICommand>) -> Self {
        RegisterMirror {
            ui_tx: Some(ui_tx),
            ..Self::new()
        }
    }

    /// Merge a snapshot into the mirror and return the merged view. The whole
    /// snapshot is applied under one lock.
    pub fn apply(&self, snapshot: &RegisterSnapshot) -> RegisterSnapshot {
        let (merged, changed) = {
            let mut state = self.state.lock().unwrap();
            let merged = merge(&state, snapshot);
            let changed = merged != *state;
            *state = merged.clone();
            (merged, changed)
        };
        if changed {
            trace!("Registers now {:?}.", merged);
            if let Some(ui_tx) = &self.ui_tx {
                let _ = ui_tx.send(UICommand::RegistersChanged);
            }
        }
        merged
    }

    /// The merged view of everything applied so far.
    pub fn current(&self) -> RegisterSnapshot {
        self.state.lock().unwrap().clone()
    }

    /// The last reported halt flag, if any was ever reported.
    pub fn current_halt_state(&self) -> Option<bool> {
        self.state.lock().unwrap().halted
    }
}

impl Default for RegisterMirror {
    fn default() -> Self {
        Self::new()
    }
}
