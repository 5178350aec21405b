use log::{info, warn};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::dispatch::CommandDispatcher;
use crate::error::ConsoleResult;
use crate::status::Channel;
use crate::transport::{Body, Request, Transport, PATH_LOADER};

/// A program image (S-record text) to hand to the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramImage {
    Text(String),
    File(PathBuf),
}

impl ProgramImage {
    fn payload(&self) -> Result<Body, String> {
        match self {
            ProgramImage::Text(text) => Ok(Body::Text(text.clone())),
            ProgramImage::File(path) => fs::read(path)
                .map(Body::Bytes)
                .map_err(|e| format!("couldn't read '{}': {}", path.display(), e)),
        }
    }
}

fn is_blank(body: &Body) -> bool {
    match body {
        Body::Text(text) => text.trim().is_empty(),
        Body::Bytes(bytes) => bytes.iter().all(u8::is_ascii_whitespace),
        Body::Json(_) => false,
        Body::Empty => true,
    }
}

/// What the loader reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub written_word_count: usize,
    pub start_vector: Option<String>,
}

impl fmt::Display for UploadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loaded {} words", self.written_word_count)?;
        if let Some(start) = &self.start_vector {
            write!(f, "; start vector {}", start)?;
        }
        write!(f, ".")
    }
}

#[derive(Deserialize)]
struct LoaderReply {
    written: Vec<serde_json::Value>,
    #[serde(default)]
    start: Option<String>,
}

impl<T: Transport> CommandDispatcher<T> {
    /// Send a program image to the loader. The outcome is reported on the
    /// load status line; registers are refreshed after a successful load since
    /// the image may set a new start address.
    pub fn upload(&self, image: &ProgramImage) -> Option<UploadResult> {
        let body = match image.payload() {
            Ok(body) => body,
            Err(e) => {
                self.status().error(Channel::Load, format!("Upload failed: {}", e));
                return None;
            }
        };
        if is_blank(&body) {
            self.status().info(Channel::Load, "Provide S-record data before uploading.");
            return None;
        }

        self.status().info(Channel::Load, "Uploading S-record payload…");
        match self.load(body) {
            Ok(result) => {
                info!("{}", result);
                self.status().info(Channel::Load, result.to_string());
                if let Err(e) = self.sync_registers() {
                    warn!("Register refresh after upload failed: {}", e);
                }
                Some(result)
            }
            Err(e) => {
                warn!("Upload failed: {}", e);
                self.status().error(Channel::Load, format!("Upload failed: {}", e));
                None
            }
        }
    }

    fn load(&self, body: Body) -> ConsoleResult<UploadResult> {
        let reply = self.transport().send(&Request::post(PATH_LOADER, body))?;
        let reply: LoaderReply = serde_json::from_str(&reply)?;
        Ok(UploadResult {
            written_word_count: reply.written.len(),
            start_vector: reply.start.filter(|s| !s.is_empty()),
        })
    }
}
