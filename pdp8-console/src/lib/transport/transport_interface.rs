use std::fmt;

use crate::error::ConsoleResult;

// Endpoint paths on the simulator service.
pub const PATH_REGISTERS: &str = "/regs";
pub const PATH_RESET: &str = "/reset";
pub const PATH_CONTINUE: &str = "/continue";
pub const PATH_HALT: &str = "/halt";
pub const PATH_TRACE: &str = "/trace";
pub const PATH_LOADER: &str = "/loader";
pub const PATH_TELEPRINTER: &str = "/output/teleprinter";
pub const PATH_PRINTER: &str = "/output/printer";
pub const PATH_KEYBOARD: &str = "/input/keyboard";
pub const PATH_SWITCH: &str = "/switch";

/// HTTP methods the console uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// A request body. Text bodies are sent as `text/plain`, JSON as
/// `application/json`.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

/// One outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Body,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Request {
            method: Method::Get,
            path: path.into(),
            body: Body::Empty,
        }
    }

    pub fn post(path: impl Into<String>, body: Body) -> Self {
        Request {
            method: Method::Post,
            path: path.into(),
            body,
        }
    }

    pub fn put(path: impl Into<String>, body: Body) -> Self {
        Request {
            method: Method::Put,
            path: path.into(),
            body,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method.as_str(), self.path)
    }
}

/// The connection to the simulator service. Implementations block until the
/// response body has been read, and must return `ServerRejected` for any
/// non-success status.
pub trait Transport: Send + Sync {
    fn send(&self, request: &Request) -> ConsoleResult<String>;
}
