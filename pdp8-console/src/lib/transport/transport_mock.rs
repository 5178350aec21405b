use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::transport_interface::*;
use crate::error::ConsoleResult;

struct Script {
    once: HashMap<String, VecDeque<ConsoleResult<String>>>,
    sticky: HashMap<String, ConsoleResult<String>>,
    log: Vec<Request>,
}

/// A scripted transport used when testing other components. Responses are
/// keyed by path without the query string; unscripted paths answer with an
/// empty body. Every request is recorded in order.
pub struct MockTransport {
    script: Mutex<Script>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            script: Mutex::new(Script {
                once: HashMap::new(),
                sticky: HashMap::new(),
                log: Vec::new(),
            }),
        }
    }

    /// Answer every request to `path` with `response`.
    pub fn respond(&self, path: &str, response: ConsoleResult<String>) -> &Self {
        self.script.lock().unwrap().sticky.insert(path.to_string(), response);
        self
    }

    /// Answer the next request to `path` with `response`, ahead of any sticky
    /// response.
    pub fn respond_once(&self, path: &str, response: ConsoleResult<String>) -> &Self {
        self.script.lock().unwrap().once
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// All requests so far, in the order they were sent.
    pub fn requests(&self) -> Vec<Request> {
        self.script.lock().unwrap().log.clone()
    }

    /// Paths (including query) of all requests so far.
    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    /// How many requests were sent to `path`, ignoring any query string.
    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| route(&r.path) == path).count()
    }

    pub fn clear_log(&self) {
        self.script.lock().unwrap().log.clear();
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &Request) -> ConsoleResult<String> {
        let mut script = self.script.lock().unwrap();
        script.log.push(request.clone());
        let key = route(&request.path).to_string();
        if let Some(response) = script.once.get_mut(&key).and_then(VecDeque::pop_front) {
            return response;
        }
        match script.sticky.get(&key) {
            Some(response) => response.clone(),
            None => Ok(String::new()),
        }
    }
}

fn route(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}
