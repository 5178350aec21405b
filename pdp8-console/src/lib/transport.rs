mod transport_http;
mod transport_interface;

pub use transport_http::HttpTransport;
pub use transport_interface::*;

// Mock implementation for testing.
#[cfg(test)]
mod transport_mock;
#[cfg(test)]
pub use transport_mock::MockTransport;
