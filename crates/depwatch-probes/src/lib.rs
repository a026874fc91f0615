//! depwatch-probes: built-in checkers.
//!
//! - [`TcpChecker`] opens a TCP connection and closes it.
//! - [`HttpChecker`] sends `GET <health_path>` over HTTP/1.1 and expects 2xx.
//!
//! Transport failures are returned unclassified so the generic classifier
//! can map them; protocol outcomes (auth rejection, non-2xx) are classified
//! here.

pub mod http_probe;
pub mod tcp;

pub use http_probe::{HttpChecker, HttpCheckerBuilder};
pub use tcp::TcpChecker;
