// ghexec-sdk: Foundation layer for ghexec.
// This crate has no dependencies on other ghexec crates and provides
// process invocation, diagnostic tracing and file helpers.

pub mod io_util;
pub mod process_invoker;
pub mod trace;

// Re-export commonly used items at crate root
pub use io_util::IOUtil;
pub use process_invoker::{ProcessExitCodeError, ProcessInvoker, ProcessOutcome, ProcessStartInfo};
pub use trace::TraceWriter;
