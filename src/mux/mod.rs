//! Multiplexer module
//!
//! Handle allocation, the transaction registry and the completion-dispatch
//! loop that ties callers to a transfer engine.

pub mod driver;
pub mod error;
pub mod handle;
pub mod multiplexer;
pub mod outcome;
pub mod registry;
pub mod stats;
pub mod transaction;

// Re-export commonly used types
pub use driver::DriverThread;
pub use error::MuxError;
pub use handle::{HandleAllocator, HttpHandle};
pub use multiplexer::Multiplexer;
pub use outcome::{Outcome, Response, TransferCode};
pub use registry::TransactionRegistry;
pub use stats::{LatencyTimer, MuxStats, StatsSnapshot};
pub use transaction::{CompletionCallback, Transaction};
