pub mod configure;
pub mod engine;
pub mod logger;
pub mod mux;
pub mod request;
pub mod update_queue;

pub use engine::{FinishedTransfer, HttpEngine, MockBehavior, MockEngine, TransferEngine};
pub use mux::{DriverThread, HttpHandle, Multiplexer, MuxError, Outcome, Response, TransferCode};
pub use request::{HttpRequest, Method};
pub use update_queue::UpdateQueue;
