//! Dedicated driver thread
//!
//! Calls `Multiplexer::update` in a loop on its own thread and stops when
//! this handle is stopped or dropped. Completion callbacks run on this thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::TransferEngine;
use crate::mux::multiplexer::Multiplexer;

pub const DRIVER_THREAD_NAME: &str = "reqmux-driver";

pub struct DriverThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DriverThread {
    /// Start driving `mux`, sleeping `interval` between updates that
    /// delivered nothing.
    pub fn spawn<E>(mux: Arc<Multiplexer<E>>, interval: Duration) -> io::Result<Self>
    where
        E: TransferEngine + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name(DRIVER_THREAD_NAME.to_string())
            .spawn(move || {
                log::debug!("Driver thread started (interval={:?})", interval);
                let mut delivered = 0usize;
                while !stop_flag.load(Ordering::Acquire) {
                    let n = mux.update();
                    delivered += n;
                    // Keep draining while events keep arriving
                    if n == 0 {
                        thread::sleep(interval);
                    }
                }
                log::debug!("Driver thread stopped after {} completions", delivered);
            })?;

        Ok(Self { stop, handle: Some(handle) })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Signal the loop to exit and wait for it
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Driver thread panicked");
            }
        }
    }
}

impl Drop for DriverThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
