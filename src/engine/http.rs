//! HTTP engine backed by reqwest
//!
//! Each registered session becomes one task on an engine-owned tokio
//! runtime. Finished tasks report through a channel which the driver thread
//! drains without blocking, so `advance_all` has nothing left to do.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use reqwest::Client;
use tokio::runtime::{Builder, Runtime};
use tokio::task::AbortHandle;

use super::{FinishedTransfer, TransferEngine};
use crate::configure::EngineConfig;
use crate::mux::error::MuxError;
use crate::mux::handle::HttpHandle;
use crate::mux::outcome::TransferCode;
use crate::request::{HttpRequest, Method};

#[derive(Debug, Default)]
pub struct HttpSession {
    /// Built request, consumed by `register`
    request: Option<reqwest::Request>,
    task: Option<AbortHandle>,
}

pub struct HttpEngine {
    // Option only so that Drop can shut the runtime down without blocking
    runtime: Option<Runtime>,
    client: Client,
    default_timeout: Option<Duration>,
    finished_tx: Sender<FinishedTransfer>,
    finished_rx: Receiver<FinishedTransfer>,
}

impl HttpEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, MuxError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("reqmux-io")
            .enable_all()
            .build()
            .map_err(|e| MuxError::RuntimeUnavailable(e.to_string()))?;

        let client = {
            let _guard = runtime.enter();
            let mut builder = Client::builder().user_agent(config.user_agent.as_str());
            if let Some(timeout) = config.connect_timeout() {
                builder = builder.connect_timeout(timeout);
            }
            if !config.use_system_proxy {
                builder = builder.no_proxy();
            }
            builder
                .build()
                .map_err(|e| MuxError::RuntimeUnavailable(e.to_string()))?
        };

        let (finished_tx, finished_rx) = unbounded();
        log::info!(
            "HTTP engine started (worker_threads={}, default_timeout={:?})",
            config.worker_threads.max(1),
            config.default_timeout()
        );

        Ok(Self {
            runtime: Some(runtime),
            client,
            default_timeout: config.default_timeout(),
            finished_tx,
            finished_rx,
        })
    }

    fn runtime(&self) -> Result<&Runtime, MuxError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| MuxError::RuntimeUnavailable("engine is shutting down".to_string()))
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Patch => reqwest::Method::PATCH,
    }
}

/// Map a reqwest error onto a curl-style transfer code
pub fn classify_error(err: &reqwest::Error) -> TransferCode {
    if err.is_timeout() {
        TransferCode::OPERATION_TIMEDOUT
    } else if err.is_connect() {
        TransferCode::COULDNT_CONNECT
    } else if err.is_redirect() {
        TransferCode::TOO_MANY_REDIRECTS
    } else if err.is_builder() {
        TransferCode::URL_MALFORMAT
    } else if err.is_body() || err.is_decode() {
        TransferCode::RECV_ERROR
    } else {
        TransferCode::SEND_ERROR
    }
}

async fn perform(client: Client, token: HttpHandle, request: reqwest::Request) -> FinishedTransfer {
    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            log::debug!("Transfer {} failed: {}", token, e);
            return FinishedTransfer::failed(token, classify_error(&e));
        }
    };

    let status = response.status().as_u16();
    match response.bytes().await {
        Ok(body) => FinishedTransfer::ok(token, status, body),
        Err(e) => {
            log::debug!("Transfer {} failed reading body: {}", token, e);
            FinishedTransfer {
                status: Some(status),
                ..FinishedTransfer::failed(token, classify_error(&e))
            }
        }
    }
}

impl TransferEngine for HttpEngine {
    type Session = HttpSession;

    fn create_session(&self) -> HttpSession {
        HttpSession::default()
    }

    fn configure_session(&self, session: &mut HttpSession, request: &HttpRequest) -> Result<(), MuxError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method()), request.url());

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout().or(self.default_timeout) {
            builder = builder.timeout(timeout);
        }

        let built = builder
            .build()
            .map_err(|e| MuxError::engine(classify_error(&e), e.to_string()))?;
        session.request = Some(built);
        Ok(())
    }

    fn register(&self, token: HttpHandle, session: &mut HttpSession) -> Result<(), MuxError> {
        let request = session.request.take().ok_or_else(|| {
            MuxError::engine(TransferCode::URL_MALFORMAT, "session registered before configuration")
        })?;
        let runtime = self.runtime()?;

        log::trace!("Starting transfer {} {} {}", token, request.method(), request.url());
        let client = self.client.clone();
        let finished = self.finished_tx.clone();
        let task = runtime.spawn(async move {
            let event = perform(client, token, request).await;
            // The receiver lives as long as the engine itself
            let _ = finished.send(event);
        });

        session.task = Some(task.abort_handle());
        Ok(())
    }

    fn advance_all(&self) {
        // Transfers progress on the runtime's worker threads
    }

    fn drain_finished(&self) -> Vec<FinishedTransfer> {
        self.finished_rx.try_iter().collect()
    }

    fn destroy_session(&self, session: HttpSession) {
        if let Some(task) = session.task {
            task.abort();
        }
    }
}

impl Drop for HttpEngine {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            log::info!("HTTP engine stopping...");
            runtime.shutdown_background();
        }
    }
}
