use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde::Serialize;

use reqmux::configure::load_config_from;
use reqmux::logger::setup_logger;
use reqmux::{DriverThread, HttpEngine, HttpRequest, Method, Multiplexer, Outcome, UpdateQueue};

#[derive(Parser, Debug)]
#[command(name = "reqmux", version, about = "Fetch URLs concurrently through a single driver thread")]
struct Args {
    /// URLs to request
    #[arg(required = true)]
    urls: Vec<String>,

    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,

    /// Request body (POST, PUT, PATCH, DELETE)
    #[arg(short, long)]
    data: Option<String>,

    /// Extra header, as "name: value"
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Per-request timeout in milliseconds (0 = none)
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Configuration file (defaults to config/reqmux.yaml if present)
    #[arg(short, long)]
    config: Option<String>,

    /// Print response bodies
    #[arg(long)]
    body: bool,

    /// Emit one JSON object per result
    #[arg(long)]
    json: bool,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"name: value\", got {:?}", raw))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

#[derive(Debug, Serialize)]
struct Report {
    index: usize,
    url: String,
    outcome: Outcome,
    status: Option<u16>,
    bytes: usize,
    elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("Failed to encode report for {}: {}", report.url, e),
        }
        return;
    }

    let status = report.status.map_or_else(|| "---".to_string(), |s| s.to_string());
    println!(
        "[{}] {} {} {} bytes {}ms {}",
        report.index, status, report.outcome, report.bytes, report.elapsed_ms, report.url
    );
    if let Some(body) = &report.body {
        println!("{}", body);
    }
}

fn build_request(args: &Args, url: &str) -> HttpRequest {
    let mut request = HttpRequest::new(url, args.method);
    if let Some(data) = &args.data {
        request = request.with_body(data.clone());
    }
    if let Some(ms) = args.timeout_ms {
        request = request.with_timeout(Duration::from_millis(ms));
    }
    for (name, value) in &args.headers {
        request = request.with_header(name.clone(), value.clone());
    }
    request
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config_from(args.config.as_deref()).context("Failed to load configuration")?;
    setup_logger(&config).map_err(|e| anyhow!("Failed to set up logging: {}", e))?;

    let engine = HttpEngine::new(&config.engine)?;
    let mux = Arc::new(Multiplexer::new(engine));
    let interval = config.driver.update_interval();
    let driver = DriverThread::spawn(mux.clone(), interval).context("Failed to start driver thread")?;

    // Callbacks run on the driver thread; results are printed here, in submission order
    let reports = Arc::new(UpdateQueue::new().with_order(|a: &Report, b: &Report| a.index.cmp(&b.index)));

    let mut handles = Vec::with_capacity(args.urls.len());
    let mut rejected = 0usize;
    for (index, url) in args.urls.iter().enumerate() {
        let sink = reports.clone();
        let target = url.clone();
        let keep_body = args.body;
        let started = Instant::now();

        let submitted = mux.add_request(build_request(&args, url), move |outcome, response| {
            sink.push(Report {
                index,
                url: target,
                outcome,
                status: response.status,
                bytes: response.len(),
                elapsed_ms: started.elapsed().as_millis(),
                body: keep_body.then(|| response.text().into_owned()),
            });
        });

        match submitted {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                log::error!("Could not submit {}: {}", url, e);
                rejected += 1;
            }
        }
    }

    let mut failed = 0usize;
    let mut drain = |reports: &UpdateQueue<Report>| {
        reports.update(|report| {
            if !report.outcome.is_ok() {
                failed += 1;
            }
            print_report(&report, args.json);
        });
    };

    while handles.iter().any(|handle| !mux.is_completed(*handle)) {
        drain(&*reports);
        thread::sleep(interval.max(Duration::from_millis(1)));
    }
    drain(&*reports);

    for handle in handles {
        mux.release_transaction(handle);
    }
    driver.stop();

    let stats = mux.stats();
    log::info!("Stats: {}", serde_json::to_string(&stats)?);

    if rejected + failed > 0 {
        bail!("{} of {} requests did not complete successfully", rejected + failed, args.urls.len());
    }
    Ok(())
}
