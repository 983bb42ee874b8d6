//! `probe`: fetch a URL the way a client would and report how it ended.

use std::error::Error;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "probe")]
#[command(about = "Issue one GET, drain the body and report the outcome", long_about = None)]
struct Cli {
    /// URL to fetch (e.g. http://localhost:80/).
    url: String,

    /// Give up after this many seconds.
    #[arg(short, long, default_value_t = 120)]
    timeout_secs: u64,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    url: String,
    status: Option<u16>,
    content_length: Option<u64>,
    bytes_received: u64,
    elapsed_ms: u128,
    error: Option<String>,
}

impl Report {
    fn complete(&self) -> bool {
        self.error.is_none()
            && self
                .content_length
                .map_or(true, |expected| expected == self.bytes_received)
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Report {
    let start = Instant::now();
    let mut report = Report {
        url: url.to_string(),
        status: None,
        content_length: None,
        bytes_received: 0,
        elapsed_ms: 0,
        error: None,
    };

    match client.get(url).send().await {
        Ok(mut response) => {
            report.status = Some(response.status().as_u16());
            report.content_length = response.content_length();
            loop {
                match response.chunk().await {
                    Ok(Some(chunk)) => report.bytes_received += chunk.len() as u64,
                    Ok(None) => break,
                    Err(e) => {
                        report.error = Some(error_chain(&e));
                        break;
                    }
                }
            }
        }
        Err(e) => report.error = Some(error_chain(&e)),
    }

    report.elapsed_ms = start.elapsed().as_millis();
    report
}

fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }
    message
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .no_proxy()
        .build()?;

    let report = fetch(&client, &cli.url).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("url:            {}", report.url);
        match report.status {
            Some(status) => println!("status:         {status}"),
            None => println!("status:         -"),
        }
        if let Some(expected) = report.content_length {
            println!("content-length: {expected}");
        }
        println!("received:       {} bytes", report.bytes_received);
        println!("elapsed:        {} ms", report.elapsed_ms);
        if let Some(error) = &report.error {
            println!("error:          {error}");
        }
    }

    if !report.complete() {
        std::process::exit(1);
    }
    Ok(())
}
