//! Transport side of the download pipeline.
//!
//! Runs on its own OS thread with a single-threaded tokio runtime driving
//! up to `parallel_max` concurrent range fetches. Completed responses are
//! handed back into the shared queue by prefix (tasks are addressed by
//! their prefix, never by position), then the phase flips so the writer can
//! shuffle and refill. With no completion for a while the transport still
//! yields an empty batch, keeping the handshake alive while slow shards
//! finish.

use crate::constants;
use crate::download::task::{Handshake, Phase};
use crate::error::DownloadError;
use crate::record::prefix_hex;
use futures_util::future::FutureExt;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub ntlm: bool,
    /// Install a SIGINT handler that stops the run at a shard boundary.
    pub handle_signals: bool,
}

pub fn run(shared: Arc<Handshake>, config: TransportConfig) -> Result<(), DownloadError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_inner(shared, config))
}

async fn run_inner(shared: Arc<Handshake>, config: TransportConfig) -> Result<(), DownloadError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(constants::HTTP_TIMEOUT_SECS))
        .build()?;

    let handle_signals = config.handle_signals;
    let sigint_shared = Arc::clone(&shared);
    let mut sigint = Box::pin(
        async move {
            if handle_signals && tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("[Download] Interrupt received, stopping at a shard boundary...");
                sigint_shared.request_shutdown();
            } else {
                // Signals disabled (or the handler failed to install): never
                // resolve, so the select below ignores this arm.
                std::future::pending::<()>().await;
            }
        }
        .fuse(),
    );

    let mut started: HashSet<u32> = HashSet::new();
    let mut in_flight = FuturesUnordered::new();

    loop {
        // Wait for our phase. The writer owns the stall timeout; this side
        // waits until woken.
        {
            let st = shared.state.lock().unwrap();
            let st = shared
                .cv
                .wait_while(st, |s| s.phase != Phase::HandleRequests && !s.failed)
                .unwrap();
            if st.failed || st.download_queue.is_empty() {
                return Ok(());
            }
            if !st.shutdown {
                for task in st.download_queue.iter() {
                    if !task.complete && started.insert(task.prefix) {
                        in_flight.push(fetch_shard(
                            client.clone(),
                            config.base_url.clone(),
                            task.prefix,
                            config.ntlm,
                        ));
                    }
                }
            }
        }

        // Drive the network until something completes, or yield after a
        // short tick so the writer keeps getting control.
        let mut completions: Vec<(u32, Result<Vec<u8>, DownloadError>)> = Vec::new();
        tokio::select! {
            done = in_flight.next(), if !in_flight.is_empty() => {
                if let Some(c) = done {
                    completions.push(c);
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(constants::TRANSPORT_YIELD_MS)) => {}
            _ = &mut sigint => {}
        }
        // Sweep up anything else that is already finished.
        while let Some(Some(c)) = in_flight.next().now_or_never() {
            completions.push(c);
        }

        // Hand results back and yield to the writer.
        let mut fatal: Option<DownloadError> = None;
        {
            let mut st = shared.state.lock().unwrap();
            for (prefix, result) in completions {
                match result {
                    Ok(bytes) => {
                        if let Some(task) = st
                            .download_queue
                            .iter_mut()
                            .find(|t| t.prefix == prefix)
                        {
                            task.buffer = bytes;
                            task.complete = true;
                        }
                    }
                    Err(e) => {
                        st.failed = true;
                        fatal = Some(e);
                    }
                }
            }
            st.phase = Phase::ProcessQueues;
        }
        shared.cv.notify_all();
        if let Some(e) = fatal {
            return Err(e);
        }
    }
}

enum FetchFailure {
    Retryable(DownloadError, Option<Duration>),
    Permanent(DownloadError),
}

async fn fetch_shard(
    client: reqwest::Client,
    base_url: String,
    prefix: u32,
    ntlm: bool,
) -> (u32, Result<Vec<u8>, DownloadError>) {
    let mut url = format!("{}/{}", base_url, prefix_hex(prefix));
    if ntlm {
        url.push_str("?mode=ntlm");
    }

    let mut backoff = Duration::from_millis(constants::RETRY_BACKOFF_MS);
    let mut last: Option<DownloadError> = None;
    for attempt in 1..=constants::FETCH_RETRY_MAX {
        match do_fetch(&client, &url, prefix).await {
            Ok(bytes) => return (prefix, Ok(bytes)),
            Err(FetchFailure::Permanent(e)) => return (prefix, Err(e)),
            Err(FetchFailure::Retryable(e, retry_after)) => {
                let wait = retry_after.unwrap_or(backoff);
                log::debug!(
                    "[Download] prefix {} attempt {}/{} failed ({}), retrying in {:?}",
                    prefix_hex(prefix),
                    attempt,
                    constants::FETCH_RETRY_MAX,
                    e,
                    wait
                );
                last = Some(e);
                if attempt < constants::FETCH_RETRY_MAX {
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                }
            }
        }
    }
    (
        prefix,
        Err(DownloadError::RetriesExhausted {
            prefix,
            attempts: constants::FETCH_RETRY_MAX,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        }),
    )
}

async fn do_fetch(
    client: &reqwest::Client,
    url: &str,
    prefix: u32,
) -> Result<Vec<u8>, FetchFailure> {
    let response = client
        .get(url)
        .header("User-Agent", constants::user_agent())
        .send()
        .await
        .map_err(|source| {
            // Connection resets, DNS hiccups and timeouts are transient.
            FetchFailure::Retryable(DownloadError::HttpRequest { prefix, source }, None)
        })?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(&response);
        return Err(FetchFailure::Retryable(
            DownloadError::HttpStatus {
                prefix,
                status: status.as_u16(),
            },
            Some(retry_after),
        ));
    }
    if status.is_server_error() {
        return Err(FetchFailure::Retryable(
            DownloadError::HttpStatus {
                prefix,
                status: status.as_u16(),
            },
            None,
        ));
    }
    if !status.is_success() {
        // 4xx other than 429 will not get better on retry.
        return Err(FetchFailure::Permanent(DownloadError::HttpStatus {
            prefix,
            status: status.as_u16(),
        }));
    }

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|source| FetchFailure::Retryable(DownloadError::HttpRequest { prefix, source }, None))
}

/// Parse the Retry-After header, capped at MAX_RETRY_AFTER_SECS. Accepts
/// both delta-seconds and HTTP-date forms.
fn parse_retry_after(response: &reqwest::Response) -> Duration {
    let cap = Duration::from_secs(constants::MAX_RETRY_AFTER_SECS);

    if let Some(header) = response.headers().get("retry-after") {
        if let Ok(text) = header.to_str() {
            if let Ok(seconds) = text.parse::<u64>() {
                return Duration::from_secs(seconds).min(cap);
            }
            if let Ok(when) = httpdate::parse_http_date(text) {
                if let Ok(delta) = when.duration_since(std::time::SystemTime::now()) {
                    return delta.min(cap);
                }
            }
        }
    }

    cap
}
