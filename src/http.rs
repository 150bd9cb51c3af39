use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

const MAX_RETRIES: usize = 3;
const BASE_DELAY_MS: u64 = 200;

pub fn build_client(timeout: Option<Duration>) -> Result<Client, String> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("geofeed-sync/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| err.to_string())?,
    );
    let mut builder = Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(30));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|err| err.to_string())
}

/// Sends the request built by `make_req`, retrying transient failures with a linear back-off.
pub fn send_with_retries<F>(mut make_req: F) -> Result<Response, reqwest::Error>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0usize;
    loop {
        match make_req().send() {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if attempt < MAX_RETRIES && is_retryable_status(status) {
                    tracing::debug!(status, attempt, "retrying request");
                    backoff(attempt);
                    attempt += 1;
                    continue;
                }
                return Ok(resp);
            }
            Err(err) => {
                if attempt < MAX_RETRIES && is_retryable_error(&err) {
                    tracing::debug!(attempt, "retrying request after error: {err}");
                    backoff(attempt);
                    attempt += 1;
                    continue;
                }
                return Err(err);
            }
        }
    }
}

/// Splits a non-success response into its status code and body text.
pub fn status_failure(response: Response, fallback: &str) -> (u16, String) {
    let status = response.status().as_u16();
    let message = response
        .text()
        .ok()
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());
    (status, message)
}

fn backoff(attempt: usize) {
    let delay = BASE_DELAY_MS * (attempt as u64 + 1);
    thread::sleep(Duration::from_millis(delay));
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
