//! Artifact retrieval with resumable transfers, digest verification and retries.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::RANGE;
use sha2::{Digest, Sha256};
use crate::error::{Error, Result};
use crate::progress::{NoProgress, ProgressReporter, ProgressTracker};
use crate::util::{format_hash, is_hex};

const USER_AGENT: &str = concat!("toolver/", env!("CARGO_PKG_VERSION"));
const BUFFER_SIZE: usize = 64 * 1024;

/// Exponential backoff: `base_delay`, then doubling, for up to `max_retries`
/// attempts after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Outcome of a completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub bytes_written: u64,
    /// Lowercase hex SHA-256 of the artifact.
    pub digest: String,
    pub attempts_used: u32,
    /// Whether the final attempt continued a previously interrupted transfer.
    pub resumed: bool,
    pub duration: Duration,
}

struct Attempt {
    bytes: u64,
    digest: String,
    resumed: bool,
}

/// Downloads artifacts over HTTP.
///
/// Bytes are always streamed to `<destination>.part` and only renamed onto the
/// destination once complete and verified, so the canonical path never holds a
/// half-written artifact. An existing `.part` file is resumed with a byte-range
/// request.
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    reporter: Box<dyn ProgressReporter>,
}

impl Fetcher {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("could not create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            policy,
            reporter: Box::new(NoProgress),
        })
    }

    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Fetches `url` into `destination`, verifying `expected_digest` when given.
    ///
    /// Transport failures and digest mismatches are retried with backoff; a
    /// mismatch also deletes the partial artifact. Non-retryable errors return
    /// immediately. Exhaustion yields [`Error::RetriesExhausted`] wrapping the
    /// last failure.
    pub fn fetch(
        &self,
        url: &str,
        destination: &Path,
        expected_digest: Option<&str>,
    ) -> Result<FetchResult> {
        let started = Instant::now();
        let partial = partial_path(destination);
        let expected = expected_digest.map(format_hash).filter(|d| !d.is_empty());
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts() {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt);
                warn!(
                    "Retry {}/{} for {} in {:?}",
                    attempt, self.policy.max_retries, url, delay
                );
                std::thread::sleep(delay);
            }

            let outcome = match self.fetch_once(url, &partial) {
                Ok(outcome) => outcome,
                Err(err) if err.is_retryable() => {
                    debug!("Attempt {} for {} failed: {}", attempt + 1, url, err);
                    last_error = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            if let Some(expected) = &expected {
                if *expected != outcome.digest {
                    let _ = fs::remove_file(&partial);
                    let err = Error::DigestMismatch {
                        url: url.to_string(),
                        expected: expected.clone(),
                        actual: outcome.digest,
                    };
                    debug!("Attempt {} for {} failed: {}", attempt + 1, url, err);
                    last_error = Some(err);
                    continue;
                }
            }

            fs::rename(&partial, destination).map_err(|e| Error::io(destination, e))?;
            return Ok(FetchResult {
                bytes_written: outcome.bytes,
                digest: outcome.digest,
                attempts_used: attempt + 1,
                resumed: outcome.resumed,
                duration: started.elapsed(),
            });
        }

        let source = last_error.unwrap_or_else(|| Error::Transport {
            url: url.to_string(),
            message: "no attempts made".to_string(),
        });
        Err(Error::RetriesExhausted {
            attempts: self.policy.max_attempts(),
            source: Box::new(source),
        })
    }

    fn fetch_once(&self, url: &str, partial: &Path) -> Result<Attempt> {
        let existing = fs::metadata(partial).map(|m| m.len()).unwrap_or(0);

        let mut request = self.client.get(url);
        if existing > 0 {
            debug!("Resuming {} from byte {}", url, existing);
            request = request.header(RANGE, format!("bytes={}-", existing));
        }
        let response = request.send().map_err(|e| request_error(url, e))?;

        let (response, resume_from) = match response.status() {
            StatusCode::PARTIAL_CONTENT if existing > 0 => (response, existing),
            StatusCode::RANGE_NOT_SATISFIABLE => {
                debug!("Range not satisfiable for {}, restarting", url);
                drop(response);
                let fresh = self.client.get(url).send().map_err(|e| request_error(url, e))?;
                (check_status(url, fresh)?, 0)
            }
            _ => (check_status(url, response)?, 0),
        };

        let total = response.content_length().map(|len| len + resume_from);
        let mut hasher = Sha256::new();
        let mut file = if resume_from > 0 {
            let mut previous = File::open(partial).map_err(|e| Error::io(partial, e))?;
            io::copy(&mut previous, &mut hasher).map_err(|e| Error::io(partial, e))?;
            OpenOptions::new()
                .append(true)
                .open(partial)
                .map_err(|e| Error::io(partial, e))?
        } else {
            File::create(partial).map_err(|e| Error::io(partial, e))?
        };

        let tracker = ProgressTracker::new(
            self.reporter.as_ref(),
            &describe(url),
            total,
            resume_from,
        );
        copy_body(url, response, &mut file, &mut hasher, &tracker, partial)?;
        file.sync_all().map_err(|e| Error::io(partial, e))?;
        let snapshot = tracker.finish();

        Ok(Attempt {
            bytes: snapshot.transferred,
            digest: hex::encode(hasher.finalize()),
            resumed: resume_from > 0,
        })
    }

    /// Downloads a checksum file and extracts the SHA-256 it announces.
    pub fn fetch_checksum(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().map_err(|e| request_error(url, e))?;
        let response = check_status(url, response)?;
        let mut body = String::new();
        response
            .take(4096)
            .read_to_string(&mut body)
            .map_err(|e| Error::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(parse_checksum(&body))
    }
}

fn copy_body(
    url: &str,
    mut response: Response,
    file: &mut File,
    hasher: &mut Sha256,
    tracker: &ProgressTracker<'_>,
    partial: &Path,
) -> Result<()> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = match response.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(Error::Transport {
                    url: url.to_string(),
                    message: format!("download interrupted: {}", e),
                });
            }
        };
        file.write_all(&buf[..n]).map_err(|e| Error::io(partial, e))?;
        hasher.update(&buf[..n]);
        tracker.advance(n as u64);
    }
}

/// The resumable path used while `destination` is being downloaded.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Maps a response status to success, a retryable transport error, or a fatal one.
pub(crate) fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(status_error(url, status))
}

pub(crate) fn status_error(url: &str, status: StatusCode) -> Error {
    if is_fatal_status(status) {
        Error::FatalHttp {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        Error::Transport {
            url: url.to_string(),
            message: format!("HTTP {}", status.as_u16()),
        }
    }
}

/// 4xx responses are fatal except 408 Request Timeout and 429 Too Many Requests.
pub fn is_fatal_status(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}

pub(crate) fn request_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_builder() {
        return Error::Config(format!("invalid download URL {}: {}", url, err));
    }
    Error::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

fn describe(url: &str) -> String {
    url.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(url)
        .to_string()
}

/// Extracts a SHA-256 from a checksum file body.
///
/// Handles a bare digest, GNU coreutils (`<hex>  file`) and BSD
/// (`SHA256 (file) = <hex>`) layouts. Anything else is returned trimmed so that
/// verification fails loudly instead of silently passing.
pub fn parse_checksum(body: &str) -> String {
    let line = body.trim();
    line.split_whitespace()
        .map(|part| part.trim_start_matches('=').trim())
        .find(|part| part.len() == 64 && is_hex(part))
        .map(|part| part.to_ascii_lowercase())
        .unwrap_or_else(|| line.to_string())
}

/// SHA-256 of an in-memory buffer, lowercase hex.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 of a file, lowercase hex.
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| Error::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Checks a digest against an expected value, case-insensitively and ignoring
/// surrounding whitespace.
pub fn digest_matches(actual: &str, expected: &str) -> bool {
    format_hash(actual) == format_hash(expected)
}
