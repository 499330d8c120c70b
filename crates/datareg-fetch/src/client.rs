use std::error::Error as _;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::thread;

use datareg_core::digest::{normalize_sha256, HashingWriter};
use datareg_core::{FetchSettings, Secret};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderValue, CONTENT_TYPE, ETAG};
use reqwest::Url;
use tempfile::NamedTempFile;

use crate::error::FetchError;
use crate::progress::{NoProgress, TransferProgress};
use crate::retry::{classify_status, run_with_retry, AttemptOutcome, RetryPolicy, StatusClass};

const READ_CHUNK: usize = 64 * 1024;

/// What to fetch and where to stage it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Directory the temp file is created in. Must be on the destination's filesystem.
    pub temp_dir: PathBuf,
    /// Leading part of the temp file name, usually the destination filename.
    pub temp_prefix: String,
    pub headers: Vec<(String, Secret)>,
    pub bearer: Option<Secret>,
    pub expected_sha256: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            temp_dir: temp_dir.into(),
            temp_prefix: "download".to_string(),
            headers: Vec::new(),
            bearer: None,
            expected_sha256: None,
        }
    }

    pub fn temp_prefix(mut self, prefix: &str) -> Self {
        self.temp_prefix = prefix.to_string();
        self
    }

    pub fn header(mut self, name: &str, value: Secret) -> Self {
        self.headers.push((name.to_string(), value));
        self
    }

    pub fn bearer(mut self, token: Secret) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn expected_sha256(mut self, hex: Option<String>) -> Self {
        self.expected_sha256 = hex;
        self
    }
}

/// A fully written, fsynced temp file and its digest.
///
/// Dropping it deletes the temp file, so a caller that bails out before
/// installing leaves nothing behind.
#[derive(Debug)]
pub struct FetchedFile {
    pub temp: NamedTempFile,
    pub sha256: String,
    pub size_bytes: u64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub attempts: u32,
}

/// Blocking HTTP(S) client with bounded retries.
pub struct DownloadClient {
    client: Client,
    policy: RetryPolicy,
}

enum BodyError {
    /// The connection failed mid-body; worth another attempt.
    Read(io::Error),
    /// Local disk failure; retrying will not help.
    Write(io::Error),
}

impl DownloadClient {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        // The blocking client applies `timeout` to the request and to each body read.
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            policy: RetryPolicy::from(settings),
        })
    }

    /// Download `req.url` into a temp file under `req.temp_dir`.
    ///
    /// On a hash mismatch the temp file is removed before returning.
    pub fn fetch(&self, req: &FetchRequest) -> Result<FetchedFile, FetchError> {
        self.fetch_with_progress(req, &NoProgress)
    }

    /// Like [`fetch`](Self::fetch), reporting body bytes to `progress` as they land.
    pub fn fetch_with_progress(
        &self,
        req: &FetchRequest,
        progress: &dyn TransferProgress,
    ) -> Result<FetchedFile, FetchError> {
        let url = parse_url(&req.url)?;
        let expected = req
            .expected_sha256
            .as_deref()
            .map(|hex| {
                normalize_sha256(hex).ok_or_else(|| FetchError::InvalidExpectedHash(hex.to_string()))
            })
            .transpose()?;

        tracing::info!(url = %req.url, temp_dir = %req.temp_dir.display(), "fetching");
        let fetched = run_with_retry(
            &self.policy,
            &req.url,
            |attempt| self.attempt(&url, req, attempt, progress),
            thread::sleep,
        )?;

        if let Some(expected) = expected {
            if fetched.sha256 != expected {
                let FetchedFile {
                    temp,
                    sha256,
                    size_bytes,
                    ..
                } = fetched;
                temp.close()?;
                tracing::warn!(url = %req.url, %expected, actual = %sha256, "hash mismatch, temp file discarded");
                return Err(FetchError::HashMismatch {
                    url: req.url.clone(),
                    expected,
                    actual: sha256,
                    size_bytes,
                });
            }
        }

        tracing::info!(
            url = %req.url,
            sha256 = %fetched.sha256,
            size_bytes = fetched.size_bytes,
            content_type = fetched.content_type.as_deref().unwrap_or("-"),
            attempts = fetched.attempts,
            "fetched"
        );
        Ok(fetched)
    }

    fn attempt(
        &self,
        url: &Url,
        req: &FetchRequest,
        attempt: u32,
        progress: &dyn TransferProgress,
    ) -> AttemptOutcome<FetchedFile> {
        tracing::debug!(url = %req.url, attempt, "sending request");
        let mut builder = self.client.get(url.clone());
        for (name, value) in &req.headers {
            let mut value = match HeaderValue::from_str(value.expose()) {
                Ok(v) => v,
                Err(_) => {
                    return AttemptOutcome::Fatal(FetchError::Client(format!(
                        "header {name} has a value that is not valid in HTTP"
                    )))
                }
            };
            value.set_sensitive(true);
            builder = builder.header(name.as_str(), value);
        }
        if let Some(token) = &req.bearer {
            builder = builder.bearer_auth(token.expose());
        }

        let response = match builder.send() {
            Ok(r) => r,
            Err(e) => return classify_send_error(&req.url, &e),
        };

        let status = response.status();
        match classify_status(status.as_u16()) {
            StatusClass::Success => {}
            StatusClass::Retryable => return AttemptOutcome::Retry(format!("HTTP {status}")),
            StatusClass::Fatal => {
                return AttemptOutcome::Fatal(FetchError::Download {
                    status: Some(status.as_u16()),
                    url: req.url.clone(),
                    reason: format!("HTTP {status}"),
                })
            }
        }

        let etag = header_string(&response, ETAG);
        let content_type = header_string(&response, CONTENT_TYPE);
        let declared_len = response.content_length();

        let temp = match tempfile::Builder::new()
            .prefix(&format!(".{}.", req.temp_prefix))
            .suffix(".part")
            .tempfile_in(&req.temp_dir)
        {
            Ok(t) => t,
            Err(e) => return AttemptOutcome::Fatal(FetchError::Io(e)),
        };

        progress.start(declared_len);
        let (temp, sha256, size_bytes) = match stream_body(response, temp, progress) {
            Ok(done) => done,
            Err(BodyError::Read(e)) => return AttemptOutcome::Retry(format!("body read failed: {e}")),
            Err(BodyError::Write(e)) => return AttemptOutcome::Fatal(FetchError::Io(e)),
        };

        if let Some(declared) = declared_len {
            if declared != size_bytes {
                return AttemptOutcome::Retry(format!(
                    "truncated body: expected {declared} bytes, got {size_bytes}"
                ));
            }
        }

        AttemptOutcome::Done(FetchedFile {
            temp,
            sha256,
            size_bytes,
            etag,
            content_type,
            attempts: attempt,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn header_string(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn stream_body(
    mut response: impl Read,
    temp: NamedTempFile,
    progress: &dyn TransferProgress,
) -> Result<(NamedTempFile, String, u64), BodyError> {
    let mut writer = HashingWriter::new(BufWriter::new(temp));
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match response.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BodyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(BodyError::Write)?;
        progress.advance(n as u64);
    }
    let (buffered, sha256, size) = writer.finish();
    let temp = buffered
        .into_inner()
        .map_err(|e| BodyError::Write(e.into_error()))?;
    temp.as_file().sync_all().map_err(BodyError::Write)?;
    Ok((temp, sha256, size))
}

fn classify_send_error<T>(url: &str, err: &reqwest::Error) -> AttemptOutcome<T> {
    let chain = error_chain(err);
    if is_dns_failure(&chain) {
        return AttemptOutcome::Fatal(FetchError::Download {
            status: None,
            url: url.to_string(),
            reason: format!("DNS resolution failed: {chain}"),
        });
    }
    if err.is_builder() {
        return AttemptOutcome::Fatal(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: chain,
        });
    }
    // Timeouts, refused/reset connections and protocol hiccups are all transient.
    AttemptOutcome::Retry(chain)
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn is_dns_failure(chain: &str) -> bool {
    let lower = chain.to_ascii_lowercase();
    [
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "nodename nor servname",
        "no such host",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}
