//! Transport dispatch: HTTP smart protocol or a local `git` subprocess
//!
//! `http(s)://` URLs POST to the service endpoints with the v2 protocol
//! header; `file://` URLs pipe the same bytes through `git upload-pack` /
//! `git receive-pack` running in stateless-RPC mode. Authentication is the
//! caller's business: a [`RequestDecorator`] gets the last word on every
//! outgoing HTTP request.

use crate::config::RequestConfig;
use crate::error::WireError;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Response headers, keyed by header name.
///
/// Empty for `file://` transports. Kept as a plain sorted map so debug
/// records serialize deterministically.
pub type ResponseHeaders = BTreeMap<String, Vec<String>>;

/// Hook for decorating outgoing HTTP requests (authorization headers,
/// tracing propagation, and similar). Implementations must be shareable
/// across concurrent operations.
pub trait RequestDecorator: Send + Sync {
    fn decorate(&self, request: reqwest::blocking::RequestBuilder)
        -> reqwest::blocking::RequestBuilder;
}

/// The wire transport for one remote endpoint style.
///
/// Cheap to clone; the underlying HTTP client is shared.
#[derive(Clone)]
pub struct Transport {
    client: reqwest::blocking::Client,
    decorator: Option<Arc<dyn RequestDecorator>>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    /// A transport with no request decoration
    pub fn new() -> Self {
        Self { client: reqwest::blocking::Client::new(), decorator: None }
    }

    /// A transport that runs every HTTP request through `decorator`
    pub fn with_decorator(decorator: Arc<dyn RequestDecorator>) -> Self {
        Self { client: reqwest::blocking::Client::new(), decorator: Some(decorator) }
    }

    /// POST a protocol-v2 request to `git-upload-pack` and hand the response
    /// to `parse`. Failed attempts (transport or parse) are retried up to the
    /// configured count; the final error joins every attempt's failure.
    pub fn call_upload_pack<T>(
        &self,
        repo_url: &str,
        body: &[u8],
        config: &RequestConfig,
        parse: impl Fn(&ResponseHeaders, &[u8]) -> Result<T, WireError>,
    ) -> Result<T, WireError> {
        let attempts = config.fetch_attempts();
        let mut errors: Vec<WireError> = Vec::new();
        for attempt in 1..=attempts {
            let result = self
                .upload_pack_once(repo_url, body, config.fetch_timeout)
                .and_then(|(headers, data)| parse(&headers, &data));
            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt < attempts {
                        tracing::debug!(attempt, error = %e, "fetch attempt failed, retrying");
                    }
                    errors.push(e);
                }
            }
        }
        match errors.pop() {
            Some(last) if errors.is_empty() => Err(last),
            Some(last) => {
                errors.push(last);
                let detail =
                    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                Err(WireError::RetriesExhausted { attempts, detail })
            }
            None => Err(WireError::RetriesExhausted { attempts, detail: String::new() }),
        }
    }

    fn upload_pack_once(
        &self,
        repo_url: &str,
        body: &[u8],
        timeout: Option<Duration>,
    ) -> Result<(ResponseHeaders, Vec<u8>), WireError> {
        if repo_url.starts_with("http") {
            let url = service_url(repo_url, "git-upload-pack");
            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/x-git-upload-pack-request")
                .header("Accept", "application/x-git-upload-pack-result")
                .header("Git-Protocol", "version=2")
                .body(body.to_vec());
            request = self.apply(request, timeout);
            send(request, timeout)
        } else if repo_url.starts_with("file") {
            let path = strip_file_scheme(repo_url);
            let stdout = run_git(
                &["-c", "uploadpack.allowFilter=1", "upload-pack", "--stateless-rpc", &path],
                body.to_vec(),
                timeout,
            )?;
            Ok((ResponseHeaders::new(), stdout))
        } else {
            Err(WireError::UnsupportedProtocol(repo_url.to_string()))
        }
    }

    /// First push round trip: the receive-pack reference advertisement.
    pub fn receive_pack_advertisement(
        &self,
        repo_url: &str,
        timeout: Option<Duration>,
    ) -> Result<(ResponseHeaders, Vec<u8>), WireError> {
        if repo_url.starts_with("http") {
            let url = format!(
                "{}/info/refs?service=git-receive-pack",
                repo_url.trim_end_matches('/')
            );
            let mut request = self.client.get(url);
            request = self.apply(request, timeout);
            send(request, timeout)
        } else if repo_url.starts_with("file") {
            let path = strip_file_scheme(repo_url);
            let stdout = run_git(
                &["receive-pack", "--stateless-rpc", "--advertise-refs", &path],
                Vec::new(),
                timeout,
            )?;
            Ok((ResponseHeaders::new(), stdout))
        } else {
            Err(WireError::UnsupportedProtocol(repo_url.to_string()))
        }
    }

    /// Second push round trip: commands plus packfile to `git-receive-pack`.
    pub fn receive_pack(
        &self,
        repo_url: &str,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<(ResponseHeaders, Vec<u8>), WireError> {
        if repo_url.starts_with("http") {
            let url = service_url(repo_url, "git-receive-pack");
            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/x-git-receive-pack-request")
                .header("Accept", "application/x-git-receive-pack-result")
                .body(body);
            request = self.apply(request, timeout);
            send(request, timeout)
        } else if repo_url.starts_with("file") {
            let path = strip_file_scheme(repo_url);
            let stdout =
                run_git(&["receive-pack", "--stateless-rpc", &path], body, timeout)?;
            Ok((ResponseHeaders::new(), stdout))
        } else {
            Err(WireError::UnsupportedProtocol(repo_url.to_string()))
        }
    }

    fn apply(
        &self,
        mut request: reqwest::blocking::RequestBuilder,
        timeout: Option<Duration>,
    ) -> reqwest::blocking::RequestBuilder {
        if let Some(t) = timeout {
            request = request.timeout(t);
        }
        if let Some(decorator) = &self.decorator {
            request = decorator.decorate(request);
        }
        request
    }
}

fn send(
    request: reqwest::blocking::RequestBuilder,
    timeout: Option<Duration>,
) -> Result<(ResponseHeaders, Vec<u8>), WireError> {
    let response = request.send().map_err(|e| classify(e, timeout))?;
    let headers = collect_headers(&response);
    let status = response.status();
    if !status.is_success() {
        return Err(WireError::HttpStatus(status.as_u16()));
    }
    let data = response.bytes().map_err(|e| classify(e, timeout))?.to_vec();
    Ok((headers, data))
}

fn classify(error: reqwest::Error, timeout: Option<Duration>) -> WireError {
    if error.is_timeout() {
        WireError::Timeout(timeout.unwrap_or_default())
    } else {
        WireError::Http(error)
    }
}

fn collect_headers(response: &reqwest::blocking::Response) -> ResponseHeaders {
    let mut headers = ResponseHeaders::new();
    for (name, value) in response.headers() {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

fn service_url(repo_url: &str, service: &str) -> String {
    format!("{}/{}", repo_url.trim_end_matches('/'), service)
}

fn strip_file_scheme(repo_url: &str) -> String {
    repo_url.trim_start_matches("file://").to_string()
}

/// Run `git` with `input` on stdin, returning its stdout.
///
/// The child is killed if the deadline passes before it exits.
fn run_git(
    args: &[&str],
    input: Vec<u8>,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, WireError> {
    let mut child = Command::new("git")
        .args(args)
        .env("GIT_PROTOCOL", "version=2")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| WireError::Subprocess(format!("failed to spawn git: {}", e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| WireError::Subprocess("missing child stdin".to_string()))?;
    let writer = std::thread::spawn(move || {
        // The child may exit without draining stdin; a broken pipe here is
        // not interesting on its own.
        let _ = stdin.write_all(&input);
    });

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| WireError::Subprocess("missing child stdout".to_string()))?;
    let stdout_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let result = stdout_pipe.read_to_end(&mut buf);
        result.map(|_| buf)
    });
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| WireError::Subprocess("missing child stderr".to_string()))?;
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let deadline = timeout.map(|t| Instant::now() + t);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = writer.join();
                        let _ = stdout_reader.join();
                        let _ = stderr_reader.join();
                        return Err(WireError::Timeout(timeout.unwrap_or_default()));
                    }
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => {
                return Err(WireError::Subprocess(format!("waiting for git: {}", e)));
            }
        }
    };

    let _ = writer.join();
    let stdout = stdout_reader
        .join()
        .map_err(|_| WireError::Subprocess("stdout reader panicked".to_string()))?
        .map_err(|e| WireError::Subprocess(format!("reading git stdout: {}", e)))?;
    let stderr = stderr_reader
        .join()
        .map_err(|_| WireError::Subprocess("stderr reader panicked".to_string()))?;

    if !status.success() {
        let text = String::from_utf8_lossy(&stderr);
        return Err(WireError::Subprocess(format!(
            "git {} exited with {}: {}",
            args.first().copied().unwrap_or(""),
            status,
            text.trim()
        )));
    }
    Ok(stdout)
}
