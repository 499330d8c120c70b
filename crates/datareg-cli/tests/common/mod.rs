#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use assert_cmd::Command;
use tiny_http::{Request, Response, Server, StatusCode};

/// An in-process HTTP server that answers requests from a fixed script.
///
/// Request `n` gets `script[n]`; once the script runs out the last entry
/// repeats, so a single-entry script serves any number of clients.
pub struct Fixture {
    pub base: String,
    hits: Arc<AtomicUsize>,
    headers: Arc<Mutex<Vec<Vec<(String, String)>>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Fixture {
    pub fn serve(script: Vec<(u16, Vec<u8>)>) -> Self {
        assert!(!script.is_empty());
        Self::spawn(move |n, req, _stop| {
            let (status, body) = &script[n.min(script.len() - 1)];
            let _ = req.respond(Response::from_data(body.clone()).with_status_code(StatusCode(*status)));
        })
    }

    /// Answers 200 with a `Content-Length` of `declared` bytes, sends `prefix`
    /// and then stalls until the fixture is dropped.
    pub fn stalling(prefix: Vec<u8>, declared: usize) -> Self {
        assert!(declared > prefix.len());
        Self::spawn(move |_, req, stop| {
            let body = StallingBody {
                prefix: Cursor::new(prefix.clone()),
                stop,
            };
            let _ = req.respond(Response::new(StatusCode(200), Vec::new(), body, Some(declared), None));
        })
    }

    fn spawn<F>(respond: F) -> Self
    where
        F: Fn(usize, Request, Arc<AtomicBool>) + Send + 'static,
    {
        let server = Server::http("127.0.0.1:0").expect("bind fixture server");
        let base = format!("http://{}", server.server_addr());
        let hits = Arc::new(AtomicUsize::new(0));
        let headers = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let (hits, headers, stop) = (hits.clone(), headers.clone(), stop.clone());
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let req = match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(r)) => r,
                        Ok(None) => continue,
                        Err(_) => break,
                    };
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    headers.lock().unwrap().push(
                        req.headers()
                            .iter()
                            .map(|h| (h.field.as_str().as_str().to_ascii_lowercase(), h.value.as_str().to_string()))
                            .collect(),
                    );
                    respond(n, req, stop.clone());
                }
            })
        };

        Self {
            base,
            hits,
            headers,
            stop,
            handle: Some(handle),
        }
    }

    pub fn ok(body: &[u8]) -> Self {
        Self::serve(vec![(200, body.to_vec())])
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Value of header `name` on request `n`, if it was sent.
    pub fn header(&self, n: usize, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.headers.lock().unwrap().get(n).and_then(|hs| {
            hs.iter().find(|(k, _)| *k == name).map(|(_, v)| v.clone())
        })
    }
}

/// Yields its prefix, then blocks until `stop` is set and ends the body short.
struct StallingBody {
    prefix: Cursor<Vec<u8>>,
    stop: Arc<AtomicBool>,
}

impl Read for StallingBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.prefix.read(buf)?;
        if n > 0 {
            return Ok(n);
        }
        while !self.stop.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(20));
        }
        Ok(0)
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// `datareg --root <root>` with retries kept fast.
pub fn datareg(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("datareg").expect("datareg binary");
    cmd.arg("--root").arg(root);
    cmd.env_remove("DATAREG_ROOT")
        .env_remove("DATAREG_MAX_ATTEMPTS")
        .env_remove("DATAREG_TIMEOUT_SECS")
        .env("DATAREG_RETRY_BASE_MS", "1")
        .env_remove("RUST_LOG");
    cmd
}

/// Registry lines after the header.
pub fn registry_rows(root: &Path) -> Vec<String> {
    match fs::read_to_string(root.join("data/_registry.csv")) {
        Ok(text) => text.lines().skip(1).map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    datareg_core::digest::sha256_hex(bytes)
}
