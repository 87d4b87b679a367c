//! Blocking, rate-limited HTTP transport for one device.
//!
//! - Blocking client using `ureq` (no async).
//! - Requests start at least [`MIN_REQUEST_INTERVAL`] apart, whatever their
//!   kind and whether the previous one failed. The unit drops connections
//!   when polled faster.
//! - Owns the availability flag: a transport failure clears it, any JSON
//!   response sets it.

use http::StatusCode;
use log::{debug, error, warn};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET /api.html`, liveness probe.
    Probe,
    /// `POST /api.cgi`, parameter and status commands.
    Api,
    /// `POST /test.cgi`, maintenance commands.
    Test,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Probe => "api.html",
            Endpoint::Api => "api.cgi",
            Endpoint::Test => "test.cgi",
        }
    }
}

/// Source of time for pacing.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

/// The HTTP round trip itself. Every `Err` must be [`Error::Transport`].
pub trait HttpBackend: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpReply>;
    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply>;
}

impl<T: HttpBackend + ?Sized> HttpBackend for Arc<T> {
    fn get(&self, url: &str) -> Result<HttpReply> {
        (**self).get(url)
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply> {
        (**self).post_json(url, body)
    }
}

/// `ureq` agent with a fixed per-request timeout.
pub struct UreqBackend {
    agent: ureq::Agent,
}

impl UreqBackend {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            // Non-2xx bodies are still classified by the transport.
            .http_status_as_error(false)
            .build();
        UreqBackend {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn read(resp: std::result::Result<http::Response<ureq::Body>, ureq::Error>) -> Result<HttpReply> {
        let mut resp = resp.map_err(|e| Error::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(HttpReply { status, body })
    }
}

impl HttpBackend for UreqBackend {
    fn get(&self, url: &str) -> Result<HttpReply> {
        Self::read(self.agent.get(url).call())
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply> {
        Self::read(self.agent.post(url).send_json(body))
    }
}

pub struct Transport {
    backend: Box<dyn HttpBackend>,
    clock: Arc<dyn Clock>,
    base_url: String,
    min_interval: Duration,
    last_request: Option<Instant>,
    available: Arc<AtomicBool>,
}

impl Transport {
    pub fn new(host: &str, backend: Box<dyn HttpBackend>, clock: Arc<dyn Clock>) -> Self {
        let host = host.trim().trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        Transport {
            backend,
            clock,
            base_url,
            min_interval: MIN_REQUEST_INTERVAL,
            last_request: None,
            available: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Real HTTP with the system clock.
    pub fn http(host: &str, timeout: Duration) -> Self {
        Self::new(host, Box::new(UreqBackend::new(timeout)), Arc::new(SystemClock))
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    /// Shared handle to the availability flag.
    pub fn availability(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.available)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Block until the next request may start, then claim that start time.
    fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = self.clock.now().saturating_duration_since(last);
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!("Transport: waiting {}ms before next request", wait.as_millis());
                self.clock.sleep(wait);
            }
        }
        self.last_request = Some(self.clock.now());
    }

    fn mark(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// `GET /api.html`; only HTTP 200 counts as alive.
    pub fn probe(&mut self) -> Result<()> {
        let url = self.url(Endpoint::Probe);
        self.pace();
        match self.backend.get(&url) {
            Ok(reply) if reply.status == StatusCode::OK => {
                self.mark(true);
                Ok(())
            }
            Ok(reply) => {
                self.mark(false);
                warn!("Transport: probe {} returned http {}", url, reply.status.as_u16());
                Err(Error::Protocol(format!("probe returned http {}", reply.status.as_u16())))
            }
            Err(e) => {
                self.mark(false);
                error!("Transport: probe {} failed: {}", url, e);
                Err(e)
            }
        }
    }

    /// POST a JSON body and return the decoded JSON answer.
    pub fn post(&mut self, endpoint: Endpoint, body: &Value) -> Result<Value> {
        let url = self.url(endpoint);
        self.pace();
        debug!("Transport: POST {} {}", url, body);

        let reply = match self.backend.post_json(&url, body) {
            Ok(reply) => reply,
            Err(e) => {
                self.mark(false);
                error!("Transport: POST {} failed: {}", url, e);
                return Err(e);
            }
        };

        let content: Value = match serde_json::from_str(&reply.body) {
            Ok(v) => v,
            Err(e) => {
                error!("Transport: failed to parse JSON from {}: {}", url, e);
                return Err(Error::Protocol(format!(
                    "malformed body (http {}): {}",
                    reply.status.as_u16(),
                    e
                )));
            }
        };
        self.mark(true);
        debug!("Transport: http {} {}", reply.status.as_u16(), content);

        if !reply.status.is_success() {
            return Err(Error::Protocol(format!("http {}: {}", reply.status.as_u16(), content)));
        }
        if content.get("status").and_then(Value::as_str) == Some("timeout") {
            warn!("Transport: device timeout for request {}", body);
            return Err(Error::DeviceTimeout);
        }
        Ok(content)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_urls_from_host() {
        let (t, _, _) = scripted_transport("192.168.1.50");
        assert_eq!(t.url(Endpoint::Api), "http://192.168.1.50/api.cgi");
        assert_eq!(t.url(Endpoint::Probe), "http://192.168.1.50/api.html");
        let (t, _, _) = scripted_transport("http://terneo.local:8080/");
        assert_eq!(t.url(Endpoint::Test), "http://terneo.local:8080/test.cgi");
    }

    #[test]
    fn back_to_back_requests_are_spaced() {
        let (mut t, backend, clock) = scripted_transport("dev");
        backend.push_json(json!({"ok": 1}));
        backend.push_json(json!({"ok": 2}));
        backend.push_json(json!({"ok": 3}));

        t.post(Endpoint::Api, &json!({"cmd": 1})).unwrap();
        t.post(Endpoint::Api, &json!({"cmd": 4})).unwrap();
        t.post(Endpoint::Test, &json!({"cmd": "restart"})).unwrap();

        let reqs = backend.requests();
        assert_eq!(reqs.len(), 3);
        for pair in reqs.windows(2) {
            assert!(pair[1].at.duration_since(pair[0].at) >= MIN_REQUEST_INTERVAL);
        }
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn no_wait_after_idle_period() {
        let (mut t, backend, clock) = scripted_transport("dev");
        backend.push_json(json!({}));
        backend.push_json(json!({}));
        t.post(Endpoint::Api, &json!({})).unwrap();
        clock.advance(Duration::from_secs(3));
        t.post(Endpoint::Api, &json!({})).unwrap();
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn failed_attempt_marks_unavailable_and_still_paces() {
        let (mut t, backend, _clock) = scripted_transport("dev");
        backend.push_json(json!({"a": 1}));
        backend.push_error("connection refused");
        backend.push_json(json!({"a": 2}));

        t.post(Endpoint::Api, &json!({})).unwrap();
        assert!(t.is_available());

        let err = t.post(Endpoint::Api, &json!({})).unwrap_err();
        assert!(err.is_transport());
        assert!(!t.is_available());

        t.post(Endpoint::Api, &json!({})).unwrap();
        assert!(t.is_available());

        let reqs = backend.requests();
        assert!(reqs[1].at.duration_since(reqs[0].at) >= MIN_REQUEST_INTERVAL);
        assert!(reqs[2].at.duration_since(reqs[1].at) >= MIN_REQUEST_INTERVAL);
    }

    #[test]
    fn malformed_body_leaves_availability_alone() {
        let (mut t, backend, _) = scripted_transport("dev");
        backend.push_json(json!({}));
        backend.push_raw(200, "<html>oops</html>");
        t.post(Endpoint::Api, &json!({})).unwrap();
        let err = t.post(Endpoint::Api, &json!({})).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(t.is_available());
    }

    #[test]
    fn device_timeout_is_recoverable_but_proves_reachability() {
        let (mut t, backend, _) = scripted_transport("dev");
        backend.push_json(json!({"status": "timeout"}));
        let err = t.post(Endpoint::Api, &json!({"cmd": 4})).unwrap_err();
        assert!(matches!(err, Error::DeviceTimeout));
        assert!(t.is_available());
    }

    #[test]
    fn non_success_status_is_protocol_error() {
        let (mut t, backend, _) = scripted_transport("dev");
        backend.push_raw(500, r#"{"error":"internal"}"#);
        let err = t.post(Endpoint::Api, &json!({})).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(t.is_available());
    }

    #[test]
    fn probe_requires_http_200() {
        let (mut t, backend, _) = scripted_transport("dev");
        backend.push_raw(200, "<html></html>");
        backend.push_raw(404, "");
        t.probe().unwrap();
        assert!(t.is_available());
        assert!(t.probe().is_err());
        assert!(!t.is_available());
        assert_eq!(backend.requests()[0].method, "GET");
        assert_eq!(backend.requests()[0].url, "http://dev/api.html");
    }
}
