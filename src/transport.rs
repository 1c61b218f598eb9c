use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use crate::logger::{MessageLogMode, MessageLogger};
use crate::{Error, Result};

/// Per-request timeouts. Every outbound request carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Protocol detection probes.
    pub probe: Duration,
    /// Node scan probes, where no answer is the common case.
    pub scan: Duration,
    /// Everything else.
    pub request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(5),
            scan: Duration::from_secs(2),
            request: Duration::from_secs(10),
        }
    }
}

pub(crate) struct Reply {
    pub url: String,
    pub status: u16,
    /// `Null` when the body was empty or not JSON.
    pub body: Value,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Fail on any non-2xx status.
    pub fn require_success(self) -> Result<Self> {
        if (200..300).contains(&self.status) {
            Ok(self)
        } else {
            Err(Error::Status {
                url: self.url,
                status: self.status,
            })
        }
    }

    /// Successful response with a JSON body.
    pub fn into_json(self) -> Result<(String, Value)> {
        let reply = self.require_success()?;
        if reply.body.is_null() {
            return Err(Error::MissingField {
                field: "JSON body",
                url: reply.url,
            });
        }
        Ok((reply.url, reply.body))
    }
}

/// Plain HTTP access to one device.
pub(crate) struct Transport {
    http: reqwest::Client,
    host: String,
    base_url: String,
    timeouts: Timeouts,
    logger: Option<Mutex<MessageLogger>>,
}

impl Transport {
    pub fn new(http: reqwest::Client, host: &str, timeouts: Timeouts) -> Self {
        Self {
            http,
            host: host.to_string(),
            base_url: format!("http://{host}"),
            timeouts,
            logger: None,
        }
    }

    pub fn with_message_log(mut self, mode: MessageLogMode, path: &str) -> Result<Self> {
        self.logger = Some(Mutex::new(MessageLogger::new(mode, path)?));
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub async fn get(&self, path: &str, timeout: Duration) -> Result<Reply> {
        let url = format!("{}{}", self.base_url, path);
        trace!(url = %url, "GET");
        self.with_logger(|l| l.log_request("GET", path, None));

        let resp = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from_request(&url, e))?;
        self.read_reply(path, url, resp).await
    }

    pub async fn post_json(&self, path: &str, payload: &Value, timeout: Duration) -> Result<Reply> {
        let url = format!("{}{}", self.base_url, path);
        trace!(url = %url, "POST");
        self.with_logger(|l| l.log_request("POST", path, Some(payload)));

        let resp = self
            .http
            .post(&url)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::from_request(&url, e))?;
        self.read_reply(path, url, resp).await
    }

    pub fn log_command(&self, command: &str, node: Option<u8>, value: &Value) {
        self.with_logger(|l| l.log_command(command, node, value));
    }

    async fn read_reply(&self, path: &str, url: String, resp: reqwest::Response) -> Result<Reply> {
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::from_request(&url, e))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        self.with_logger(|l| l.log_response(path, status, &body));
        Ok(Reply { url, status, body })
    }

    fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut guard) = logger.lock()
        {
            f(&mut guard);
        }
    }
}
