// Jetpack
// Copyright (C) Riff Labs Limited <team@riff.cc>
// Based on Jetporch by Michael DeHaan <michael@michaeldehaan.net> + contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

//! One HTTP exchange with the cluster.
//!
//! The [`Transport`] trait is the seam between the reconciler and the
//! network. [`HttpTransport`] drives reqwest on a current-thread tokio
//! runtime and blocks until the reply is read.

use crate::error::{CohesityError, Result};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("jetpack-cohesity/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        write!(f, "{}", verb)
    }
}

#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: vec![(String::from("Accept"), String::from("application/json"))],
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body: &[u8] = if self.body.iter().all(|b| b.is_ascii_whitespace()) { b"null" } else { &self.body };
        serde_json::from_slice(body)
            .map_err(|e| CohesityError::Transport(format!("Failed to parse cluster response: {}", e)))
    }

    /// The `message` field of a JSON error body, or the raw body.
    pub fn server_message(&self) -> String {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            if let Some(serde_json::Value::String(msg)) = map.get("message") {
                return msg.clone();
            }
        }
        self.text()
    }
}

pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpTransport {
    pub fn new(validate_certs: bool, timeout_secs: u64) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CohesityError::Transport(format!("Failed to create async runtime: {}", e)))?;
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!validate_certs)
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CohesityError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, runtime })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.runtime.block_on(async {
            let mut builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
                Method::Put => self.client.put(&request.url),
                Method::Delete => self.client.delete(&request.url),
            };
            for (name, value) in request.headers.iter() {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send()
                .await
                .map_err(|e| CohesityError::Transport(format!("Failed to reach {} {}: {}", request.method, request.url, e)))?;

            let status = response.status().as_u16();
            let headers = response.headers().iter()
                .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            let body = response.bytes()
                .await
                .map_err(|e| CohesityError::Transport(format!("Failed to read reply from {}: {}", request.url, e)))?;

            Ok(ApiResponse { status, headers, body: body.to_vec() })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_prefers_json_message() {
        let response = ApiResponse::new(400, r#"{"errorCode":"KValidationError","message":"Invalid start time"}"#);
        assert_eq!(response.server_message(), "Invalid start time");
    }

    #[test]
    fn test_server_message_falls_back_to_body() {
        let response = ApiResponse::new(502, "Bad Gateway");
        assert_eq!(response.server_message(), "Bad Gateway");
    }

    #[test]
    fn test_empty_body_decodes_as_null() {
        let response = ApiResponse::new(204, "");
        let value: serde_json::Value = response.json().unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = ApiResponse::new(200, "").with_header("Content-Disposition", "attachment; filename=agent.sh");
        assert_eq!(response.header("content-disposition"), Some("attachment; filename=agent.sh"));
    }
}
