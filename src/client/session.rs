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

//! Authenticated access to one cluster.
//!
//! Every call goes through [`ClusterSession::execute`], which attaches the
//! bearer token and, when the cluster reports the token expired, exchanges
//! credentials once and replays the request once. Nothing above this layer
//! retries.

use crate::client::auth::{Credentials, TokenProvider};
use crate::client::transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
use crate::config::ResolvedConnection;
use crate::error::{CohesityError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub const API_ROOT: &str = "/irisservices/api/v1";

pub struct ClusterSession {
    cluster: String,
    transport: Arc<dyn Transport>,
    tokens: TokenProvider,
}

impl ClusterSession {
    pub fn new(cluster: &str, credentials: Credentials, transport: Arc<dyn Transport>) -> Self {
        Self {
            cluster: cluster.to_string(),
            transport,
            tokens: TokenProvider::new(credentials),
        }
    }

    pub fn from_connection(connection: &ResolvedConnection, transport: Option<Arc<dyn Transport>>) -> Result<Self> {
        let credentials = Credentials::new(&connection.username, &connection.password, connection.domain.as_deref())?;
        let transport: Arc<dyn Transport> = match transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(connection.validate_certs, connection.request_timeout_secs)?),
        };
        Ok(Self::new(&connection.cluster, credentials, transport))
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn username(&self) -> &str {
        &self.tokens.credentials().username
    }

    pub fn base_url(&self) -> String {
        format!("https://{}{}", self.cluster, API_ROOT)
    }

    /// Absolute URL for a path under the API root, or a full URL as given.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url(), path)
        }
    }

    /// True when the cached token is still accepted by the cluster.
    pub fn validate_token(&self) -> Result<bool> {
        let token = self.tokens.token(self.transport.as_ref(), &self.base_url())?;
        let response = self.transport.send(&self.authorized(Method::Get, "/public/nodes", None, &token))?;
        Ok(response.is_success())
    }

    /// Send a request with the bearer token attached, without judging the status.
    pub fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let base_url = self.base_url();
        let token = self.tokens.token(self.transport.as_ref(), &base_url)?;
        let response = self.transport.send(&self.authorized(method, path, body, &token))?;
        if !token_expired(&response) {
            return Ok(response);
        }

        self.tokens.invalidate();
        let token = self.tokens.refresh(self.transport.as_ref(), &base_url)?;
        let response = self.transport.send(&self.authorized(method, path, body, &token))?;
        if response.status == 401 {
            return Err(CohesityError::Auth(response.server_message()));
        }
        Ok(response)
    }

    /// Like `execute`, but any non-2xx reply becomes an error.
    pub fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let response = self.execute(method, path, body)?;
        if !response.is_success() {
            return Err(CohesityError::Http { status: response.status, message: response.server_message() });
        }
        Ok(response)
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::Get, path, None)?.json()
    }

    pub fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.request(Method::Post, path, Some(body))?.json()
    }

    pub fn put<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.request(Method::Put, path, Some(body))?.json()
    }

    pub fn delete(&self, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        self.request(Method::Delete, path, body)
    }

    fn authorized(&self, method: Method, path: &str, body: Option<&Value>, token: &str) -> ApiRequest {
        let mut request = ApiRequest::new(method, self.url(path))
            .header("Authorization", &format!("Bearer {}", token));
        if let Some(body) = body {
            request = request.json(body.clone());
        }
        request
    }
}

fn token_expired(response: &ApiResponse) -> bool {
    if response.is_success() {
        return false;
    }
    response.status == 401 || response.text().contains("Token expired")
}

/// Append url-encoded query parameters to a path.
pub fn with_query(path: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query: Vec<String> = params.iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    format!("{}?{}", path, query.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query_encodes_values() {
        let path = with_query("/public/protectionJobs", &[
            ("names", String::from("Nightly VMs")),
            ("environments", String::from("kVMware")),
        ]);
        assert_eq!(path, "/public/protectionJobs?names=Nightly%20VMs&environments=kVMware");
    }

    #[test]
    fn test_with_query_without_params() {
        assert_eq!(with_query("/public/nodes", &[]), "/public/nodes");
    }

    #[test]
    fn test_token_expired_detection() {
        assert!(token_expired(&ApiResponse::new(401, "")));
        assert!(token_expired(&ApiResponse::new(500, r#"{"message":"Token expired"}"#)));
        assert!(!token_expired(&ApiResponse::new(200, r#"{"message":"Token expired"}"#)));
        assert!(!token_expired(&ApiResponse::new(404, "")));
    }
}
