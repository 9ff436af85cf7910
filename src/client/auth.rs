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

//! Bearer token exchange and caching.

use crate::client::transport::{ApiRequest, Method, Transport};
use crate::config::DEFAULT_DOMAIN;
use crate::error::{CohesityError, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::RwLock;

#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str, domain: Option<&str>) -> Result<Self> {
        if username.is_empty() {
            return Err(CohesityError::Parameter(String::from("username must not be empty")));
        }
        if password.is_empty() {
            return Err(CohesityError::Parameter(String::from("password must not be empty")));
        }
        let (username, domain) = split_username(username, domain);
        Ok(Self { username, password: password.to_string(), domain })
    }
}

/// Split `DOMAIN\user` or `user@domain` into (user, domain).
/// A domain embedded in the username wins over the explicit one.
pub fn split_username(username: &str, domain: Option<&str>) -> (String, String) {
    if let Some((domain, user)) = username.split_once('\\') {
        return (user.to_string(), domain.to_string());
    }
    if let Some((user, domain)) = username.rsplit_once('@') {
        return (user.to_string(), domain.to_string());
    }
    let domain = domain.filter(|d| !d.is_empty()).unwrap_or(DEFAULT_DOMAIN);
    (username.to_string(), domain.to_string())
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AccessTokenReply {
    access_token: Option<String>,
}

pub struct TokenProvider {
    credentials: Credentials,
    token: RwLock<Option<String>>,
}

impl TokenProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials, token: RwLock::new(None) }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Cached token, exchanging credentials on first use.
    pub fn token(&self, transport: &dyn Transport, base_url: &str) -> Result<String> {
        let cached = self.token.read()
            .map_err(|_| CohesityError::Other(String::from("token cache lock poisoned")))?
            .clone();
        match cached {
            Some(token) => Ok(token),
            None => self.refresh(transport, base_url),
        }
    }

    /// Exchange credentials for a fresh token and cache it.
    pub fn refresh(&self, transport: &dyn Transport, base_url: &str) -> Result<String> {
        let token = self.exchange(transport, base_url)?;
        let mut slot = self.token.write()
            .map_err(|_| CohesityError::Other(String::from("token cache lock poisoned")))?;
        *slot = Some(token.clone());
        Ok(token)
    }

    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.token.write() {
            *slot = None;
        }
    }

    fn exchange(&self, transport: &dyn Transport, base_url: &str) -> Result<String> {
        let request = ApiRequest::new(Method::Post, format!("{}/public/accessTokens", base_url))
            .json(json!({
                "username": self.credentials.username,
                "password": self.credentials.password,
                "domain": self.credentials.domain,
            }));
        let response = transport.send(&request)?;
        if !response.is_success() {
            return Err(CohesityError::Auth(response.server_message()));
        }
        let reply: AccessTokenReply = response.json()
            .map_err(|e| CohesityError::Auth(format!("Unreadable access token reply: {}", e)))?;
        reply.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CohesityError::Auth(String::from("The cluster did not return an access token")))
    }
}
