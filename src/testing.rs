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

//! Test doubles for the three seams a module run goes through: the HTTP
//! transport, the poll sleeper and the local command runner.

use crate::client::{ApiRequest, ApiResponse, ClusterSession, Credentials, Method, Transport};
use crate::connection::{CommandResult, CommandRunner};
use crate::error::Result;
use crate::reconcile::{ModuleContext, Sleeper};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_CLUSTER: &str = "cohesity.example.com";
pub const TEST_TOKEN: &str = "test-token";

struct Route {
    method: Method,
    fragment: String,
    responses: VecDeque<ApiResponse>,
}

/// Replays canned responses by method and URL fragment.
///
/// The longest matching fragment wins. Each route hands out its responses
/// in order and keeps repeating the last one. Token exchange is answered
/// automatically unless a route for `/public/accessTokens` is registered.
/// Unrouted requests get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: Method, fragment: &str, status: u16, body: Value) -> Self {
        let body = match body {
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        };
        self.respond(method, fragment, ApiResponse::new(status, body))
    }

    pub fn respond(self, method: Method, fragment: &str, response: ApiResponse) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            match routes.iter_mut().find(|r| r.method == method && r.fragment == fragment) {
                Some(route) => route.responses.push_back(response),
                None => routes.push(Route {
                    method,
                    fragment: fragment.to_string(),
                    responses: VecDeque::from(vec![response]),
                }),
            }
        }
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Requests sent with `method` whose URL contains `fragment`.
    pub fn sent(&self, method: Method, fragment: &str) -> Vec<ApiRequest> {
        self.requests().into_iter()
            .filter(|r| r.method == method && r.url.contains(fragment))
            .collect()
    }

    pub fn count(&self, method: Method, fragment: &str) -> usize {
        self.sent(method, fragment).len()
    }

    /// Every request except token exchanges.
    pub fn api_requests(&self) -> Vec<ApiRequest> {
        self.requests().into_iter()
            .filter(|r| !r.url.ends_with("/public/accessTokens"))
            .collect()
    }

    fn lookup(&self, request: &ApiRequest) -> Option<ApiResponse> {
        let mut routes = self.routes.lock().ok()?;
        let route = routes.iter_mut()
            .filter(|r| r.method == request.method && request.url.contains(&r.fragment))
            .max_by_key(|r| r.fragment.len())?;
        if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(response) = self.lookup(request) {
            return Ok(response);
        }
        if request.method == Method::Post && request.url.ends_with("/public/accessTokens") {
            return Ok(token_reply(TEST_TOKEN));
        }
        Ok(ApiResponse::new(404, json!({"message": format!("no route for {} {}", request.method, request.url)}).to_string()))
    }
}

pub fn token_reply(token: &str) -> ApiResponse {
    ApiResponse::new(201, json!({"accessToken": token, "tokenType": "Bearer"}).to_string())
}

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    naps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn naps(&self) -> Vec<Duration> {
        self.naps.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.naps().len()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut naps) = self.naps.lock() {
            naps.push(duration);
        }
    }
}

/// Scripted shell. The first rule whose fragment appears in the command
/// answers it; unmatched commands succeed with no output.
#[derive(Default)]
pub struct MockCommandRunner {
    rules: Mutex<Vec<(String, VecDeque<(i32, String)>)>>,
    commands: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, fragment: &str, rc: i32, out: &str) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            match rules.iter_mut().find(|(f, _)| f == fragment) {
                Some((_, replies)) => replies.push_back((rc, out.to_string())),
                None => rules.push((fragment.to_string(), VecDeque::from(vec![(rc, out.to_string())]))),
            }
        }
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock()
            .map(|c| c.iter().map(|(cmd, _)| cmd.clone()).collect())
            .unwrap_or_default()
    }

    /// Environment passed along with the first command containing `fragment`.
    pub fn env_for(&self, fragment: &str) -> Option<Vec<(String, String)>> {
        self.commands.lock().ok()?
            .iter()
            .find(|(cmd, _)| cmd.contains(fragment))
            .map(|(_, env)| env.clone())
    }

    fn reply(&self, cmd: &str) -> (i32, String) {
        let mut rules = match self.rules.lock() {
            Ok(rules) => rules,
            Err(_) => return (0, String::new()),
        };
        match rules.iter_mut().find(|(f, _)| cmd.contains(f.as_str())) {
            Some((_, replies)) if replies.len() > 1 => replies.pop_front().unwrap_or_default(),
            Some((_, replies)) => replies.front().cloned().unwrap_or_default(),
            None => (0, String::new()),
        }
    }
}

impl CommandRunner for MockCommandRunner {
    fn run(&self, cmd: &str) -> Result<CommandResult> {
        self.run_with_env(cmd, &[])
    }

    fn run_with_env(&self, cmd: &str, env: &[(&str, &str)]) -> Result<CommandResult> {
        if let Ok(mut commands) = self.commands.lock() {
            let env = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            commands.push((cmd.to_string(), env));
        }
        let (rc, out) = self.reply(cmd);
        Ok(CommandResult { cmd: cmd.to_string(), out, rc })
    }
}

pub fn test_session(transport: Arc<dyn Transport>) -> ClusterSession {
    let credentials = Credentials {
        username: String::from("admin"),
        password: String::from("admin"),
        domain: String::from("LOCAL"),
    };
    ClusterSession::new(TEST_CLUSTER, credentials, transport)
}

/// A module context against the test cluster with the given doubles.
pub fn context_with(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>) -> ModuleContext {
    ModuleContext::new(Arc::new(test_session(transport)))
        .with_sleeper(sleeper)
        .with_commands(Arc::new(MockCommandRunner::new()))
}
