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

//! Cluster REST client: transport, bearer token handling, and the JSON
//! documents the probes read.

pub mod auth;
pub mod models;
pub mod session;
pub mod transport;

pub use auth::{split_username, Credentials, TokenProvider};
pub use session::{with_query, ClusterSession};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
