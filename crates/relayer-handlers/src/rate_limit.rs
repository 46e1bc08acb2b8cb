// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-window per-IP rate limiting.
//!
//! Two tiers share one middleware: reads go through the default tier,
//! every mutating method through the stricter write tier. The window
//! state is in-process only; it protects the relayer itself, not the
//! cluster.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;

use sidebet_relayer_utils::Error;

use crate::error::ApiError;
use crate::SharedState;

/// Entries above this count trigger a sweep of expired windows.
const CLEANUP_WATERMARK: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// A fixed-window counter per client IP.
#[derive(Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    hits: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl RateLimiter {
    /// A limiter allowing `max_requests` per `window` per client.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one request from `ip` and reports whether it is within the
    /// limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock();
        if hits.len() > CLEANUP_WATERMARK {
            let window = self.window;
            hits.retain(|_, w| now.duration_since(w.started) < window);
        }
        let entry = hits.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count <= self.max_requests
    }
}

/// The middleware applied to the `/api` surface. `GET` requests consume
/// the default tier, everything else the write tier.
pub async fn rate_limit(
    State(state): State<SharedState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Response {
    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let limiter = if request.method() == Method::GET {
        &state.read_limiter
    } else {
        &state.write_limiter
    };
    if !limiter.check(ip) {
        tracing::debug!(%ip, method = %request.method(), "rate limited");
        return ApiError::from(Error::RateLimitExceeded).into_response();
    }
    next.run(request).await
}
