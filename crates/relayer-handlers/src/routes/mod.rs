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

use axum::Json;
use serde::Serialize;

/// Module for handling attestation API
pub mod attestations;
/// Module for handling relayer health API
pub mod health;
/// Module for handling market API
pub mod markets;

/// The success envelope: `{"success": true, ...data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`; failures use the error envelope instead.
    pub success: bool,
    /// The endpoint payload, flattened into the envelope.
    #[serde(flatten)]
    pub data: T,
}

/// Wraps a payload in the success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}
