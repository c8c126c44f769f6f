//! Peerlink Types
//!
//! Shared wire vocabulary for the peer session coordinator: signaling
//! messages and their payloads, controller and transmission states, and the
//! envelope used to ship a message between two endpoints.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


pub mod envelope;
pub mod error;
pub mod messages;
pub mod states;

pub use envelope::*;
pub use error::*;
pub use messages::*;
pub use states::*;
