//! Topic routing for the ingestion side
//!
//! Inbound messages arrive as a topic and a JSON body. The router picks the
//! first configured pattern matching the topic, captures the device
//! identifier from it, and pulls the mapped fields out of the body.
//!
//! ```text
//!   "sensors/dev1/state"        {"env":{"temperature":21.5}}
//!            │                               │
//!            ▼                               ▼
//!   sensors/{DEVICE}/state ──► dev1    env.temperature ──► temp = 21.5
//!            │                               │
//!            └──────────► Updates ◄──────────┘
//!                            │
//!                            ▼
//!                 DeviceRegistry::update("dev1", ..)
//! ```

pub mod extract;
pub mod pattern;
pub mod routes;

pub use pattern::{TopicPattern, DEVICE_PLACEHOLDER};
pub use routes::{RoutedUpdate, TopicRouter};
