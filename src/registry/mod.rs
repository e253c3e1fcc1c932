//! Device registry
//!
//! The registry owns every known device and is the single entry point for
//! both sides of the hub: ingestion calls `update`, streaming clients call
//! `subscribe`/`unsubscribe`.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<DeviceRegistry>
//!                  ┌────────────────────────────┐
//!                  │ devices: HashMap<Id,       │
//!                  │   Device {                 │
//!                  │     metrics: {name: Agg},  │
//!                  │     state: Mutex<meta,ts>, │
//!                  │     hub: Hub<Bytes>,       │
//!                  │   }                        │
//!                  │ >                          │
//!                  └─────────────┬──────────────┘
//!                                │
//!        ┌───────────────────────┼──────────────────────┐
//!        │                       │                      │
//!        ▼                       ▼                      ▼
//!   [Ingestion]            [Subscriber]            [Subscriber]
//!   update(id, u)          sub.recv()              sub.recv()
//!        │                       ▲                      ▲
//!        └──► apply ──► snapshot JSON ──► hub.publish ──┘
//! ```
//!
//! Every snapshot is serialized once into `bytes::Bytes`; subscribers share
//! the same allocation.

pub mod config;
pub mod entry;
pub mod error;
pub mod payload;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{Device, DeviceStats};
pub use error::RegistryError;
pub use payload::{DeviceSnapshot, Updates};
pub use store::DeviceRegistry;
