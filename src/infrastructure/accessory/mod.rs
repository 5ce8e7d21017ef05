//! Accessory Module
//!
//! Wire protocol spoken with the earbuds over the accessory channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    AccessoryService                      │
//! │   (Single reader per device - public API for callers)    │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         │                           │
//!         ▼                           ▼
//! ┌───────────────┐          ┌─────────────────┐
//! │    Packets    │          │  Notifications  │
//! │               │          │                 │
//! │ - Handshake   │          │ - Ear detection │
//! │ - Settings    │          │ - Noise control │
//! │ - Head track  │          │ - Battery       │
//! │ - Hex helpers │          │ - Awareness     │
//! └───────────────┘          └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`packets`] - Outbound command bytes and protocol constants
//! - [`notifications`] - Inbound frame classification and decoding
//! - [`service`] - Session coordinator

pub mod notifications;
pub mod packets;
pub mod service;

pub use service::AccessoryService;
