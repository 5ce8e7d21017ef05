//! Accessory-protocol client core for wireless earbuds: packet catalog,
//! notification decoding, device state, head orientation and head gestures.

pub mod domain;
pub mod infrastructure;

pub use domain::settings::{Settings, SettingsService};
pub use infrastructure::accessory::AccessoryService;
