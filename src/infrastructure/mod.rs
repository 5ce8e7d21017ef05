pub mod accessory;
pub mod logging;
