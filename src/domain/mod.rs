pub mod device_state;
pub mod feedback;
pub mod gestures;
pub mod head_tracking;
pub mod models;
pub mod settings;
