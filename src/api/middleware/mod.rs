pub mod error_tracking;
pub mod secret;

pub use error_tracking::{TrackedError, track_errors};
pub use secret::require_health_token;
