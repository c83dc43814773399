pub mod config;
pub mod error;
pub mod time;

pub use config::Config;
pub use error::CoreError;
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
