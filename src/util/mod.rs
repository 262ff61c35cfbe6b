//! Utility modules for healbox

pub mod logging;
pub mod text;

pub use logging::{init_from_env, init_logging, LoggingConfig};
pub use text::{head_chars, tail_chars, TailBuffer};
