pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{BuildArgs, CliArgs, Commands, HealthArgs, OutputFormatArg};
pub use handlers::{exit_code_for, handle_build, handle_health};
pub use output::{HealthStatus, OutputFormat, OutputFormatter};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_GENERATION_EXHAUSTED: i32 = 2;
pub const EXIT_BUILD_EXHAUSTED: i32 = 3;
pub const EXIT_VALIDATION_EXHAUSTED: i32 = 4;
pub const EXIT_CANCELLED: i32 = 130;
