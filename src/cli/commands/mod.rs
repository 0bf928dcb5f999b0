//! CLI command implementations

pub mod utils;

pub mod completions;
pub mod flows;
pub mod init;
pub mod session;
pub mod status;
pub mod validate;
pub mod wizard;
