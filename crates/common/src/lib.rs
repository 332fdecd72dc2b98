pub mod recognition;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
