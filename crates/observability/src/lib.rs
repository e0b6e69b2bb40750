//! Process-wide tracing setup shared by binaries and test harnesses.

pub mod subscriber;

pub use subscriber::LogFormat;

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    subscriber::init(LogFormat::from_env(), "info");
}

/// Like [`init`], with a different default filter when `RUST_LOG` is unset.
pub fn init_with_default(directive: &str) {
    subscriber::init(LogFormat::from_env(), directive);
}
