/// Process-wide logger setup backed by `fern`.
pub mod logsetup;

pub use logsetup::setup_logging;
