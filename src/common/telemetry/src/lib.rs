mod logging;

pub use logging::{LOG_LEVEL_ENV, init_logging, init_test_logging};
