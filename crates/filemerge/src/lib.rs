pub mod app;
pub mod domain;
pub mod infra;
pub mod ui;

/// Install logging at the default verbosity.
pub fn init() {
    infra::logging::init(false);
}

pub fn init_with_verbosity(verbose: bool) {
    infra::logging::init(verbose);
}
