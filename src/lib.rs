// PaperBanana - academic figure generation pipeline
// Library exports

pub mod backend;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod validate;
