//! Window, event loop and per-frame driving of the pipeline.

mod runner;

pub use runner::run;
