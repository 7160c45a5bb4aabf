mod host;
mod runner;

pub use host::ModuleHost;
pub use runner::{run, BootOptions, ShutdownOptions};
