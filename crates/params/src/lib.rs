pub mod config;
pub mod control;
pub mod domain;
pub mod registry;
pub mod spec;
pub mod value;

// Typed parameters kept in sync with a link store and a GUI panel.
pub use config::*;
pub use control::*;
pub use domain::*;
pub use registry::*;
pub use spec::*;
pub use value::*;
