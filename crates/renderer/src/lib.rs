pub mod backends;
pub mod instrument;
pub mod layer;
pub mod mode;
pub mod selector;

pub use backends::*;
pub use instrument::*;
pub use layer::*;
pub use mode::*;
pub use selector::*;
