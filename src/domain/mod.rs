pub mod registry;
pub mod resource;
pub mod state;

pub use registry::*;
pub use resource::*;
pub use state::*;
