// Re-export locale modules
pub mod backend;
pub mod backends;
pub mod extractor;
pub mod factory;
pub mod language;
pub mod loader;
pub mod resource;
pub mod session;

pub use backend::*;
pub use extractor::*;
pub use factory::*;
pub use language::*;
pub use loader::*;
pub use resource::*;
pub use session::*;
