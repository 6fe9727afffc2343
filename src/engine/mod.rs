pub mod collection;
pub mod persistence;
pub mod registry;

pub use collection::EmbeddedCollection;
pub use persistence::Persistence;
pub use registry::{EmbeddedDatabase, Registry};
