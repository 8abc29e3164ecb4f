//! Model staging, compilation and handle lifecycle.

pub mod lifecycle;
pub mod path;
pub mod resolver;

pub use lifecycle::{release, ModelHandle};
pub use path::{PathError, RelativePath};
pub use resolver::{CompileError, DependencyFailure, DependencyResolver, LoadReport};
