pub mod core;

pub use self::core::{BoxError, ContainerError};
