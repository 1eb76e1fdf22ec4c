pub mod options;
pub mod validation;

pub use options::*;
pub use validation::*;
