//! Database-layer authentication mechanisms

mod scram;

pub use scram::{ScramClient, ScramError};
