//! Monthly/quarterly series and the features extracted from them.
//!
//! - `series`: period-keyed storage for indicators and the target
//! - `transform`: optional pre-processing (growth rates, demeaning, ...)
//! - `extract`: vintage-bounded, fixed-arity lag vectors

pub mod extract;
pub mod series;
pub mod transform;

pub use extract::*;
pub use series::*;
pub use transform::*;
