pub mod api;
pub mod error;
pub mod parser;
pub mod selector;

pub use api::*;
pub use error::{SieveError, SieveResult};
pub use parser::parse_selector;
pub use selector::*;
