pub mod errors;
pub mod sensor;
pub mod table;

pub use errors::*;
pub use sensor::*;
pub use table::*;
