pub mod aggregate;
pub mod cache;
pub mod ingest;
pub mod listing;
pub mod loaders;
pub mod refresh;
pub mod remote;
pub mod service;
pub mod timestamp;

pub use aggregate::*;
pub use cache::*;
pub use ingest::*;
pub use listing::*;
pub use loaders::*;
pub use refresh::*;
pub use remote::*;
pub use service::*;
pub use timestamp::*;
