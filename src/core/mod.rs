pub mod error;
pub mod http;
pub mod manifest;
pub mod telemetry;
pub mod workdir;

pub use error::*;
pub use http::*;
pub use manifest::*;
pub use telemetry::*;
pub use workdir::*;
