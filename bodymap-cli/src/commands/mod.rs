//! CLI command implementations.

pub mod check;
pub mod request;
pub mod script;

pub use check::check_syncs;
pub use request::serve_request;
pub use script::run_script;
