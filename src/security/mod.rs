//! Guards applied before any byte is read or requested.
//!
//! ```text
//!  storage key ──► paths::guard_path ──► local read
//!  object URL  ──► hosts::TrustedHosts ──► remote fetch
//! ```

pub mod hosts;
pub mod paths;

pub use hosts::TrustedHosts;
pub use paths::guard_path;
