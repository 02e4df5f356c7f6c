//! Byte sources for original uploads and derived artifacts.
//!
//! * [`local`]: sandboxed filesystem reads, path-guarded and verified.
//! * [`remote`]: object-storage REST fetch behind host validation.
//! * [`integrity`]: declared size / sha256 checks shared by both.

pub mod integrity;
pub mod local;
pub mod remote;

pub use integrity::Integrity;
pub use local::LocalArtifactReader;
pub use remote::{strip_bucket_prefix, ObjectFetcher, RemoteObjectFetcher};
