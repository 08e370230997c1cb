//! Remote storage backends.
//!
//! Each backend depends on a native client library and is gated behind a
//! cargo feature so that local-only consumers avoid the dependency.

#[cfg(feature = "sftp")]
pub mod ssh;
