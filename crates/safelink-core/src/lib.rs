//! SafeLink core — the evidence-vault engine behind the SafeLink personal
//! safety app.
//!
//! Everything here operates on a local, file-backed [`storage::Storage`] root:
//! the evidence collection, the "Recently Deleted" archive with TTL expiry,
//! age-based retention, whole-vault lock/unlock (encrypt-at-rest), portable
//! encrypted backups, and the heuristic chat-risk scorer. The companion
//! redirect/log service is reached through the thin client in [`links`].

pub mod archive;
pub mod backup;
pub mod crypto;
pub mod error;
pub mod evidence;
pub mod links;
pub mod lock;
pub mod paths;
pub mod retention;
pub mod risk;
pub mod settings;
pub mod storage;

pub use error::CryptoError;
