//! Host-side protocol engine and session layer for Jensen USB voice
//! recorders (H1 / H1E / P1).
//!
//! `protocol` implements wire framing, `transport` claims the USB
//! interface, `session` exposes typed device commands serialized through a
//! single mutex, and `ops` queues long-running file operations on top of a
//! session.

pub mod config;
pub mod duration;
pub mod error;
pub mod model;
pub mod ops;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{JensenError, JensenResult};
pub use model::{DeviceInfo, DeviceProfile, FileEntry, Model};
pub use session::Session;
