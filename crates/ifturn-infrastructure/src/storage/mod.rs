//! Low-level file primitives shared by the stores.

pub mod atomic_json;
pub mod file_lock;

pub use atomic_json::{AtomicJsonError, AtomicJsonFile, temp_path, write_atomic};
pub use file_lock::FileLock;
