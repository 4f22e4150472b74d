//! Domain layer of the single-turn interactive fiction bridge.
//!
//! Everything here is pure: types, the RemGlk codec, key encoding and
//! story-format classification. Filesystem and process work lives in
//! `ifturn-infrastructure` and `ifturn-execution`.

pub mod error;
pub mod interpreter;
pub mod keys;
pub mod protocol;
pub mod session;

pub use error::{Result, TurnError, TurnWarning};
pub use keys::{KeyToken, NamedKey, encode_key};
