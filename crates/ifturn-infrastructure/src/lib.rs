//! Filesystem side of the bridge: paths, configuration, routing and state.

pub mod config_service;
pub mod paths;
pub mod router;
pub mod state_store;
pub mod storage;

pub use config_service::{BridgeConfig, InterpreterLocator};
pub use paths::{IfPaths, sanitize_game_id};
pub use router::FileInterpreterRouter;
pub use state_store::FileStateStore;
