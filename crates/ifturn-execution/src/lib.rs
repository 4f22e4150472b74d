//! Turn execution: the executor, per-session locking, the interpreter
//! subprocess runner and tracing setup.

pub mod executor;
pub mod locks;
pub mod process;
pub mod tracing_layer;

pub use executor::{GameStatus, TurnExecutor};
pub use locks::SessionLocks;
pub use process::{DEFAULT_TURN_TIMEOUT, InterpreterRunner, ProcessOutput, ProcessRunner};
pub use tracing_layer::{TurnEvent, TurnEventLayer, init_tracing};
