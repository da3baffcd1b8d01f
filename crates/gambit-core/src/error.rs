// ABOUTME: Error types for the gambit-core crate.
// ABOUTME: Covers spawning, stdin writes, engine loading, and client sinks.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to launch an engine binary.
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The OS rejected the file as an executable for this platform/architecture.
    #[error(
        "'{}' is not a valid executable for this platform; check that the engine build matches your OS and CPU architecture",
        .path.display()
    )]
    NotExecutable { path: PathBuf },

    /// Any other launch failure.
    #[error("failed to launch '{}': {source}", .path.display())]
    OsFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A command line could not be delivered to the engine's stdin.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("engine stdin is closed")]
    Closed,

    #[error("write to engine stdin failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a `load_engine` call did not leave the requested engine running.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Name is not in the current discovery mapping. Nothing was changed.
    #[error("unknown engine '{0}'")]
    UnknownEngine(String),

    /// The binary disappeared between discovery and load.
    #[error("engine binary for '{name}' is missing: {}", .path.display())]
    PathMissing { name: String, path: PathBuf },

    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// A broadcast could not be handed to one client.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    #[error("client disconnected")]
    Closed,

    #[error("client send queue is full")]
    Full,
}
