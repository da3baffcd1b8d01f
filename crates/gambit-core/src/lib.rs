// ABOUTME: Core library for gambit - engine discovery, process supervision, broadcast
// ABOUTME: Shared by the gambit server binary and its tests

pub mod broadcast;
pub mod discovery;
pub mod error;
pub mod process;
pub mod reader;
pub mod supervisor;

pub use broadcast::{Broadcaster, ChannelSink, ClientSink, SinkId, DEFAULT_CLIENT_QUEUE};
pub use discovery::{DirectoryDiscovery, Discover, EngineMap};
pub use error::{LoadError, SinkError, SpawnError, WriteError};
pub use process::{EngineInput, EngineProcess, OutputLines};
pub use reader::{is_qualifying, ReaderTask, QUALIFYING_PREFIXES};
pub use supervisor::{EngineListing, EngineSupervisor, SupervisorConfig, HANDSHAKE};
