// ABOUTME: Engine supervisor owning the single active engine process and its reader.
// ABOUTME: Implements discovery refresh, the serialized swap protocol, and command forwarding.

use crate::broadcast::Broadcaster;
use crate::discovery::{Discover, EngineMap};
use crate::error::{LoadError, SpawnError};
use crate::process::{EngineInput, EngineProcess};
use crate::reader::ReaderTask;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Commands sent to every freshly spawned engine, in order.
pub const HANDSHAKE: [&str; 2] = ["uci", "isready"];

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long a terminated engine gets to exit before it is killed.
    pub terminate_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            terminate_grace: Duration::from_secs(3),
        }
    }
}

/// Result of `list_engines`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineListing {
    pub engines: Vec<String>,
    pub active: Option<String>,
}

/// One running engine together with the reader attached to its stdout.
struct Generation {
    name: String,
    process: EngineProcess,
    reader: ReaderTask,
}

impl Generation {
    /// Stop relaying first so nothing from this generation is broadcast once a
    /// swap has begun, then take the process down.
    async fn stop(self, grace: Duration) {
        let Generation {
            name,
            mut process,
            reader,
        } = self;
        reader.stop().await;
        process.terminate(grace).await;
        info!(engine = %name, "Engine stopped");
    }
}

enum EngineState {
    Empty,
    Running(Generation),
}

/// Owns all supervisor state: discovery results, the active engine slot, and
/// the broadcaster its readers publish into.
///
/// `state` is held for a whole swap. Stdin writes happen outside it and the
/// active name is mirrored in `active`, so a hung engine cannot stall swaps
/// or status queries.
pub struct EngineSupervisor {
    discovery: Arc<dyn Discover>,
    engines: RwLock<EngineMap>,
    state: Mutex<EngineState>,
    active: RwLock<Option<String>>,
    broadcaster: Arc<Broadcaster>,
    config: SupervisorConfig,
}

impl EngineSupervisor {
    /// Build a supervisor in the empty state without scanning.
    pub fn new(
        discovery: Arc<dyn Discover>,
        broadcaster: Arc<Broadcaster>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            discovery,
            engines: RwLock::new(EngineMap::new()),
            state: Mutex::new(EngineState::Empty),
            active: RwLock::new(None),
            broadcaster,
            config,
        }
    }

    /// Scan once and autoload the first engine found.
    ///
    /// A failed autoload is logged; the supervisor still starts, empty.
    pub async fn start(
        discovery: Arc<dyn Discover>,
        broadcaster: Arc<Broadcaster>,
        config: SupervisorConfig,
    ) -> Arc<Self> {
        let supervisor = Arc::new(Self::new(discovery, broadcaster, config));

        let engines = supervisor.rescan();
        match engines.keys().next() {
            Some(first) => {
                if let Err(e) = supervisor.load_engine(first).await {
                    error!(engine = %first, error = %e, "Failed to load default engine");
                }
            }
            None => {
                warn!("No engines found; commands are ignored until a client loads one");
            }
        }

        supervisor
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Replace the discovery mapping with a fresh scan and return it.
    pub fn rescan(&self) -> EngineMap {
        let found = self.discovery.scan();
        info!(engines = ?found.keys().collect::<Vec<_>>(), "Found engines");
        *self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner) = found.clone();
        found
    }

    /// Rescan and report the available names plus the active engine.
    pub fn list_engines(&self) -> EngineListing {
        let engines = self.rescan().into_keys().collect();
        EngineListing {
            engines,
            active: self.active_engine(),
        }
    }

    /// Name of the running engine. Never waits on an in-flight swap.
    pub fn active_engine(&self) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_active(&self, name: Option<&str>) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = name.map(str::to_string);
    }

    /// OS pid of the active engine, if one is running.
    pub async fn active_pid(&self) -> Option<u32> {
        match &*self.state.lock().await {
            EngineState::Running(generation) => generation.process.id(),
            EngineState::Empty => None,
        }
    }

    /// Swap the active engine for `name`.
    ///
    /// The state lock is held for the whole swap, so swaps never interleave and
    /// no caller can observe the old and new engine at once.
    pub async fn load_engine(&self, name: &str) -> Result<String, LoadError> {
        let mut state = self.state.lock().await;

        let path = self
            .engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        let Some(path) = path else {
            warn!(engine = %name, "Requested engine is not in the discovered list");
            return Err(LoadError::UnknownEngine(name.to_string()));
        };

        if let EngineState::Running(current) = std::mem::replace(&mut *state, EngineState::Empty) {
            info!(from = %current.name, to = %name, "Swapping engine");
            self.set_active(None);
            current.stop(self.config.terminate_grace).await;
        }

        if !path.is_file() {
            error!(engine = %name, path = %path.display(), "Engine path is not a file");
            return Err(LoadError::PathMissing {
                name: name.to_string(),
                path,
            });
        }

        let mut process = EngineProcess::spawn(&path).inspect_err(|e| {
            error!(engine = %name, error = %e, "Failed to launch engine");
        })?;

        let Some(output) = process.take_output() else {
            process.terminate(self.config.terminate_grace).await;
            return Err(SpawnError::OsFailure {
                path,
                source: std::io::Error::other("engine stdout was not captured"),
            }
            .into());
        };
        let reader = ReaderTask::spawn(name.to_string(), output, Arc::clone(&self.broadcaster));

        let generation = Generation {
            name: name.to_string(),
            process,
            reader,
        };
        // A fresh pipe is empty, so the handshake cannot park on a full buffer.
        for command in HANDSHAKE {
            send(&generation.name, &generation.process.input(), command).await;
        }

        info!(engine = %name, pid = ?generation.process.id(), "Switched engine");
        *state = EngineState::Running(generation);
        self.set_active(Some(name));
        Ok(name.to_string())
    }

    /// Write one client command to the active engine. Failures are logged only.
    ///
    /// The write runs after the slot lock is released; a swap closes the old
    /// engine's input, which aborts a write stuck on a full pipe.
    pub async fn forward_command(&self, text: &str) {
        let (engine, input) = match &*self.state.lock().await {
            EngineState::Running(generation) => {
                (generation.name.clone(), generation.process.input())
            }
            EngineState::Empty => {
                debug!(command = %text, "No active engine; dropping command");
                return;
            }
        };
        send(&engine, &input, text).await;
    }

    /// Stop the reader and terminate the engine. Safe to call more than once.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let EngineState::Running(current) = std::mem::replace(&mut *state, EngineState::Empty) {
            info!(engine = %current.name, "Shutting down engine");
            self.set_active(None);
            current.stop(self.config.terminate_grace).await;
        }
    }
}

async fn send(engine: &str, input: &EngineInput, command: &str) {
    if let Err(e) = input.write_line(command).await {
        warn!(engine = %engine, command = %command, error = %e, "Failed to write to engine");
    }
}
