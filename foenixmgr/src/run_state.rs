//! Persisted "CPU stopped" indicator
//!
//! Stopping the CPU of an F256 leaves the machine in debug mode across
//! separate invocations of the tool. Later commands need to know this so they
//! neither re-enter debug mode nor reset the machine when they finish.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use log::debug;

use crate::error::Error;

/// Default name of the marker file
pub const STOP_FILE_NAME: &str = "f256.stp";

/// Storage for the stopped flag
pub trait RunState: Send {
    /// Whether the CPU was left stopped by an earlier command
    fn is_stopped(&self) -> bool;

    /// Record whether the CPU is stopped
    fn set_stopped(&mut self, stopped: bool) -> Result<(), Error>;
}

/// Marker file whose presence means the CPU is stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopFile {
    path: PathBuf,
}

impl StopFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for StopFile {
    fn default() -> Self {
        Self::new(STOP_FILE_NAME)
    }
}

impl RunState for StopFile {
    fn is_stopped(&self) -> bool {
        self.path.exists()
    }

    fn set_stopped(&mut self, stopped: bool) -> Result<(), Error> {
        debug!("Setting stop marker {} to {stopped}", self.path.display());

        let result = if stopped {
            fs::write(&self.path, b"")
        } else {
            match fs::remove_file(&self.path) {
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        };

        result.map_err(|err| Error::FileOpenError(self.path.display().to_string(), err))
    }
}

/// Process-local flag, for embedding and tests
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InMemoryRunState {
    stopped: bool,
}

impl InMemoryRunState {
    pub fn stopped() -> Self {
        Self { stopped: true }
    }
}

impl RunState for InMemoryRunState {
    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn set_stopped(&mut self, stopped: bool) -> Result<(), Error> {
        self.stopped = stopped;
        Ok(())
    }
}
