//! Scanner collaborator
//!
//! The radio driver lives outside this crate. It pushes sightings and
//! adapter state changes into a `NodeHandle`; the node answers with
//! start/stop commands through this trait.

use std::sync::Arc;

use parking_lot::Mutex;

use proxima_core::ProximaResult;

/// Radio adapter state as reported by the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl AdapterState {
    #[inline]
    pub fn is_powered_on(self) -> bool {
        self == AdapterState::PoweredOn
    }
}

/// Commands the node issues to the radio driver
pub trait Scanner: Send {
    fn start_scanning(&mut self) -> ProximaResult<()>;

    fn stop_scanning(&mut self) -> ProximaResult<()>;
}

/// Scanner that ignores every command
#[derive(Clone, Copy, Debug, Default)]
pub struct NullScanner;

impl Scanner for NullScanner {
    fn start_scanning(&mut self) -> ProximaResult<()> {
        Ok(())
    }

    fn stop_scanning(&mut self) -> ProximaResult<()> {
        Ok(())
    }
}

/// Command seen by a `RecordingScanner`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanCommand {
    Start,
    Stop,
}

/// Scanner that records every command; clones share the log
#[derive(Clone, Debug, Default)]
pub struct RecordingScanner {
    commands: Arc<Mutex<Vec<ScanCommand>>>,
}

impl RecordingScanner {
    pub fn new() -> Self {
        RecordingScanner::default()
    }

    pub fn commands(&self) -> Vec<ScanCommand> {
        self.commands.lock().clone()
    }
}

impl Scanner for RecordingScanner {
    fn start_scanning(&mut self) -> ProximaResult<()> {
        self.commands.lock().push(ScanCommand::Start);
        Ok(())
    }

    fn stop_scanning(&mut self) -> ProximaResult<()> {
        self.commands.lock().push(ScanCommand::Stop);
        Ok(())
    }
}
