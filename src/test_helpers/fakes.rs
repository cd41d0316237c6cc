//! In-memory stand-ins for the radio and the reporter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::batch::RunCounters;
use crate::error::{ProvisionError, ProvisionResult};
use crate::reporter::Reporter;
use crate::traits::{NetworkControl, ProgressFn};
use crate::wifi::ProfileDescriptor;

#[derive(Default)]
struct NetworkState {
    scans: VecDeque<Vec<String>>,
    associated: Option<String>,
    refuse_association: bool,
    profiles: HashMap<String, ProfileDescriptor>,
    deletes: Vec<String>,
    connects: Vec<String>,
    cancel_when_exhausted: Option<CancellationToken>,
}

/// Scripted radio. Each scan pops the next queued list; once the queue is
/// empty scans return nothing. `connect` associates immediately unless
/// association is refused.
#[derive(Default)]
pub struct FakeNetwork {
    state: Mutex<NetworkState>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scan(&self, names: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .scans
            .push_back(names.iter().map(|n| n.to_string()).collect());
    }

    pub fn refuse_association(&self) {
        self.state.lock().unwrap().refuse_association = true;
    }

    pub fn set_associated(&self, name: Option<&str>) {
        self.state.lock().unwrap().associated = name.map(String::from);
    }

    /// Cancel `token` on the first scan after the queue runs dry.
    pub fn cancel_when_exhausted(&self, token: CancellationToken) {
        self.state.lock().unwrap().cancel_when_exhausted = Some(token);
    }

    pub fn profile(&self, name: &str) -> Option<ProfileDescriptor> {
        self.state.lock().unwrap().profiles.get(name).cloned()
    }

    pub fn profile_count(&self) -> usize {
        self.state.lock().unwrap().profiles.len()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }
}

#[async_trait]
impl NetworkControl for FakeNetwork {
    async fn list_visible_networks(&self) -> ProvisionResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        match state.scans.pop_front() {
            Some(names) => Ok(names),
            None => {
                if let Some(token) = &state.cancel_when_exhausted {
                    token.cancel();
                }
                Ok(Vec::new())
            }
        }
    }

    async fn associated_network(&self) -> ProvisionResult<Option<String>> {
        Ok(self.state.lock().unwrap().associated.clone())
    }

    async fn delete_profile(&self, name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(name.to_string());
        match state.profiles.remove(name) {
            Some(_) => Ok(()),
            None => Err(ProvisionError::NetworkControl(format!(
                "Profile \"{}\" is not found on any interface.",
                name
            ))),
        }
    }

    async fn add_profile(&self, name: &str, descriptor: &ProfileDescriptor) -> ProvisionResult<()> {
        self.state
            .lock()
            .unwrap()
            .profiles
            .insert(name.to_string(), descriptor.clone());
        Ok(())
    }

    async fn connect(&self, name: &str) -> ProvisionResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connects.push(name.to_string());
        if !state.refuse_association {
            state.associated = Some(name.to_string());
        }
        Ok(())
    }
}

/// Reporter that keeps everything it is told.
#[derive(Default)]
pub struct RecordingReporter {
    progress: Mutex<Vec<u8>>,
    lines: Mutex<Vec<String>>,
    counters: Mutex<Vec<RunCounters>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_values(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn has_line(&self, line: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l == line)
    }

    pub fn lines_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.contains(needle))
            .count()
    }

    pub fn last_counters(&self) -> Option<RunCounters> {
        self.counters.lock().unwrap().last().cloned()
    }
}

impl Reporter for RecordingReporter {
    fn progress(&self, percent: u8) {
        self.progress.lock().unwrap().push(percent);
    }

    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn counters(&self, counters: &RunCounters) {
        self.counters.lock().unwrap().push(counters.clone());
    }
}

/// Progress callback that records every value it receives.
pub fn recording_progress() -> (ProgressFn, Arc<Mutex<Vec<u8>>>) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = values.clone();
    let callback: ProgressFn = Arc::new(move |percent| sink.lock().unwrap().push(percent));
    (callback, values)
}
