//! Session record and session log
//!
//! `SessionRecord` is the bounded history of (utterance, plan, outcomes)
//! for one run of the assistant. Only the dispatcher writes to it. Each
//! outcome is also appended to the NDJSON session log as it happens, and
//! the whole record is dumped as JSON on graceful shutdown.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::action_plan::{ActionPlan, ActionStep, TaskType};
use crate::dispatcher::PlanState;
use crate::outcome::Outcome;

/// One utterance and everything that came of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub id: u64,
    pub utterance: String,
    pub received_at: DateTime<Utc>,
    pub plan: ActionPlan,
    pub outcomes: Vec<Outcome>,
    pub state: PlanState,
}

impl SessionEntry {
    pub fn all_ok(&self) -> bool {
        self.state == PlanState::Completed && self.outcomes.iter().all(|o| o.ok)
    }
}

/// One line of the session log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub session_id: Uuid,
    pub entry_id: u64,
    pub step: usize,
    pub task_type: TaskType,
    pub action: String,
    pub description: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Append-only NDJSON log, `session-<timestamp>.log`
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    file: File,
}

impl SessionLog {
    /// Create `dir` if needed and open a fresh log named after `started`
    pub fn create(dir: &Path, started: DateTime<Local>) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("session-{}.log", started.format("%Y%m%d_%H%M%S")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Session log: {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `session-<timestamp>.json` next to the log
    pub fn summary_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }

    pub fn append(&mut self, line: &LogLine) -> io::Result<()> {
        let json = serde_json::to_string(line).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writeln!(self.file, "{}", json)?;
        self.file.flush()
    }
}

/// Persisted shape of the record
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub plans_run: u64,
    pub entries: Vec<SessionEntry>,
}

/// Bounded ring buffer of session entries
#[derive(Debug)]
pub struct SessionRecord {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    capacity: usize,
    entries: VecDeque<SessionEntry>,
    next_id: u64,
    log: Option<SessionLog>,
}

impl SessionRecord {
    pub fn new(capacity: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            next_id: 1,
            log: None,
        }
    }

    pub fn with_log(mut self, log: SessionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(|l| l.path())
    }

    /// Start an entry for a plan; evicts the oldest entry when full
    pub fn begin(&mut self, utterance: &str, plan: &ActionPlan) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(SessionEntry {
            id,
            utterance: utterance.to_string(),
            received_at: Utc::now(),
            plan: plan.clone(),
            outcomes: Vec::new(),
            state: PlanState::Pending,
        });
        id
    }

    pub fn set_state(&mut self, id: u64, state: PlanState) {
        if let Some(entry) = self.entry_mut(id) {
            entry.state = state;
        }
    }

    /// Attach an outcome and append it to the log. Log failures are warnings.
    pub fn record_outcome(&mut self, id: u64, step_index: usize, step: &ActionStep, outcome: &Outcome) {
        if let Some(entry) = self.entry_mut(id) {
            entry.outcomes.push(outcome.clone());
        }

        let session_id = self.session_id;
        if let Some(log) = self.log.as_mut() {
            let line = LogLine {
                session_id,
                entry_id: id,
                step: step_index,
                task_type: step.task_type,
                action: step.action.clone(),
                description: step.description.clone(),
                outcome: outcome.clone(),
            };
            if let Err(e) = log.append(&line) {
                warn!("Could not write session log {}: {}", log.path().display(), e);
            }
        }
    }

    fn entry_mut(&mut self, id: u64) -> Option<&mut SessionEntry> {
        self.entries.iter_mut().rev().find(|e| e.id == id)
    }

    pub fn get(&self, id: u64) -> Option<&SessionEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Oldest first
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &SessionEntry> {
        self.entries.iter()
    }

    /// The most recent `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<&SessionEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plans started this session, including evicted ones
    pub fn plans_run(&self) -> u64 {
        self.next_id - 1
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            plans_run: self.plans_run(),
            entries: self.entries.iter().cloned().collect(),
        }
    }

    /// Write the JSON summary to `path`
    pub fn persist_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.summary()).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Persist next to the session log; no-op without a log
    pub fn persist(&self) -> io::Result<Option<PathBuf>> {
        match &self.log {
            Some(log) => {
                let path = log.summary_path();
                self.persist_to(&path)?;
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_plan::PlanOrigin;
    use crate::outcome::ErrorKind;

    fn plan() -> ActionPlan {
        ActionPlan::single(
            ActionStep::new(TaskType::DesktopControl, "open_notepad", "Open Notepad"),
            PlanOrigin::Fallback { reason: None },
        )
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut record = SessionRecord::new(2);
        let first = record.begin("one", &plan());
        record.begin("two", &plan());
        record.begin("three", &plan());

        assert_eq!(record.len(), 2);
        assert!(record.get(first).is_none());
        assert_eq!(record.plans_run(), 3);
        let utterances: Vec<_> = record.entries().map(|e| e.utterance.as_str()).collect();
        assert_eq!(utterances, vec!["two", "three"]);
    }

    #[test]
    fn test_outcomes_attach_to_entry() {
        let mut record = SessionRecord::new(5);
        let id = record.begin("open notepad", &plan());
        let step = &plan().steps[0];
        record.record_outcome(id, 0, step, &Outcome::success("Opened Notepad", Utc::now(), 0));
        record.set_state(id, PlanState::Completed);

        let entry = record.get(id).unwrap();
        assert_eq!(entry.outcomes.len(), 1);
        assert!(entry.all_ok());
    }

    #[test]
    fn test_log_lines_are_ndjson() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::create(&dir.path().join("logs"), Local::now()).unwrap();
        let log_path = log.path().to_path_buf();
        assert!(log_path.file_name().unwrap().to_str().unwrap().starts_with("session-"));

        let mut record = SessionRecord::new(5).with_log(log);
        let id = record.begin("x", &plan());
        let step = &plan().steps[0];
        record.record_outcome(id, 0, step, &Outcome::success("ok", Utc::now(), 0));
        record.record_outcome(id, 1, step, &Outcome::failure(ErrorKind::Timeout, "slow", Utc::now(), 1));

        let text = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["ok"], true);
        assert_eq!(lines[0]["action"], "open_notepad");
        assert_eq!(lines[1]["error_kind"], "timeout");
        assert_eq!(lines[1]["retries_used"], 1);
    }

    #[test]
    fn test_persist_summary() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::create(dir.path(), Local::now()).unwrap();
        let mut record = SessionRecord::new(5).with_log(log);
        record.begin("take a screenshot", &plan());

        let path = record.persist().unwrap().unwrap();
        assert_eq!(path.extension().unwrap(), "json");
        let summary: SessionSummary = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(summary.entries.len(), 1);
        assert_eq!(summary.entries[0].utterance, "take a screenshot");
    }

    #[test]
    fn test_persist_without_log() {
        assert!(SessionRecord::new(1).persist().unwrap().is_none());
    }
}
