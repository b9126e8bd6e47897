use super::snapshot::{ProcessInfo, ProcessSnapshot};
use crate::constants::START_TIME_TOLERANCE_SECS;
use crate::filter::{Classification, Classifier};
use crate::models::AppEvent;
use crate::platform::CapabilityProvider;
use crate::writer::WriteRequest;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Owns the open `app_events` row for its pid.
    Logged,
    /// Another instance of an application that is already logged.
    Folded,
    /// Excluded by classification; never produces a write.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedProcess {
    pub pid: u32,
    /// Lowercase application name.
    pub name: String,
    pub started_at: u64,
    pub state: EntryState,
}

impl TrackedProcess {
    fn counts_as_instance(&self) -> bool {
        self.state != EntryState::Ignored
    }
}

/// A live process started after `reference` (plus slack) is not the one
/// the reference was taken from; its pid has been recycled.
fn is_same_process(reference: u64, live: &ProcessInfo) -> bool {
    live.started_at <= reference.saturating_add(START_TIME_TOLERANCE_SECS)
}

fn epoch_to_u64(ts: i64) -> u64 {
    u64::try_from(ts).unwrap_or(0)
}

/// Cross-tick memory of the monitor loop.
///
/// `instance_counts` always equals the number of `Logged` and `Folded`
/// entries per name; a name whose count drops to zero is removed.
#[derive(Debug, Default)]
pub struct Ledger {
    processes: HashMap<u32, TrackedProcess>,
    instance_counts: HashMap<String, usize>,
    /// Pids whose row is still open although the ledger no longer tracks
    /// them (after a reset, or seeded without a process table), mapped to
    /// the start time of the process that owns the row.
    orphans: HashMap<u32, u64>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff one snapshot against the ledger and return the writes it
    /// implies. Every close for an ended process comes before any insert.
    pub fn apply_tick(
        &mut self,
        snapshot: &ProcessSnapshot,
        classifier: &Classifier,
        provider: &dyn CapabilityProvider,
        now: i64,
    ) -> Vec<WriteRequest> {
        let mut writes = Vec::new();
        self.close_ended(snapshot, now, &mut writes);
        self.open_new(snapshot, classifier, provider, now, &mut writes);
        writes
    }

    fn close_ended(&mut self, snapshot: &ProcessSnapshot, now: i64, writes: &mut Vec<WriteRequest>) {
        let gone = |pid: u32, started_at: u64| {
            !snapshot
                .get(pid)
                .is_some_and(|live| is_same_process(started_at, live))
        };

        let mut ended: Vec<u32> = self
            .processes
            .values()
            .filter(|entry| gone(entry.pid, entry.started_at))
            .map(|entry| entry.pid)
            .collect();
        ended.sort_unstable();

        let mut vacated = Vec::new();
        for pid in ended {
            let Some(entry) = self.processes.remove(&pid) else {
                continue;
            };
            if entry.state == EntryState::Logged {
                log::info!("{} (pid {pid}) ended", entry.name);
                writes.push(WriteRequest::close_event(pid, now));
                vacated.push(entry.name.clone());
            }
            if entry.counts_as_instance() {
                self.release_instance(&entry.name);
            }
        }

        let mut stale: Vec<u32> = self
            .orphans
            .iter()
            .filter(|&(&pid, &started_at)| gone(pid, started_at))
            .map(|(&pid, _)| pid)
            .collect();
        stale.sort_unstable();

        for pid in stale {
            self.orphans.remove(&pid);
            log::debug!("Closing untracked session for pid {pid}");
            writes.push(WriteRequest::close_event(pid, now));
        }

        vacated.sort_unstable();
        vacated.dedup();
        for name in vacated {
            self.promote_folded(&name, snapshot, now, writes);
        }
    }

    /// Hand the session of an application whose logged instance ended to
    /// the lowest-pid instance still running, so it keeps an open row.
    fn promote_folded(&mut self, name: &str, snapshot: &ProcessSnapshot, now: i64, writes: &mut Vec<WriteRequest>) {
        if self
            .processes
            .values()
            .any(|entry| entry.state == EntryState::Logged && entry.name == name)
        {
            return;
        }

        let Some(pid) = self
            .processes
            .values()
            .filter(|entry| entry.state == EntryState::Folded && entry.name == name)
            .map(|entry| entry.pid)
            .min()
        else {
            return;
        };
        let Some(process) = snapshot.get(pid) else {
            return;
        };

        if self.orphans.remove(&pid).is_some() {
            writes.push(WriteRequest::close_event(pid, now));
        }
        log::info!("{name} (pid {pid}) takes over the running session");
        writes.push(WriteRequest::insert_event(&new_event(process, now)));
        if let Some(entry) = self.processes.get_mut(&pid) {
            entry.state = EntryState::Logged;
        }
    }

    fn open_new(
        &mut self,
        snapshot: &ProcessSnapshot,
        classifier: &Classifier,
        provider: &dyn CapabilityProvider,
        now: i64,
        writes: &mut Vec<WriteRequest>,
    ) {
        for process in snapshot.iter() {
            if self.processes.contains_key(&process.pid) {
                continue;
            }

            let state = match classifier.classify(process, provider, now) {
                Classification::Defer(reason) => {
                    log::trace!("Deferring pid {} ({reason:?})", process.pid);
                    continue;
                }
                Classification::Exclude(reason) => {
                    log::debug!("Ignoring {} (pid {}): {reason:?}", process.name, process.pid);
                    EntryState::Ignored
                }
                Classification::Track(_) => {
                    let name = process.name.to_lowercase();
                    if self.instance_count(&name) > 0 {
                        log::debug!("{name} (pid {}) folded into running instance", process.pid);
                        EntryState::Folded
                    } else {
                        // A row left open by a reset still belongs to this
                        // pid; close it so the new session does not clash.
                        if self.orphans.remove(&process.pid).is_some() {
                            writes.push(WriteRequest::close_event(process.pid, now));
                        }
                        log::info!("{name} (pid {}) started", process.pid);
                        writes.push(WriteRequest::insert_event(&new_event(process, now)));
                        EntryState::Logged
                    }
                }
            };

            self.track(process, state);
        }
    }

    fn track(&mut self, process: &ProcessInfo, state: EntryState) {
        let entry = TrackedProcess {
            pid: process.pid,
            name: process.name.to_lowercase(),
            started_at: process.started_at,
            state,
        };
        if entry.counts_as_instance() {
            *self.instance_counts.entry(entry.name.clone()).or_insert(0) += 1;
        }
        self.processes.insert(entry.pid, entry);
    }

    fn release_instance(&mut self, name: &str) {
        if let Some(count) = self.instance_counts.get_mut(name) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.instance_counts.remove(name);
            }
        }
    }

    /// Rebuild state from rows left open by a previous run.
    ///
    /// Rows whose process is still alive become logged entries; the rest
    /// are closed at `now`.
    pub fn seed(&mut self, open_rows: &[AppEvent], snapshot: &ProcessSnapshot, now: i64) -> Vec<WriteRequest> {
        let mut writes = Vec::new();

        for row in open_rows {
            if self.processes.contains_key(&row.pid) {
                continue;
            }

            let live = snapshot
                .get(row.pid)
                .filter(|live| is_same_process(epoch_to_u64(row.start_time), live));

            match live {
                Some(live) => {
                    let entry = TrackedProcess {
                        pid: row.pid,
                        name: row.process_name.to_lowercase(),
                        started_at: live.started_at,
                        state: EntryState::Logged,
                    };
                    *self.instance_counts.entry(entry.name.clone()).or_insert(0) += 1;
                    self.processes.insert(entry.pid, entry);
                }
                None => {
                    log::info!("Closing stale session for {} (pid {})", row.process_name, row.pid);
                    writes.push(WriteRequest::close_event(row.pid, now));
                }
            }
        }

        writes
    }

    /// Keep rows open without tracking them, for when the process table
    /// could not be read at start-up. Each is closed once its pid is gone.
    pub fn adopt_orphans(&mut self, open_rows: &[AppEvent]) {
        for row in open_rows {
            self.orphans.insert(row.pid, epoch_to_u64(row.start_time));
        }
    }

    /// Forget every tracked process. Open rows stay open and are closed
    /// when their process ends or is logged again.
    pub fn clear(&mut self) {
        let processes = std::mem::take(&mut self.processes);
        self.instance_counts = HashMap::new();

        for entry in processes.into_values() {
            if entry.state == EntryState::Logged {
                self.orphans.insert(entry.pid, entry.started_at);
            }
        }
    }

    pub fn instance_count(&self, name: &str) -> usize {
        self.instance_counts.get(name).copied().unwrap_or(0)
    }

    pub fn get(&self, pid: u32) -> Option<&TrackedProcess> {
        self.processes.get(&pid)
    }

    pub fn is_tracked(&self, pid: u32) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    #[cfg(test)]
    fn counts_match_entries(&self) -> bool {
        let mut expected: HashMap<&str, usize> = HashMap::new();
        for entry in self.processes.values().filter(|e| e.counts_as_instance()) {
            *expected.entry(entry.name.as_str()).or_insert(0) += 1;
        }
        expected.len() == self.instance_counts.len()
            && expected
                .iter()
                .all(|(name, count)| self.instance_counts.get(*name) == Some(count))
    }
}

fn new_event(process: &ProcessInfo, now: i64) -> AppEvent {
    let exe_path = process
        .exe_path
        .as_ref()
        .map(|path| path.to_string_lossy().into_owned());
    AppEvent::new(
        &process.name,
        process.pid,
        process.parent_name.as_deref(),
        exe_path.as_deref(),
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterRules;
    use crate::test_utils::{proc_info, snapshot_of, FakeProvider, TEST_NOW, TEST_STARTED_AT};

    fn classifier() -> Classifier {
        Classifier::new(FilterRules::windows(), 10)
    }

    fn tick(ledger: &mut Ledger, snapshot: &ProcessSnapshot, now: i64) -> Vec<WriteRequest> {
        let writes = ledger.apply_tick(snapshot, &classifier(), &FakeProvider::default(), now);
        assert!(ledger.counts_match_entries());
        writes
    }

    fn summary(writes: &[WriteRequest]) -> Vec<(&'static str, u32)> {
        writes
            .iter()
            .map(|w| (if w.is_insert() { "insert" } else { "close" }, w.pid().unwrap()))
            .collect()
    }

    #[test]
    fn test_single_application_lifecycle() {
        let mut ledger = Ledger::new();
        let running = snapshot_of(&[(42, "editor.exe")]);

        let writes = tick(&mut ledger, &running, TEST_NOW);
        assert_eq!(summary(&writes), vec![("insert", 42)]);
        assert_eq!(writes[0].params[4], rusqlite::types::Value::Integer(TEST_NOW));

        assert!(tick(&mut ledger, &running, TEST_NOW + 2).is_empty());

        let writes = tick(&mut ledger, &ProcessSnapshot::new(), TEST_NOW + 4);
        assert_eq!(summary(&writes), vec![("close", 42)]);
        assert_eq!(writes[0].params[0], rusqlite::types::Value::Integer(TEST_NOW + 4));
        assert!(ledger.is_empty());
        assert_eq!(ledger.instance_count("editor.exe"), 0);
    }

    #[test]
    fn test_concurrent_instances_fold_into_one_event() {
        let mut ledger = Ledger::new();
        let snapshot = snapshot_of(&[(42, "editor.exe"), (43, "Editor.exe")]);

        let writes = tick(&mut ledger, &snapshot, TEST_NOW);
        assert_eq!(summary(&writes), vec![("insert", 42)]);
        assert_eq!(ledger.instance_count("editor.exe"), 2);
        assert_eq!(ledger.get(43).unwrap().state, EntryState::Folded);

        // Ending the folded instance writes nothing.
        let writes = tick(&mut ledger, &snapshot_of(&[(42, "editor.exe")]), TEST_NOW + 2);
        assert!(writes.is_empty());
        assert_eq!(ledger.instance_count("editor.exe"), 1);
    }

    #[test]
    fn test_folded_instance_takes_over_when_logged_one_ends() {
        let mut ledger = Ledger::new();
        tick(&mut ledger, &snapshot_of(&[(42, "editor.exe"), (43, "editor.exe"), (44, "editor.exe")]), TEST_NOW);

        let writes = tick(&mut ledger, &snapshot_of(&[(43, "editor.exe"), (44, "editor.exe")]), TEST_NOW + 2);
        assert_eq!(summary(&writes), vec![("close", 42), ("insert", 43)]);
        assert_eq!(writes[1].params[4], rusqlite::types::Value::Integer(TEST_NOW + 2));
        assert_eq!(ledger.get(43).unwrap().state, EntryState::Logged);
        assert_eq!(ledger.get(44).unwrap().state, EntryState::Folded);
        assert_eq!(ledger.instance_count("editor.exe"), 2);

        // The promoted instance owns the row now and closes it on exit.
        let writes = tick(&mut ledger, &snapshot_of(&[(44, "editor.exe")]), TEST_NOW + 4);
        assert_eq!(summary(&writes), vec![("close", 43), ("insert", 44)]);

        let writes = tick(&mut ledger, &ProcessSnapshot::new(), TEST_NOW + 6);
        assert_eq!(summary(&writes), vec![("close", 44)]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_promoted_orphan_closes_its_old_row_first() {
        let mut ledger = Ledger::new();
        tick(&mut ledger, &snapshot_of(&[(43, "editor.exe")]), TEST_NOW);
        ledger.clear();

        // After the reset pid 42 is logged first and 43, whose old row is
        // still open, folds into it.
        let both = snapshot_of(&[(42, "editor.exe"), (43, "editor.exe")]);
        let writes = tick(&mut ledger, &both, TEST_NOW + 2);
        assert_eq!(summary(&writes), vec![("insert", 42)]);
        assert_eq!(ledger.get(43).unwrap().state, EntryState::Folded);
        assert_eq!(ledger.orphan_count(), 1);

        let writes = tick(&mut ledger, &snapshot_of(&[(43, "editor.exe")]), TEST_NOW + 4);
        assert_eq!(summary(&writes), vec![("close", 42), ("close", 43), ("insert", 43)]);
        assert_eq!(ledger.orphan_count(), 0);
    }

    #[test]
    fn test_same_tick_replace_closes_before_insert() {
        let mut ledger = Ledger::new();
        tick(&mut ledger, &snapshot_of(&[(42, "editor.exe")]), TEST_NOW);

        let writes = tick(&mut ledger, &snapshot_of(&[(50, "editor.exe")]), TEST_NOW + 2);
        assert_eq!(summary(&writes), vec![("close", 42), ("insert", 50)]);
        assert_eq!(ledger.instance_count("editor.exe"), 1);
        assert_eq!(ledger.get(50).unwrap().state, EntryState::Logged);
    }

    #[test]
    fn test_system_directory_process_never_logged() {
        let mut ledger = Ledger::new();
        let snapshot: ProcessSnapshot = [proc_info(
            7,
            "svchost.exe",
            "C:\\Windows\\System32\\svchost.exe",
            Some("services.exe"),
        )]
        .into_iter()
        .collect();

        for i in 0..3 {
            assert!(tick(&mut ledger, &snapshot, TEST_NOW + i).is_empty());
        }
        assert_eq!(ledger.get(7).unwrap().state, EntryState::Ignored);
        assert_eq!(ledger.instance_count("svchost.exe"), 0);

        // Its disappearance writes nothing either.
        assert!(tick(&mut ledger, &ProcessSnapshot::new(), TEST_NOW + 4).is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_reset_logs_running_applications_again() {
        let mut ledger = Ledger::new();
        let snapshot = snapshot_of(&[(10, "a.exe"), (11, "b.exe"), (12, "c.exe")]);
        assert_eq!(tick(&mut ledger, &snapshot, TEST_NOW).len(), 3);

        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.instance_count("a.exe"), 0);
        assert_eq!(ledger.orphan_count(), 3);

        let writes = tick(&mut ledger, &snapshot, TEST_NOW + 2);
        let inserts: Vec<u32> = writes.iter().filter(|w| w.is_insert()).filter_map(WriteRequest::pid).collect();
        assert_eq!(inserts, vec![10, 11, 12]);
        // Each old row is closed right before its replacement opens.
        assert_eq!(
            summary(&writes),
            vec![("close", 10), ("insert", 10), ("close", 11), ("insert", 11), ("close", 12), ("insert", 12)]
        );
        assert_eq!(ledger.orphan_count(), 0);
    }

    #[test]
    fn test_reset_orphan_closed_when_process_ends() {
        let mut ledger = Ledger::new();
        tick(&mut ledger, &snapshot_of(&[(10, "a.exe")]), TEST_NOW);
        ledger.clear();

        let writes = tick(&mut ledger, &ProcessSnapshot::new(), TEST_NOW + 2);
        assert_eq!(summary(&writes), vec![("close", 10)]);
        assert_eq!(ledger.orphan_count(), 0);
    }

    #[test]
    fn test_failed_metadata_then_exit_never_logs() {
        let mut ledger = Ledger::new();
        let exiting: ProcessSnapshot = [proc_info(42, "editor.exe", "", None)].into_iter().collect();

        assert!(tick(&mut ledger, &exiting, TEST_NOW).is_empty());
        assert!(!ledger.is_tracked(42));

        assert!(tick(&mut ledger, &ProcessSnapshot::new(), TEST_NOW + 2).is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_deferred_process_reevaluated_next_tick() {
        let mut ledger = Ledger::new();
        let mut process = proc_info(42, "editor.exe", "", None);

        let snapshot: ProcessSnapshot = [process.clone()].into_iter().collect();
        assert!(tick(&mut ledger, &snapshot, TEST_NOW).is_empty());

        process.exe_path = Some("C:\\Apps\\editor.exe".into());
        let snapshot: ProcessSnapshot = [process].into_iter().collect();
        assert_eq!(summary(&tick(&mut ledger, &snapshot, TEST_NOW + 2)), vec![("insert", 42)]);
    }

    #[test]
    fn test_reused_pid_is_a_new_process() {
        let mut ledger = Ledger::new();
        tick(&mut ledger, &snapshot_of(&[(42, "editor.exe")]), TEST_NOW);

        let mut reused = proc_info(42, "player.exe", "C:\\Apps\\player.exe", Some("explorer.exe"));
        reused.started_at = TEST_STARTED_AT + 60;
        let snapshot: ProcessSnapshot = [reused].into_iter().collect();

        let writes = tick(&mut ledger, &snapshot, TEST_NOW + 2);
        assert_eq!(summary(&writes), vec![("close", 42), ("insert", 42)]);
        assert_eq!(ledger.get(42).unwrap().name, "player.exe");
        assert_eq!(ledger.instance_count("editor.exe"), 0);
    }

    #[test]
    fn test_start_time_jitter_is_tolerated() {
        let mut ledger = Ledger::new();
        tick(&mut ledger, &snapshot_of(&[(42, "editor.exe")]), TEST_NOW);

        let mut jittered = proc_info(42, "editor.exe", "C:\\Apps\\editor.exe", Some("explorer.exe"));
        jittered.started_at = TEST_STARTED_AT + 1;
        let snapshot: ProcessSnapshot = [jittered].into_iter().collect();
        assert!(tick(&mut ledger, &snapshot, TEST_NOW + 2).is_empty());
    }

    #[test]
    fn test_seed_keeps_live_rows_and_closes_stale_ones() {
        let started = i64::try_from(TEST_STARTED_AT).unwrap();
        let rows = vec![
            AppEvent::new("Editor.exe", 42, None, None, started + 5),
            AppEvent::new("player.exe", 43, None, None, started + 5),
            // Pid 44 is alive but belongs to a process started after the row.
            AppEvent::new("viewer.exe", 44, None, None, started - 100),
        ];
        let snapshot = snapshot_of(&[(42, "editor.exe"), (44, "other.exe")]);

        let mut ledger = Ledger::new();
        let writes = ledger.seed(&rows, &snapshot, TEST_NOW);
        assert_eq!(summary(&writes), vec![("close", 43), ("close", 44)]);
        assert_eq!(ledger.get(42).unwrap().state, EntryState::Logged);
        assert_eq!(ledger.instance_count("editor.exe"), 1);
        assert!(ledger.counts_match_entries());

        // The seeded entry is not logged again, and pid 44 is now new.
        let writes = tick(&mut ledger, &snapshot, TEST_NOW + 2);
        assert_eq!(summary(&writes), vec![("insert", 44)]);
    }

    #[test]
    fn test_adopted_orphans_close_when_gone() {
        let rows = vec![AppEvent::new("editor.exe", 42, None, None, TEST_NOW - 10)];
        let mut ledger = Ledger::new();
        ledger.adopt_orphans(&rows);
        assert_eq!(ledger.orphan_count(), 1);

        let writes = tick(&mut ledger, &ProcessSnapshot::new(), TEST_NOW);
        assert_eq!(summary(&writes), vec![("close", 42)]);
        assert_eq!(ledger.orphan_count(), 0);
    }

    #[test]
    fn test_counts_stay_consistent_under_churn() {
        let mut ledger = Ledger::new();
        let ticks = [
            snapshot_of(&[(1, "a.exe"), (2, "a.exe"), (3, "b.exe")]),
            snapshot_of(&[(2, "a.exe"), (3, "b.exe"), (4, "a.exe")]),
            snapshot_of(&[(4, "a.exe"), (5, "b.exe"), (6, "b.exe")]),
            snapshot_of(&[]),
        ];

        for (i, snapshot) in ticks.iter().enumerate() {
            tick(&mut ledger, snapshot, TEST_NOW + i64::try_from(i).unwrap());
        }
        assert!(ledger.is_empty());
        assert_eq!(ledger.instance_count("a.exe"), 0);
        assert_eq!(ledger.instance_count("b.exe"), 0);
    }
}
