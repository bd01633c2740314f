//! Win/loss counters, personal bests and current streaks per character.
//!
//! A cold accumulator does one full scan; afterwards each refresh only
//! applies runs past the last one it has seen, so calling it repeatedly
//! between new runs changes nothing. Runs sharing a timestamp are told
//! apart by position, not by time.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::index::{RunHistory, RunId};
use crate::range::DateWindow;
use crate::run::{Character, Run};
use crate::streaks::StreakCache;

/// Which runs count toward the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsPolicy {
    pub include_modded: bool,
    pub min_ascension: u8,
}

impl StatsPolicy {
    pub fn counts(&self, run: &Run) -> bool {
        if run.character == Character::Other {
            return false;
        }
        if self.include_modded {
            run.meets_ascension(self.min_ascension)
        } else {
            run.is_ranked(self.min_ascension)
        }
    }
}

/// Five counters. `None` means "not computed yet", which is distinct from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistic {
    pub all: Option<u32>,
    pub ironclad: Option<u32>,
    pub silent: Option<u32>,
    pub defect: Option<u32>,
    pub watcher: Option<u32>,
}

impl Statistic {
    pub fn zeroed() -> Self {
        Self {
            all: Some(0),
            ironclad: Some(0),
            silent: Some(0),
            defect: Some(0),
            watcher: Some(0),
        }
    }

    fn slot_mut(&mut self, character: Character) -> Option<&mut Option<u32>> {
        match character {
            Character::Ironclad => Some(&mut self.ironclad),
            Character::Silent => Some(&mut self.silent),
            Character::Defect => Some(&mut self.defect),
            Character::Watcher => Some(&mut self.watcher),
            Character::Other => None,
        }
    }

    pub fn get(&self, character: Character) -> Option<u32> {
        match character {
            Character::Ironclad => self.ironclad,
            Character::Silent => self.silent,
            Character::Defect => self.defect,
            Character::Watcher => self.watcher,
            Character::Other => None,
        }
    }

    /// Bump both the character slot and `all`.
    pub fn increment(&mut self, character: Character) {
        if let Some(slot) = self.slot_mut(character) {
            *slot = Some(slot.unwrap_or(0) + 1);
            self.all = Some(self.all.unwrap_or(0) + 1);
        }
    }

    /// Raise the character slot and `all` to at least `value`.
    pub fn raise(&mut self, character: Character, value: u32) {
        if let Some(slot) = self.slot_mut(character) {
            *slot = Some(slot.map_or(value, |v| v.max(value)));
            self.all = Some(self.all.map_or(value, |v| v.max(value)));
        }
    }

    /// Overwrite the character slot and `all`.
    pub fn set(&mut self, character: Character, value: u32) {
        if let Some(slot) = self.slot_mut(character) {
            *slot = Some(value);
            self.all = Some(value);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.all.is_some()
            && Character::NAMED.iter().all(|c| self.get(*c).is_some())
    }

    /// `all` equals the sum of the four characters. Vacuously true while incomplete.
    pub fn is_consistent(&self) -> bool {
        if !self.is_complete() {
            return true;
        }
        let sum: u32 = Character::NAMED
            .iter()
            .filter_map(|c| self.get(*c))
            .sum();
        self.all == Some(sum)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub wins: Statistic,
    pub losses: Statistic,
    /// Longest streak per character; `all` is the best across characters.
    pub pb: Statistic,
    /// Streak as of each character's latest counted run; `all` tracks the latest run overall.
    pub streaks: Statistic,
    pub last_timestamp: Option<NaiveDateTime>,
    pub is_loaded: bool,
    /// Runs of the history already applied, oldest first.
    #[serde(skip)]
    applied: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the counters up to date with `streaks.history()`.
    ///
    /// The history must extend the one seen last time; a shorter one is
    /// taken as a rewritten log and rescanned.
    pub fn refresh(
        &mut self,
        streaks: &StreakCache,
        window: Option<&DateWindow>,
        policy: &StatsPolicy,
    ) {
        let history = streaks.history();
        let Some(latest) = history.latest() else {
            self.streaks = Statistic::zeroed();
            if !self.is_loaded {
                self.wins = Statistic::zeroed();
                self.losses = Statistic::zeroed();
            }
            return;
        };

        if self.applied > history.len() {
            tracing::warn!(
                applied = self.applied,
                runs = history.len(),
                "stats: history shrank, rescanning"
            );
            self.is_loaded = false;
        }
        if !self.is_loaded {
            self.full_scan(history, streaks, latest, window, policy);
        }

        for index in self.applied..history.len() {
            self.apply(history, streaks, RunId(index), window, policy);
        }
    }

    /// Everything except the newest run, which the targeted update handles.
    fn full_scan(
        &mut self,
        history: &RunHistory,
        streaks: &StreakCache,
        latest: RunId,
        window: Option<&DateWindow>,
        policy: &StatsPolicy,
    ) {
        self.wins = Statistic::zeroed();
        self.losses = Statistic::zeroed();
        self.streaks = Statistic::zeroed();
        self.pb = Statistic::default();
        self.last_timestamp = None;
        self.applied = 0;

        for index in 0..latest.0 {
            self.apply(history, streaks, RunId(index), window, policy);
        }
        self.is_loaded = true;
        tracing::debug!(runs = history.len(), "stats: full scan complete");
    }

    fn apply(
        &mut self,
        history: &RunHistory,
        streaks: &StreakCache,
        id: RunId,
        window: Option<&DateWindow>,
        policy: &StatsPolicy,
    ) {
        let Some(run) = history.get(id) else { return };
        self.applied = id.0 + 1;
        self.last_timestamp = Some(run.timestamp);

        if !policy.counts(run) || window.is_some_and(|w| !w.contains(run.timestamp)) {
            return;
        }
        if run.won {
            self.wins.increment(run.character);
        } else {
            self.losses.increment(run.character);
        }
        let length = streaks.streak_length(id);
        self.pb.raise(run.character, length);
        self.streaks.set(run.character, length);
    }

    /// Number of runs from the history already folded in.
    pub fn applied_runs(&self) -> usize {
        self.applied
    }

    pub fn total_runs(&self) -> u32 {
        self.wins.all.unwrap_or(0) + self.losses.all.unwrap_or(0)
    }

    /// Win rate over counted runs, if any.
    pub fn win_rate(&self) -> Option<f64> {
        let total = self.total_runs();
        (total > 0).then(|| self.wins.all.unwrap_or(0) as f64 / total as f64)
    }
}

/// [`RunStats`] restricted to a date window. An unbounded window is all-time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatsByDate {
    pub window: DateWindow,
    #[serde(flatten)]
    pub stats: RunStats,
}

impl RunStatsByDate {
    pub fn new(window: DateWindow) -> Self {
        Self {
            window,
            stats: RunStats::new(),
        }
    }

    pub fn refresh(&mut self, streaks: &StreakCache, policy: &StatsPolicy) {
        let window = (!self.window.is_all_time()).then_some(&self.window);
        self.stats.refresh(streaks, window, policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_is_not_zero() {
        let s = Statistic::default();
        assert_eq!(s.all, None);
        assert!(!s.is_complete());
        assert_ne!(s, Statistic::zeroed());
    }

    #[test]
    fn increment_keeps_sum() {
        let mut s = Statistic::zeroed();
        s.increment(Character::Ironclad);
        s.increment(Character::Watcher);
        s.increment(Character::Watcher);
        s.increment(Character::Other);
        assert_eq!(s.all, Some(3));
        assert_eq!(s.watcher, Some(2));
        assert!(s.is_consistent());
    }

    #[test]
    fn raise_only_grows() {
        let mut s = Statistic::default();
        s.raise(Character::Silent, 4);
        s.raise(Character::Silent, 2);
        s.raise(Character::Defect, 5);
        assert_eq!(s.silent, Some(4));
        assert_eq!(s.defect, Some(5));
        assert_eq!(s.all, Some(5));
        assert_eq!(s.ironclad, None);
    }

    #[test]
    fn policy_excludes_modded_and_other() {
        let policy = StatsPolicy::default();
        let mut run: Run = serde_json::from_str(
            r#"{"id":"a","timestamp":"2023-01-01T00:00:00","character":"silent","won":true}"#,
        )
        .unwrap();
        assert!(policy.counts(&run));
        run.modded = true;
        assert!(!policy.counts(&run));
        assert!(StatsPolicy { include_modded: true, min_ascension: 0 }.counts(&run));
        run.modded = false;
        run.character = Character::Other;
        assert!(!policy.counts(&run));
    }
}
