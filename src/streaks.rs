//! Groups the per-character threads into winning-streak containers.
//!
//! Consecutive same-outcome runs on a character's thread form a group. A
//! group of at least [`MIN_WINNING_STREAK`] wins becomes its own winning
//! container; everything else collapses into the neighbouring non-winning
//! container. Containers are kept newest first and the newest is `ongoing`.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::StatsError;
use crate::index::{RunHistory, RunId, Thread};
use crate::run::Character;

/// Fewest consecutive wins that count as a streak worth showing.
pub const MIN_WINNING_STREAK: usize = 3;

/// Number of progress blobs to draw for a container of `length` runs.
///
/// Always at least 20, then rounded up to the next multiple of ten.
pub fn target(length: usize) -> u32 {
    if length <= 20 {
        20
    } else {
        (length.div_ceil(10) * 10) as u32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreakContainer {
    pub winning_streak: bool,
    pub ongoing: bool,
    runs: Vec<RunId>,
    wins: u32,
    breaker: Option<RunId>,
}

impl StreakContainer {
    fn new(winning_streak: bool, runs: Vec<RunId>, wins: u32, breaker: Option<RunId>) -> Self {
        Self {
            winning_streak,
            ongoing: false,
            runs,
            wins,
            breaker,
        }
    }

    /// Member runs, earliest first.
    pub fn runs(&self) -> &[RunId] {
        &self.runs
    }

    /// Counted length: wins only, never the run that broke the streak.
    pub fn streak(&self) -> u32 {
        self.wins
    }

    /// The run after the last member on the same character's thread.
    pub fn breaker(&self) -> Option<RunId> {
        self.breaker
    }

    /// Members plus, for a finished winning streak, the run that ended it.
    pub fn display_runs(&self) -> Vec<RunId> {
        let mut runs = self.runs.clone();
        if self.winning_streak
            && !self.ongoing
            && let Some(breaker) = self.breaker
        {
            runs.push(breaker);
        }
        runs
    }

    pub fn target(&self) -> u32 {
        target(self.display_runs().len())
    }

    /// Flatten into a serializable summary. `None` if a member is missing from `history`.
    pub fn view(&self, history: &RunHistory) -> Option<StreakView> {
        let display = self.display_runs();
        let start = history.get(*display.first()?)?.timestamp;
        let end = history.get(*display.last()?)?.timestamp;
        let first_character = history.get(*self.runs.first()?)?.character;
        let shared = self
            .runs
            .iter()
            .filter_map(|id| history.get(*id))
            .all(|r| r.character == first_character);
        Some(StreakView {
            winning: self.winning_streak,
            ongoing: self.ongoing,
            character: shared.then_some(first_character),
            streak: self.wins,
            start,
            end,
            length: display.len(),
            target: target(display.len()),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreakView {
    pub winning: bool,
    pub ongoing: bool,
    pub character: Option<Character>,
    pub streak: u32,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub length: usize,
    pub target: u32,
}

/// Containers newest first, plus per-run streak lengths.
#[derive(Debug, Clone)]
pub struct StreakCache {
    since: Option<NaiveDateTime>,
    containers: Vec<StreakContainer>,
    lengths: Vec<u32>,
    history: Arc<RunHistory>,
}

impl StreakCache {
    pub fn empty(history: Arc<RunHistory>, since: Option<NaiveDateTime>) -> Self {
        let lengths = vec![0; history.len()];
        Self {
            since,
            containers: Vec::new(),
            lengths,
            history,
        }
    }

    pub fn since(&self) -> Option<NaiveDateTime> {
        self.since
    }

    pub fn containers(&self) -> &[StreakContainer] {
        &self.containers
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn history(&self) -> &Arc<RunHistory> {
        &self.history
    }

    /// Consecutive wins on the run's character thread, up to and including it.
    /// Zero for losses and for runs at or before the cutoff.
    pub fn streak_length(&self, id: RunId) -> u32 {
        self.lengths.get(id.0).copied().unwrap_or(0)
    }

    pub fn views(&self) -> Vec<StreakView> {
        self.containers
            .iter()
            .filter_map(|c| c.view(&self.history))
            .collect()
    }
}

pub struct StreakDetector {
    since: Option<NaiveDateTime>,
}

impl StreakDetector {
    /// Only runs strictly after `since` take part. `None` uses every run.
    pub fn new(since: Option<NaiveDateTime>) -> Self {
        Self { since }
    }

    pub fn detect(&self, history: Arc<RunHistory>) -> Result<StreakCache, StatsError> {
        let mut lengths = vec![0u32; history.len()];
        let groups = self.group(&history, &mut lengths)?;
        let containers = classify(&history, groups);
        Ok(StreakCache {
            since: self.since,
            containers,
            lengths,
            history,
        })
    }

    fn included(&self, history: &RunHistory, id: RunId) -> bool {
        match (self.since, history.get(id)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(since), Some(run)) => run.timestamp > since,
        }
    }

    /// Earliest to latest: each unseen run starts a group that follows its
    /// character thread while the outcome holds.
    fn group(
        &self,
        history: &RunHistory,
        lengths: &mut [u32],
    ) -> Result<Vec<Vec<RunId>>, StatsError> {
        let index = history.index();
        let mut seen = vec![false; history.len()];
        let mut groups = Vec::new();

        for start in history.ids() {
            if seen[start.0] || !self.included(history, start) {
                continue;
            }
            let won = history.runs()[start.0].won;
            let mut group = Vec::new();
            for id in index.walk(start, Thread::Character) {
                let Some(run) = history.get(id) else { break };
                if run.won != won {
                    break;
                }
                if seen[id.0] {
                    return Err(StatsError::ThreadRevisit { run: id.0 });
                }
                seen[id.0] = true;
                group.push(id);
                if won {
                    lengths[id.0] = group.len() as u32;
                }
            }
            groups.push(group);
        }
        Ok(groups)
    }
}

/// Oldest group to newest. Winning groups always open a new container;
/// anything else joins the newest container when that one is non-winning.
fn classify(history: &RunHistory, groups: Vec<Vec<RunId>>) -> Vec<StreakContainer> {
    let index = history.index();
    let mut containers: Vec<StreakContainer> = Vec::new();

    for group in groups {
        let Some(&first) = group.first() else { continue };
        let won = history.runs()[first.0].won;
        let wins = if won { group.len() as u32 } else { 0 };

        if won && group.len() >= MIN_WINNING_STREAK {
            let breaker = group
                .last()
                .and_then(|last| index.next(*last, Thread::Character));
            containers.push(StreakContainer::new(true, group, wins, breaker));
            continue;
        }

        match containers.last_mut() {
            Some(newest) if !newest.winning_streak => {
                newest.runs.extend(group);
                newest.runs.sort_unstable();
                newest.wins += wins;
            }
            _ => containers.push(StreakContainer::new(false, group, wins, None)),
        }
    }

    containers.reverse();
    if let Some(newest) = containers.first_mut() {
        newest.ongoing = true;
    }
    containers
}
