//! Arena of runs in ascending timestamp order with four linked threads over it.
//!
//! Every run sits on the global thread, the thread of its own character, and
//! exactly one of the win/loss threads. Links are stored as indices into the
//! arena, so "same run" is index equality and no references alias.

use crate::error::StatsError;
use crate::run::{Character, Run};

/// Stable position of a run in a [`RunHistory`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub usize);

/// Which linkage table to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Thread {
    Global,
    Character,
    Win,
    Loss,
}

impl Thread {
    pub const ALL: [Thread; 4] = [Thread::Global, Thread::Character, Thread::Win, Thread::Loss];

    fn table(self) -> usize {
        match self {
            Self::Global => 0,
            Self::Character => 1,
            Self::Win => 2,
            Self::Loss => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    pub next: Option<RunId>,
    pub prev: Option<RunId>,
}

/// Head/tail slots: global, win, loss, then one per character (Other included).
const ENDPOINTS: usize = 3 + 5;

fn char_endpoint(character: Character) -> usize {
    3 + character.slot().unwrap_or(4)
}

#[derive(Debug, Clone, Default)]
pub struct RunIndex {
    tables: [Vec<Link>; 4],
    heads: [Option<RunId>; ENDPOINTS],
    tails: [Option<RunId>; ENDPOINTS],
}

impl RunIndex {
    /// Link every run in one forward pass. Rejects input not sorted ascending.
    pub fn build(runs: &[Run]) -> Result<Self, StatsError> {
        let mut index = Self::default();
        for (i, run) in runs.iter().enumerate() {
            if i > 0 && run.timestamp < runs[i - 1].timestamp {
                return Err(StatsError::UnorderedRuns { position: i });
            }
            index.append(RunId(i), run);
        }
        Ok(index)
    }

    fn append(&mut self, id: RunId, run: &Run) {
        for table in &mut self.tables {
            table.push(Link::default());
        }
        let outcome = if run.won { (Thread::Win, 1) } else { (Thread::Loss, 2) };
        self.link(Thread::Global, 0, id);
        self.link(Thread::Character, char_endpoint(run.character), id);
        self.link(outcome.0, outcome.1, id);
    }

    fn link(&mut self, thread: Thread, endpoint: usize, id: RunId) {
        let table = &mut self.tables[thread.table()];
        match self.tails[endpoint] {
            Some(tail) => {
                table[tail.0].next = Some(id);
                table[id.0].prev = Some(tail);
            }
            None => self.heads[endpoint] = Some(id),
        }
        self.tails[endpoint] = Some(id);
    }

    pub fn len(&self) -> usize {
        self.tables[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn links(&self, id: RunId, thread: Thread) -> Link {
        self.tables[thread.table()]
            .get(id.0)
            .copied()
            .unwrap_or_default()
    }

    pub fn next(&self, id: RunId, thread: Thread) -> Option<RunId> {
        self.links(id, thread).next
    }

    pub fn prev(&self, id: RunId, thread: Thread) -> Option<RunId> {
        self.links(id, thread).prev
    }

    /// Earliest run on the character's thread.
    pub fn first_of(&self, character: Character) -> Option<RunId> {
        self.heads[char_endpoint(character)]
    }

    /// Latest run on the character's thread.
    pub fn last_of(&self, character: Character) -> Option<RunId> {
        self.tails[char_endpoint(character)]
    }

    pub fn first_win(&self) -> Option<RunId> {
        self.heads[1]
    }

    pub fn last_win(&self) -> Option<RunId> {
        self.tails[1]
    }

    pub fn first_loss(&self) -> Option<RunId> {
        self.heads[2]
    }

    pub fn last_loss(&self) -> Option<RunId> {
        self.tails[2]
    }

    /// Iterate forward along `thread` starting at (and including) `from`.
    pub fn walk(&self, from: RunId, thread: Thread) -> ThreadWalk<'_> {
        ThreadWalk {
            index: self,
            thread,
            cursor: Some(from),
        }
    }
}

pub struct ThreadWalk<'a> {
    index: &'a RunIndex,
    thread: Thread,
    cursor: Option<RunId>,
}

impl Iterator for ThreadWalk<'_> {
    type Item = RunId;

    fn next(&mut self) -> Option<RunId> {
        let current = self.cursor?;
        self.cursor = self.index.next(current, self.thread);
        Some(current)
    }
}

/// Owned run arena plus its index. Rebuilt whenever the run set changes.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    runs: Vec<Run>,
    index: RunIndex,
}

impl RunHistory {
    /// Build from runs already in ascending timestamp order.
    pub fn from_ascending(runs: Vec<Run>) -> Result<Self, StatsError> {
        let index = RunIndex::build(&runs)?;
        Ok(Self { runs, index })
    }

    /// Build from a newest-first log, as run sources deliver it.
    /// Runs sharing a timestamp keep their log order.
    pub fn from_newest_first(mut runs: Vec<Run>) -> Result<Self, StatsError> {
        runs.reverse();
        runs.sort_by_key(|r| r.timestamp);
        Self::from_ascending(runs)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn get(&self, id: RunId) -> Option<&Run> {
        self.runs.get(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = RunId> + '_ {
        (0..self.runs.len()).map(RunId)
    }

    pub fn latest(&self) -> Option<RunId> {
        self.runs.len().checked_sub(1).map(RunId)
    }

    pub fn index(&self) -> &RunIndex {
        &self.index
    }

    /// Same runs in the same order as `other`.
    pub fn same_shape(&self, other: &RunHistory) -> bool {
        self.len() == other.len() && other.starts_with(self)
    }

    /// `prefix` is an older snapshot of this history, i.e. only appends happened since.
    pub fn starts_with(&self, prefix: &RunHistory) -> bool {
        prefix.len() <= self.len()
            && self
                .runs
                .iter()
                .zip(&prefix.runs)
                .all(|(a, b)| a.id == b.id && a.timestamp == b.timestamp)
    }
}

#[cfg(test)]
impl RunHistory {
    /// Point `from` at `to` along `thread`, bypassing the ordering rules.
    pub(crate) fn relink(&mut self, from: RunId, thread: Thread, to: RunId) {
        if let Some(link) = self.index.tables[thread.table()].get_mut(from.0) {
            link.next = Some(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn run(id: &str, day: u32, character: Character, won: bool) -> Run {
        Run {
            id: id.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2023, 3, day)
                .unwrap()
                .and_hms_opt(20, 0, 0)
                .unwrap(),
            character,
            won,
            ascension: 20,
            modded: false,
            modifiers: Default::default(),
            playtime: 3600,
        }
    }

    #[test]
    fn empty_index() {
        let index = RunIndex::build(&[]).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.first_win(), None);
        assert_eq!(index.last_of(Character::Silent), None);
    }

    #[test]
    fn rejects_descending_input() {
        let runs = vec![
            run("a", 2, Character::Ironclad, true),
            run("b", 1, Character::Ironclad, true),
        ];
        match RunIndex::build(&runs) {
            Err(StatsError::UnorderedRuns { position }) => assert_eq!(position, 1),
            other => panic!("expected UnorderedRuns, got {other:?}"),
        }
    }

    #[test]
    fn character_thread_skips_other_characters() {
        let runs = vec![
            run("a", 1, Character::Ironclad, true),
            run("b", 2, Character::Silent, false),
            run("c", 3, Character::Ironclad, false),
        ];
        let index = RunIndex::build(&runs).unwrap();
        assert_eq!(index.next(RunId(0), Thread::Character), Some(RunId(2)));
        assert_eq!(index.prev(RunId(2), Thread::Character), Some(RunId(0)));
        assert_eq!(index.next(RunId(1), Thread::Character), None);
        assert_eq!(index.first_of(Character::Silent), Some(RunId(1)));
        assert_eq!(index.last_of(Character::Ironclad), Some(RunId(2)));
    }

    #[test]
    fn outcome_threads() {
        let runs = vec![
            run("a", 1, Character::Ironclad, true),
            run("b", 2, Character::Silent, false),
            run("c", 3, Character::Defect, true),
            run("d", 4, Character::Watcher, false),
        ];
        let index = RunIndex::build(&runs).unwrap();
        let wins: Vec<RunId> = index.walk(RunId(0), Thread::Win).collect();
        assert_eq!(wins, vec![RunId(0), RunId(2)]);
        let losses: Vec<RunId> = index.walk(RunId(1), Thread::Loss).collect();
        assert_eq!(losses, vec![RunId(1), RunId(3)]);
        assert_eq!(index.last_win(), Some(RunId(2)));
        assert_eq!(index.first_loss(), Some(RunId(1)));
    }

    #[test]
    fn newest_first_is_reversed() {
        let history = RunHistory::from_newest_first(vec![
            run("c", 3, Character::Defect, true),
            run("b", 2, Character::Silent, false),
            run("a", 1, Character::Ironclad, true),
        ])
        .unwrap();
        let ids: Vec<&str> = history.runs().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(history.latest(), Some(RunId(2)));
    }
}
