//! Search jobs: one path request, advanced a little every tick until it finishes.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bevy::log;

use crate::{
    astar::{AStarSearch, SearchStep},
    graph::GraphStore,
    jps::JumpPointSearch,
    node::NodeRef,
    path::Path,
    traversal::{try_end_node, PathfindingArgs, SearchKind},
    TileRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Shared flag the requester can set to abandon a job. Observed before every expansion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lifecycle of a job. `Queued` and `Running` move forward only; the other three are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }
}

/// Final result of a job. `path` is only set when the job succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct PathOutcome {
    pub job: JobId,
    pub state: JobState,
    pub path: Option<Path>,
}

/// What the requester keeps: the id to collect the outcome with and a way to cancel.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: JobId,
    pub token: CancellationToken,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

enum Search {
    AStar(AStarSearch),
    JumpPoint(JumpPointSearch),
}

pub(crate) struct SearchJob {
    id: JobId,
    /// Resolved to nodes when the job begins, after the tick's changes are applied.
    start: TileRef,
    end: TileRef,
    args: PathfindingArgs,
    token: CancellationToken,
    state: JobState,
    search: Option<Search>,
    path: Option<Path>,
}

impl SearchJob {
    pub(crate) fn new(
        id: JobId,
        start: TileRef,
        end: TileRef,
        args: PathfindingArgs,
        token: CancellationToken,
    ) -> Self {
        SearchJob {
            id,
            start,
            end,
            args,
            token,
            state: JobState::Queued,
            search: None,
            path: None,
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    /// Start and end tiles of a job that has not begun yet.
    pub(crate) fn pending_tiles(&self) -> Option<[TileRef; 2]> {
        (self.state == JobState::Queued).then_some([self.start, self.end])
    }

    /// Consumes a finished job into its outcome.
    pub(crate) fn into_outcome(self) -> PathOutcome {
        PathOutcome {
            job: self.id,
            state: self.state,
            path: self.path,
        }
    }

    /// Advances the job by at most `budget` expansions. Terminal jobs are left untouched.
    pub(crate) fn step(&mut self, graph: &GraphStore, budget: usize) -> JobState {
        if self.state.is_terminal() {
            return self.state;
        }

        if self.token.is_cancelled() {
            return self.finish(JobState::Cancelled, None);
        }

        if self.state == JobState::Queued {
            if let Some(state) = self.begin(graph) {
                return state;
            }
        }

        let Some(search) = self.search.as_mut() else {
            return self.finish(JobState::Failed, None);
        };

        let step = match search {
            Search::AStar(search) => search.step(graph, &self.args, budget, &self.token),
            Search::JumpPoint(search) => search.step(graph, &self.args, budget, &self.token),
        };

        match step {
            SearchStep::Pending => self.state,
            SearchStep::Found(path) => self.finish(JobState::Succeeded, Some(path)),
            SearchStep::Exhausted | SearchStep::GraphMissing => self.finish(JobState::Failed, None),
            SearchStep::Cancelled => self.finish(JobState::Cancelled, None),
        }
    }

    /// Validates the request and sets up the search. Returns the final state if the job is
    /// decided without searching.
    fn begin(&mut self, graph: &GraphStore) -> Option<JobState> {
        if self.start.grid != self.end.grid {
            log::debug!("{} spans {} and {}, failing", self.id, self.start.grid, self.end.grid);
            return Some(self.finish(JobState::Failed, None));
        }

        let (Some(start), Some(end)) = (resolve(graph, self.start), resolve(graph, self.end)) else {
            log::debug!("{} names tiles outside the graph, failing", self.id);
            return Some(self.finish(JobState::Failed, None));
        };

        let Some(end) = try_end_node(graph, &self.args, end) else {
            return Some(self.finish(JobState::Failed, None));
        };

        if start == end {
            let path = Path::new(vec![start.tile()], 0.0);
            return Some(self.finish(JobState::Succeeded, Some(path)));
        }

        self.search = Some(match self.args.kind {
            SearchKind::JumpPoint if self.args.allow_diagonals => {
                Search::JumpPoint(JumpPointSearch::new(start, end))
            }
            _ => Search::AStar(AStarSearch::new(start, end)),
        });
        self.state = JobState::Running;
        None
    }

    fn finish(&mut self, state: JobState, path: Option<Path>) -> JobState {
        self.state = state;
        self.path = path;
        self.search = None;
        state
    }
}

/// Handle to the node of a tile whose chunk already exists.
fn resolve(graph: &GraphStore, tile: TileRef) -> Option<NodeRef> {
    graph.get_chunk(tile)?.node_ref(tile.pos)
}
