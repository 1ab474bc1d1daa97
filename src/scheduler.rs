//! Owns the live search jobs and steps all of them once per tick.
use bevy::log;
use slab::Slab;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    graph::GraphStore,
    job::{JobId, JobState, PathOutcome, SearchJob},
    world::TileSource,
    FxIndexMap,
};

#[derive(Default)]
pub(crate) struct JobQueue {
    jobs: Slab<SearchJob>,
    /// Slab key of every live job.
    keys: FxIndexMap<JobId, usize>,
    /// Finished jobs waiting to be collected, in completion order, with the round they finished in.
    completed: FxIndexMap<JobId, (PathOutcome, u64)>,
    next_id: u64,
    rounds: u64,
}

impl JobQueue {
    pub(crate) fn next_id(&mut self) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn push(&mut self, job: SearchJob) {
        let id = job.id();
        let key = self.jobs.insert(job);
        self.keys.insert(id, key);
    }

    pub(crate) fn active_count(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// `None` once the job is unknown or its outcome has been taken.
    pub(crate) fn state(&self, id: JobId) -> Option<JobState> {
        if let Some((outcome, _)) = self.completed.get(&id) {
            return Some(outcome.state);
        }

        self.keys
            .get(&id)
            .and_then(|&key| self.jobs.get(key))
            .map(|job| job.state())
    }

    /// Creates the chunks under the start and end tiles of jobs that have not begun yet.
    /// Tiles on unknown grids are left for the job to fail on.
    pub(crate) fn prepare<W: TileSource + ?Sized>(&self, graph: &mut GraphStore, world: &W) {
        for (_, job) in self.jobs.iter() {
            for tile in job.pending_tiles().into_iter().flatten() {
                if graph.get_chunk(tile).is_some() {
                    continue;
                }

                if let Err(err) = graph.get_or_create_chunk(world, tile) {
                    log::debug!("Not preparing {} for a search: {}", tile, err);
                }
            }
        }
    }

    /// Steps every live job by `budget` expansions, then retires the ones that finished.
    /// Returns the number of jobs retired.
    pub(crate) fn process(&mut self, graph: &GraphStore, budget: usize) -> usize {
        self.rounds += 1;

        #[cfg(feature = "parallel")]
        {
            let mut jobs: Vec<&mut SearchJob> = self.jobs.iter_mut().map(|(_, job)| job).collect();
            jobs.par_iter_mut().for_each(|job| {
                job.step(graph, budget);
            });
        }

        #[cfg(not(feature = "parallel"))]
        for (_, job) in self.jobs.iter_mut() {
            job.step(graph, budget);
        }

        self.retire()
    }

    fn retire(&mut self) -> usize {
        let finished: Vec<(JobId, usize)> = self
            .keys
            .iter()
            .filter(|&(_, &key)| self.jobs[key].state().is_terminal())
            .map(|(&id, &key)| (id, key))
            .collect();

        for &(id, key) in &finished {
            self.keys.shift_remove(&id);
            let outcome = self.jobs.remove(key).into_outcome();
            self.completed.insert(id, (outcome, self.rounds));
        }

        finished.len()
    }

    /// Drops outcomes that have gone `retention` rounds without being collected.
    /// Returns how many were dropped.
    pub(crate) fn expire(&mut self, retention: u64) -> usize {
        let expired = self
            .completed
            .values()
            .take_while(|&&(_, round)| self.rounds - round >= retention)
            .count();

        if expired > 0 {
            log::debug!("Dropping {} uncollected path outcomes", expired);
            self.completed.drain(..expired);
        }

        expired
    }

    pub(crate) fn take_outcome(&mut self, id: JobId) -> Option<PathOutcome> {
        self.completed.shift_remove(&id).map(|(outcome, _)| outcome)
    }

    pub(crate) fn drain_completed(&mut self) -> Vec<PathOutcome> {
        self.completed.drain(..).map(|(_, (outcome, _))| outcome).collect()
    }

    /// Drops every job and outcome. Ids keep counting up.
    pub(crate) fn clear(&mut self) {
        self.jobs.clear();
        self.keys.clear();
        self.completed.clear();
    }
}
