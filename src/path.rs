//! This module defines the `Path` returned by a finished search.
use std::collections::VecDeque;

use crate::TileRef;

/// An ordered tile sequence from start to goal, with its total movement cost.
#[derive(Debug, Clone)]
pub struct Path {
    pub(crate) path: VecDeque<TileRef>,
    cost: f32,
}

impl Path {
    /// Create a new path from a vector of tiles, start first.
    /// # Arguments
    /// * `path` - The tiles, start first.
    /// * `cost` - The total movement cost of the path
    pub fn new(path: Vec<TileRef>, cost: f32) -> Self {
        Path {
            path: path.into(),
            cost,
        }
    }

    /// Returns true if the path contains the given tile
    pub fn is_position_in_path(&self, tile: TileRef) -> bool {
        self.path.contains(&tile)
    }

    /// Iterates the remaining tiles, start first.
    pub fn iter(&self) -> impl Iterator<Item = &TileRef> {
        self.path.iter()
    }

    /// Copies the remaining tiles into a `Vec`.
    pub fn to_vec(&self) -> Vec<TileRef> {
        self.path.iter().copied().collect()
    }

    /// Returns the movement cost of the path
    pub fn cost(&self) -> f32 {
        self.cost
    }

    /// Returns the length of the path
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// Returns true if the path is empty
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn first(&self) -> Option<TileRef> {
        self.path.front().copied()
    }

    pub fn last(&self) -> Option<TileRef> {
        self.path.back().copied()
    }

    /// Pops the first tile of the path.
    pub fn pop(&mut self) -> Option<TileRef> {
        self.path.pop_front()
    }

    /// Returns the next tile in the path without removing it.
    pub fn next(&self) -> Option<TileRef> {
        self.path.front().copied()
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl IntoIterator for Path {
    type Item = TileRef;
    type IntoIter = std::collections::vec_deque::IntoIter<TileRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.path.into_iter()
    }
}
