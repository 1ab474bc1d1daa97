//! The seam between the pathfinding graph and the live world it mirrors.
use bevy::{
    math::{IRect, IVec2},
    prelude::Resource,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{GridId, TileRef};

/// Static tile properties the graph copies into its nodes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TileData {
    /// The tile has no floor (space/vacuum). Only searches with `allow_space` may enter it.
    pub empty: bool,
}

/// Source of live tile data. Implement this for your map storage.
pub trait TileSource {
    /// Returns the current data for a tile. Tiles the world knows nothing about should be
    /// reported as empty.
    fn tile(&self, tile: TileRef) -> TileData;

    /// Inclusive tile bounds of a grid, if known. When present, every chunk covering the bounds is
    /// built as soon as the grid is added.
    fn bounds(&self, _grid: GridId) -> Option<IRect> {
        None
    }
}

impl<T: TileSource + ?Sized> TileSource for &T {
    fn tile(&self, tile: TileRef) -> TileData {
        (**self).tile(tile)
    }

    fn bounds(&self, grid: GridId) -> Option<IRect> {
        (**self).bounds(grid)
    }
}

#[derive(Debug, Clone)]
struct GridTiles {
    bounds: IRect,
    empty: FxHashSet<IVec2>,
}

/// A simple in-memory [`TileSource`]: every grid is a rectangle of floor tiles, with individual
/// tiles optionally cleared to space. Anything outside the rectangle is space.
#[derive(Resource, Debug, Clone, Default)]
pub struct TileMap {
    grids: FxHashMap<GridId, GridTiles>,
}

impl TileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a grid covering `min..=max`.
    pub fn add_grid(&mut self, grid: GridId, min: IVec2, max: IVec2) {
        self.grids.insert(
            grid,
            GridTiles {
                bounds: IRect::from_corners(min, max),
                empty: FxHashSet::default(),
            },
        );
    }

    pub fn remove_grid(&mut self, grid: GridId) {
        self.grids.remove(&grid);
    }

    /// Clears a tile to space, or puts the floor back.
    pub fn set_empty(&mut self, tile: TileRef, empty: bool) {
        if let Some(tiles) = self.grids.get_mut(&tile.grid) {
            if empty {
                tiles.empty.insert(tile.pos);
            } else {
                tiles.empty.remove(&tile.pos);
            }
        }
    }
}

impl TileSource for TileMap {
    fn tile(&self, tile: TileRef) -> TileData {
        let empty = match self.grids.get(&tile.grid) {
            Some(tiles) => !tiles.bounds.contains(tile.pos) || tiles.empty.contains(&tile.pos),
            None => true,
        };

        TileData { empty }
    }

    fn bounds(&self, grid: GridId) -> Option<IRect> {
        self.grids.get(&grid).map(|tiles| tiles.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_map_bounds() {
        let mut map = TileMap::new();
        map.add_grid(GridId(0), IVec2::ZERO, IVec2::new(3, 3));

        assert!(!map.tile(TileRef::new(GridId(0), IVec2::new(3, 3))).empty);
        assert!(map.tile(TileRef::new(GridId(0), IVec2::new(4, 3))).empty);
        assert!(map.tile(TileRef::new(GridId(1), IVec2::ZERO)).empty);
    }

    #[test]
    fn test_tile_map_set_empty() {
        let mut map = TileMap::new();
        map.add_grid(GridId(0), IVec2::ZERO, IVec2::new(3, 3));
        let tile = TileRef::new(GridId(0), IVec2::new(1, 2));

        map.set_empty(tile, true);
        assert!(map.tile(tile).empty);
        map.set_empty(tile, false);
        assert!(!map.tile(tile).empty);
    }
}
