//! The eight grid directions.
use bevy::math::IVec2;
use strum::{EnumIter, IntoEnumIterator};

/// A direction from one tile to an adjacent tile.
///
/// The declaration order is also the enumeration order used wherever neighbors are scanned,
/// cardinals first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum Dir {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
    NorthEast = 4,
    SouthEast = 5,
    SouthWest = 6,
    NorthWest = 7,
}

impl Dir {
    pub fn cardinal() -> std::iter::Copied<std::slice::Iter<'static, Dir>> {
        [Dir::North, Dir::East, Dir::South, Dir::West].iter().copied()
    }

    pub fn ordinal() -> std::iter::Copied<std::slice::Iter<'static, Dir>> {
        [Dir::NorthEast, Dir::SouthEast, Dir::SouthWest, Dir::NorthWest]
            .iter()
            .copied()
    }

    pub fn all() -> DirIter {
        Dir::iter()
    }

    pub fn vector(self) -> IVec2 {
        match self {
            Dir::North => IVec2::new(0, 1),
            Dir::East => IVec2::new(1, 0),
            Dir::South => IVec2::new(0, -1),
            Dir::West => IVec2::new(-1, 0),
            Dir::NorthEast => IVec2::new(1, 1),
            Dir::SouthEast => IVec2::new(1, -1),
            Dir::SouthWest => IVec2::new(-1, -1),
            Dir::NorthWest => IVec2::new(-1, 1),
        }
    }

    /// Inverse of [`Dir::vector`]. Offsets that are not a single step return `None`.
    pub fn from_vector(offset: IVec2) -> Option<Dir> {
        match (offset.x, offset.y) {
            (0, 1) => Some(Dir::North),
            (1, 0) => Some(Dir::East),
            (0, -1) => Some(Dir::South),
            (-1, 0) => Some(Dir::West),
            (1, 1) => Some(Dir::NorthEast),
            (1, -1) => Some(Dir::SouthEast),
            (-1, -1) => Some(Dir::SouthWest),
            (-1, 1) => Some(Dir::NorthWest),
            _ => None,
        }
    }

    pub fn opposite(self) -> Dir {
        match self {
            Dir::North => Dir::South,
            Dir::East => Dir::West,
            Dir::South => Dir::North,
            Dir::West => Dir::East,
            Dir::NorthEast => Dir::SouthWest,
            Dir::SouthEast => Dir::NorthWest,
            Dir::SouthWest => Dir::NorthEast,
            Dir::NorthWest => Dir::SouthEast,
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Dir::NorthEast | Dir::SouthEast | Dir::SouthWest | Dir::NorthWest
        )
    }

    /// The two cardinal directions a diagonal step passes between, vertical one first.
    pub fn flanks(self) -> Option<(Dir, Dir)> {
        match self {
            Dir::NorthEast => Some((Dir::North, Dir::East)),
            Dir::SouthEast => Some((Dir::South, Dir::East)),
            Dir::SouthWest => Some((Dir::South, Dir::West)),
            Dir::NorthWest => Some((Dir::North, Dir::West)),
            _ => None,
        }
    }

    /// The two directions at right angles to a cardinal direction.
    pub fn perpendicular(self) -> (Dir, Dir) {
        match self {
            Dir::North | Dir::South => (Dir::East, Dir::West),
            Dir::East | Dir::West => (Dir::North, Dir::South),
            Dir::NorthEast | Dir::SouthWest => (Dir::NorthWest, Dir::SouthEast),
            Dir::SouthEast | Dir::NorthWest => (Dir::NorthEast, Dir::SouthWest),
        }
    }

    pub(crate) fn bit(self) -> u8 {
        1 << self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_roundtrip() {
        for dir in Dir::all() {
            assert_eq!(Dir::from_vector(dir.vector()), Some(dir));
            assert_eq!(dir.vector(), -dir.opposite().vector());
        }
        assert_eq!(Dir::from_vector(IVec2::new(2, 0)), None);
    }

    #[test]
    fn test_enumeration_order() {
        let dirs: Vec<Dir> = Dir::all().collect();
        assert_eq!(dirs.len(), 8);
        assert_eq!(&dirs[..4], &[Dir::North, Dir::East, Dir::South, Dir::West]);
    }

    #[test]
    fn test_flanks_sum_to_diagonal() {
        for dir in Dir::ordinal() {
            let (a, b) = dir.flanks().unwrap();
            assert_eq!(a.vector() + b.vector(), dir.vector());
        }
        assert!(Dir::North.flanks().is_none());
    }
}
