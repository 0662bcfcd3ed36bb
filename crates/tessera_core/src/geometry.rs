//! # Lattice Geometry
//!
//! Integer points, the eight compass directions, and the eight point
//! symmetries of the square lattice. A symmetry is a relabeling of window
//! offsets, never a shape change: it preserves Manhattan length exactly.

use std::ops::{Add, Neg, Sub};

/// A signed 2-D lattice coordinate or offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    /// X component (east positive).
    pub x: i32,
    /// Y component (south positive).
    pub y: i32,
}

impl Point {
    /// Creates a new point.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The origin.
    pub const ZERO: Self = Self::new(0, 0);

    /// Manhattan length of this offset.
    #[inline]
    #[must_use]
    pub const fn manhattan_length(self) -> u32 {
        self.x.unsigned_abs() + self.y.unsigned_abs()
    }

    /// Chebyshev (king-move) length of this offset.
    #[inline]
    #[must_use]
    pub fn chebyshev_length(self) -> u32 {
        self.x.unsigned_abs().max(self.y.unsigned_abs())
    }
}

impl Add for Point {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// The eight compass directions, in clockwise order from north.
///
/// The discriminant doubles as the 3-bit direction field in packet headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Dir {
    /// Up.
    North = 0,
    /// Up-right.
    Northeast = 1,
    /// Right.
    East = 2,
    /// Down-right.
    Southeast = 3,
    /// Down.
    South = 4,
    /// Down-left.
    Southwest = 5,
    /// Left.
    West = 6,
    /// Up-left.
    Northwest = 7,
}

impl Dir {
    /// All eight directions, in discriminant order.
    pub const ALL: [Self; 8] = [
        Self::North,
        Self::Northeast,
        Self::East,
        Self::Southeast,
        Self::South,
        Self::Southwest,
        Self::West,
        Self::Northwest,
    ];

    /// Returns the 3-bit wire index of this direction.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Decodes a 3-bit wire index.
    #[inline]
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::North),
            1 => Some(Self::Northeast),
            2 => Some(Self::East),
            3 => Some(Self::Southeast),
            4 => Some(Self::South),
            5 => Some(Self::Southwest),
            6 => Some(Self::West),
            7 => Some(Self::Northwest),
            _ => None,
        }
    }

    /// Unit offset of this direction (one tile step).
    #[inline]
    #[must_use]
    pub const fn offset(self) -> Point {
        match self {
            Self::North => Point::new(0, -1),
            Self::Northeast => Point::new(1, -1),
            Self::East => Point::new(1, 0),
            Self::Southeast => Point::new(1, 1),
            Self::South => Point::new(0, 1),
            Self::Southwest => Point::new(-1, 1),
            Self::West => Point::new(-1, 0),
            Self::Northwest => Point::new(-1, -1),
        }
    }

    /// The direction pointing back the way this one came.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::Northeast => Self::Southwest,
            Self::East => Self::West,
            Self::Southeast => Self::Northwest,
            Self::South => Self::North,
            Self::Southwest => Self::Northeast,
            Self::West => Self::East,
            Self::Northwest => Self::Southeast,
        }
    }

    /// True for the diagonal (corner-sharing) directions.
    #[inline]
    #[must_use]
    pub const fn is_diagonal(self) -> bool {
        matches!(
            self,
            Self::Northeast | Self::Southeast | Self::Southwest | Self::Northwest
        )
    }
}

/// A compact set of directions, one bit per [`Dir`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirMask(u8);

impl DirMask {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Adds a direction to the set.
    #[inline]
    pub fn insert(&mut self, dir: Dir) {
        self.0 |= 1 << dir.index();
    }

    /// Removes a direction from the set.
    #[inline]
    pub fn remove(&mut self, dir: Dir) {
        self.0 &= !(1 << dir.index());
    }

    /// Returns true iff the set contains `dir`.
    #[inline]
    #[must_use]
    pub const fn contains(self, dir: Dir) -> bool {
        self.0 & (1 << dir.index()) != 0
    }

    /// Returns true iff the set is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of directions in the set.
    #[inline]
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the directions in the set, in discriminant order.
    pub fn iter(self) -> impl Iterator<Item = Dir> {
        Dir::ALL.into_iter().filter(move |d| self.contains(*d))
    }
}

/// The eight point symmetries of the square lattice: four rotations, each
/// optionally composed with a horizontal flip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Symmetry {
    /// Identity.
    #[default]
    R000 = 0,
    /// Quarter turn.
    R090 = 1,
    /// Half turn.
    R180 = 2,
    /// Three-quarter turn.
    R270 = 3,
    /// Horizontal flip.
    F000 = 4,
    /// Flip then quarter turn.
    F090 = 5,
    /// Flip then half turn.
    F180 = 6,
    /// Flip then three-quarter turn.
    F270 = 7,
}

impl Symmetry {
    /// All eight symmetries.
    pub const ALL: [Self; 8] = [
        Self::R000,
        Self::R090,
        Self::R180,
        Self::R270,
        Self::F000,
        Self::F090,
        Self::F180,
        Self::F270,
    ];

    /// Applies this symmetry to a window offset.
    #[inline]
    #[must_use]
    pub const fn apply(self, p: Point) -> Point {
        let Point { x, y } = match self {
            Self::R000 | Self::R090 | Self::R180 | Self::R270 => p,
            Self::F000 | Self::F090 | Self::F180 | Self::F270 => Point::new(-p.x, p.y),
        };
        match self {
            Self::R000 | Self::F000 => Point::new(x, y),
            Self::R090 | Self::F090 => Point::new(-y, x),
            Self::R180 | Self::F180 => Point::new(-x, -y),
            Self::R270 | Self::F270 => Point::new(y, -x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manhattan_length() {
        assert_eq!(Point::ZERO.manhattan_length(), 0);
        assert_eq!(Point::new(2, -1).manhattan_length(), 3);
        assert_eq!(Point::new(-4, -4).manhattan_length(), 8);
    }

    #[test]
    fn test_dir_wire_index_round_trip() {
        for dir in Dir::ALL {
            assert_eq!(Dir::from_index(dir.index()), Some(dir));
        }
        assert_eq!(Dir::from_index(8), None);
    }

    #[test]
    fn test_dir_opposite_offsets_cancel() {
        for dir in Dir::ALL {
            assert_eq!(dir.offset() + dir.opposite().offset(), Point::ZERO);
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn test_symmetry_preserves_manhattan_length() {
        let probes = [
            Point::new(1, 0),
            Point::new(2, 1),
            Point::new(-1, 2),
            Point::new(-3, -1),
        ];
        for sym in Symmetry::ALL {
            for p in probes {
                assert_eq!(sym.apply(p).manhattan_length(), p.manhattan_length());
            }
        }
    }

    #[test]
    fn test_symmetries_are_distinct_relabelings() {
        // On an asymmetric probe point, all eight images differ.
        let probe = Point::new(2, 1);
        let mut seen = Vec::new();
        for sym in Symmetry::ALL {
            let image = sym.apply(probe);
            assert!(!seen.contains(&image), "{sym:?} collides");
            seen.push(image);
        }
    }

    #[test]
    fn test_quarter_turn_composes_to_identity() {
        let probe = Point::new(2, 1);
        let mut p = probe;
        for _ in 0..4 {
            p = Symmetry::R090.apply(p);
        }
        assert_eq!(p, probe);
    }
}
