//! Dimensions and their vertical extents.

use serde::{Deserialize, Serialize};

/// Inclusive-exclusive block height range of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightRange {
    /// Lowest block Y.
    pub min: i32,
    /// One past the highest block Y.
    pub max: i32,
}

impl HeightRange {
    /// Total block height.
    pub fn height(self) -> i32 {
        self.max - self.min
    }

    /// Index of the lowest slice.
    pub fn min_sub_chunk(self) -> i32 {
        self.min >> 4
    }

    /// Number of slices.
    pub fn sub_chunk_count(self) -> usize {
        (self.height() / 16) as usize
    }
}

/// A world dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    #[default]
    Overworld,
    Nether,
    End,
}

impl Dimension {
    /// Dimension for a protocol id. Unknown ids map to the overworld.
    pub fn from_id(id: i32) -> Self {
        match id {
            1 => Dimension::Nether,
            2 => Dimension::End,
            _ => Dimension::Overworld,
        }
    }

    /// Protocol id.
    pub fn id(self) -> i32 {
        match self {
            Dimension::Overworld => 0,
            Dimension::Nether => 1,
            Dimension::End => 2,
        }
    }

    /// Block range, `pre_118` selecting the old 0..256 overworld.
    pub fn range(self, pre_118: bool) -> HeightRange {
        match self {
            Dimension::Overworld if pre_118 => HeightRange { min: 0, max: 256 },
            Dimension::Overworld => HeightRange { min: -64, max: 320 },
            Dimension::Nether => HeightRange { min: 0, max: 128 },
            Dimension::End => HeightRange { min: 0, max: 256 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overworld_ranges() {
        let modern = Dimension::Overworld.range(false);
        assert_eq!(modern.min_sub_chunk(), -4);
        assert_eq!(modern.sub_chunk_count(), 24);
        let legacy = Dimension::Overworld.range(true);
        assert_eq!(legacy.min_sub_chunk(), 0);
        assert_eq!(legacy.sub_chunk_count(), 16);
    }

    #[test]
    fn test_ids_round_trip_and_unknown_default() {
        for dim in [Dimension::Overworld, Dimension::Nether, Dimension::End] {
            assert_eq!(Dimension::from_id(dim.id()), dim);
        }
        assert_eq!(Dimension::from_id(7), Dimension::Overworld);
        assert_eq!(Dimension::Nether.range(false).sub_chunk_count(), 8);
    }
}
