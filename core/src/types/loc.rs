use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocType {
    pub name: String,
    pub width: i32,
    pub length: i32,
    pub blockwalk: bool,
    pub blockrange: bool,
    /// Interactable; inactive ground decoration never blocks.
    pub active: bool,
    pub anim: i32,
    /// Sides that may not be used to reach the loc: 0x1 north, 0x2 east,
    /// 0x4 south, 0x8 west (before rotation).
    pub forceapproach: u8,
}

impl Default for LocType {
    fn default() -> Self {
        LocType {
            name: String::new(),
            width: 1,
            length: 1,
            blockwalk: true,
            blockrange: true,
            active: false,
            anim: -1,
            forceapproach: 0,
        }
    }
}

impl LocType {
    /// Footprint after rotation as `(width, length)`.
    pub fn rotated_size(&self, rotation: u8) -> (i32, i32) {
        if rotation & 1 == 1 {
            (self.length, self.width)
        } else {
            (self.width, self.length)
        }
    }

    /// Blocked-approach mask after rotation.
    pub fn rotated_forceapproach(&self, rotation: u8) -> u8 {
        let rotation = (rotation & 3) as u32;
        if rotation == 0 {
            return self.forceapproach & 0xf;
        }
        let fa = (self.forceapproach & 0xf) as u32;
        (((fa << rotation) & 0xf) | (fa >> (4 - rotation))) as u8
    }
}

/// Placement shape of a loc. The discriminant is the wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LocShape {
    WallStraight = 0,
    WallDiagonalCorner = 1,
    WallL = 2,
    WallSquareCorner = 3,
    WallDecorStraightNoOffset = 4,
    WallDecorStraightOffset = 5,
    WallDecorDiagonalOffset = 6,
    WallDecorDiagonalNoOffset = 7,
    WallDecorDiagonalBoth = 8,
    WallDiagonal = 9,
    CentrepieceStraight = 10,
    CentrepieceDiagonal = 11,
    RoofStraight = 12,
    RoofDiagonalWithRoofEdge = 13,
    RoofDiagonal = 14,
    RoofLConcave = 15,
    RoofLConvex = 16,
    RoofFlat = 17,
    RoofEdgeStraight = 18,
    RoofEdgeDiagonalCorner = 19,
    RoofEdgeL = 20,
    RoofEdgeSquareCorner = 21,
    GroundDecor = 22,
}

/// Scene slot a shape occupies. A tile holds at most one loc per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocLayer {
    Wall = 0,
    WallDecor = 1,
    Ground = 2,
    GroundDecor = 3,
}

impl LocLayer {
    pub const ALL: [LocLayer; 4] = [
        LocLayer::Wall,
        LocLayer::WallDecor,
        LocLayer::Ground,
        LocLayer::GroundDecor,
    ];
}

impl TryFrom<u8> for LocShape {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use LocShape::*;
        Ok(match value {
            0 => WallStraight,
            1 => WallDiagonalCorner,
            2 => WallL,
            3 => WallSquareCorner,
            4 => WallDecorStraightNoOffset,
            5 => WallDecorStraightOffset,
            6 => WallDecorDiagonalOffset,
            7 => WallDecorDiagonalNoOffset,
            8 => WallDecorDiagonalBoth,
            9 => WallDiagonal,
            10 => CentrepieceStraight,
            11 => CentrepieceDiagonal,
            12 => RoofStraight,
            13 => RoofDiagonalWithRoofEdge,
            14 => RoofDiagonal,
            15 => RoofLConcave,
            16 => RoofLConvex,
            17 => RoofFlat,
            18 => RoofEdgeStraight,
            19 => RoofEdgeDiagonalCorner,
            20 => RoofEdgeL,
            21 => RoofEdgeSquareCorner,
            22 => GroundDecor,
            other => return Err(other),
        })
    }
}

impl LocShape {
    pub fn layer(self) -> LocLayer {
        match self as u8 {
            0..=3 => LocLayer::Wall,
            4..=8 => LocLayer::WallDecor,
            22 => LocLayer::GroundDecor,
            _ => LocLayer::Ground,
        }
    }

    /// Shapes that add wall edges to the collision grid.
    pub fn is_wall(self) -> bool {
        (self as u8) <= 3
    }

    /// Shapes reached by standing beside a wall segment.
    pub fn is_wall_reach(self) -> bool {
        matches!(
            self,
            LocShape::WallStraight | LocShape::WallL | LocShape::WallDiagonal
        )
    }

    pub fn is_wall_decor_reach(self) -> bool {
        matches!(
            self,
            LocShape::WallDecorDiagonalOffset
                | LocShape::WallDecorDiagonalNoOffset
                | LocShape::WallDecorDiagonalBoth
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_follow_shape_ranges() {
        assert_eq!(LocShape::WallSquareCorner.layer(), LocLayer::Wall);
        assert_eq!(LocShape::WallDecorDiagonalBoth.layer(), LocLayer::WallDecor);
        assert_eq!(LocShape::WallDiagonal.layer(), LocLayer::Ground);
        assert_eq!(LocShape::RoofEdgeSquareCorner.layer(), LocLayer::Ground);
        assert_eq!(LocShape::GroundDecor.layer(), LocLayer::GroundDecor);
        assert_eq!(LocShape::try_from(23), Err(23));
    }

    #[test]
    fn forceapproach_rotates_clockwise() {
        let loc = LocType {
            forceapproach: 0b0001,
            ..LocType::default()
        };
        assert_eq!(loc.rotated_forceapproach(0), 0b0001);
        assert_eq!(loc.rotated_forceapproach(1), 0b0010);
        assert_eq!(loc.rotated_forceapproach(3), 0b1000);

        let wrap = LocType {
            forceapproach: 0b1000,
            ..LocType::default()
        };
        assert_eq!(wrap.rotated_forceapproach(1), 0b0001);
    }

    #[test]
    fn odd_rotations_swap_footprint() {
        let loc = LocType {
            width: 2,
            length: 3,
            ..LocType::default()
        };
        assert_eq!(loc.rotated_size(0), (2, 3));
        assert_eq!(loc.rotated_size(1), (3, 2));
    }
}
