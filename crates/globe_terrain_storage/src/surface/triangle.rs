use std::fmt;

/// Dense index of a node in the surface arena.
pub type NodeId = u32;

/// Link value meaning "no node".
pub(crate) const NIL: i32 = -1;

#[inline]
pub(crate) fn link(id: i32) -> Option<NodeId> {
    if id < 0 {
        None
    } else {
        Some(id as NodeId)
    }
}

/// The four directions of a triangle, seen from its top vertex.
///
/// `Right` and `Left` name the two children (and the two lateral neighbours). `Top` and `Base` name the apex and the
/// hypotenuse side.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Direction {
    Right = 0,
    Left = 1,
    Top = 2,
    Base = 3,
}

impl Direction {
    /// The child direction on the other side of a split.
    #[inline]
    pub fn other_child(self) -> Self {
        match self {
            Direction::Right => Direction::Left,
            Direction::Left => Direction::Right,
            d => d,
        }
    }
}

/// A triangle addressed by its top vertex and one of the four corner directions around it.
///
/// Every node is the apex of up to four right-isosceles triangles, one per quadrant. The triangle's base vertex (the
/// midpoint of its hypotenuse) is created lazily by `SurfaceNodes::get_base_node`.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TriangleId(pub u32);

impl TriangleId {
    #[inline]
    pub fn new(top: NodeId, corner: usize) -> Self {
        debug_assert!(corner < 4);

        TriangleId((top << 2) | corner as u32)
    }

    /// The apex node.
    #[inline]
    pub fn node(self) -> NodeId {
        self.0 >> 2
    }

    /// Which of the apex's four triangles this is.
    #[inline]
    pub fn corner(self) -> usize {
        (self.0 & 3) as usize
    }

    /// The triangle with the same apex, rotated by `steps` quadrants.
    #[inline]
    pub fn rotated(self, steps: usize) -> Self {
        Self::new(self.node(), (self.corner() + steps) % 4)
    }
}

impl fmt::Debug for TriangleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TriangleId({}|{})", self.node(), self.corner())
    }
}

/// A triangle edge: the triangle plus the direction of the edge relative to its apex.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EdgeId {
    pub triangle: TriangleId,
    pub direction: Direction,
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
