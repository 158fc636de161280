//! Triangle strip generation.
//!
//! Each render tile becomes one strip. The strip zig-zags down the bintree: at every level the recursion visits the first
//! child, emits the apex, then visits the second child, swapping the order of the children with the parity of the level.
//! A vertex equal to one of the last two emitted is dropped, and a parity mismatch is fixed by repeating a vertex, which
//! emits a degenerate triangle.

use super::traversal::FrameBuilder;

use globe_terrain_storage::{Direction, NodeId, SurfaceNodes, TriangleId};

/// Vertex indices of all the strips of a frame, back to back.
#[derive(Clone, Debug, Default)]
pub(crate) struct StripList {
    pub(crate) indices: Vec<u32>,
    parity: usize,
    min_element: u32,
    max_element: u32,
}

impl StripList {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut list = Self {
            indices: Vec::with_capacity(capacity),
            ..Default::default()
        };
        list.new_strip();

        list
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.new_strip();
    }

    pub fn new_strip(&mut self) {
        self.parity = 0;
        self.min_element = u32::MAX;
        self.max_element = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// The smallest and largest index of the current strip.
    pub fn element_range(&self) -> (u32, u32) {
        (self.min_element, self.max_element)
    }

    pub fn append(&mut self, index: u32) {
        self.indices.push(index);
        self.min_element = self.min_element.min(index);
        self.max_element = self.max_element.max(index);
    }

    #[inline]
    fn back(&self, k: usize) -> Option<u32> {
        let n = self.indices.len();

        if n >= k {
            Some(self.indices[n - k])
        } else {
            None
        }
    }

    /// Adds `index` as the next vertex at `parity`, repeating a vertex to flip the parity if needed.
    pub fn add_triangle(&mut self, index: u32, parity: usize) {
        let back2 = self.back(2);
        if Some(index) == self.back(1) || Some(index) == back2 {
            return;
        }
        if parity != self.parity {
            self.parity = parity;
        } else if let Some(back2) = back2 {
            self.append(back2);
        }
        self.append(index);
    }

    fn flip_parity(&mut self) {
        self.parity = (self.parity + 1) % 2;
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum StripStep {
    Descend { top: NodeId, corner: usize, level: usize },
    Emit { top: NodeId, parity: usize },
}

impl FrameBuilder {
    /// The frame-local vertex index of `id`, assigned on first use.
    pub(crate) fn vertex_index(&mut self, id: NodeId) -> u32 {
        if let Some(index) = self.states.index(id) {
            if self.vertex_nodes.get(index as usize) == Some(&id) {
                return index;
            }
        }
        let index = self.vertex_nodes.len() as u32;
        self.vertex_nodes.push(id);
        self.states.set_index(id, index);

        index
    }

    fn append_vertex(&mut self, id: NodeId) {
        let index = self.vertex_index(id);
        self.strips.append(index);
    }

    fn add_strip_vertex(&mut self, id: NodeId, parity: usize) {
        let index = self.vertex_index(id);
        self.strips.add_triangle(index, parity);
    }

    /// Emits the triangles of `(top, corner)` and everything refined below it, except the two hypotenuse corners.
    fn sub_mesh_refine(&mut self, nodes: &SurfaceNodes, top: NodeId, corner: usize) {
        let mut steps = std::mem::take(&mut self.strip_stack);
        steps.clear();
        steps.push(StripStep::Descend { top, corner, level: 0 });

        while let Some(step) = steps.pop() {
            match step {
                StripStep::Emit { top, parity } => self.add_strip_vertex(top, parity),
                StripStep::Descend { top, corner, level } => {
                    let parity = level % 2;
                    let base = nodes.node(top).child(corner).filter(|&base| self.is_refined(base));
                    let (first, second) = if parity == 0 {
                        (Direction::Left, Direction::Right)
                    } else {
                        (Direction::Right, Direction::Left)
                    };
                    // Pushed in reverse.
                    if let Some(base) = base {
                        steps.push(StripStep::Descend {
                            top: base,
                            corner: (corner + second as usize) % 4,
                            level: level + 1,
                        });
                    }
                    steps.push(StripStep::Emit { top, parity });
                    if let Some(base) = base {
                        steps.push(StripStep::Descend {
                            top: base,
                            corner: (corner + first as usize) % 4,
                            level: level + 1,
                        });
                    }
                }
            }
        }

        self.strip_stack = steps;
    }

    /// Emits the four triangles around `center` as one strip. Returns the number of indices added.
    pub(crate) fn mesh_refine_quad(&mut self, nodes: &SurfaceNodes, center: NodeId) -> usize {
        if !self.is_refined(center) {
            return 0;
        }
        let node = nodes.node(center);
        let corners = match (node.parent(0), node.parent(1), node.parent(2), node.parent(3)) {
            (Some(c0), Some(c1), Some(c2), Some(c3)) => [c0, c1, c2, c3],
            _ => {
                tracing::warn!("Render tile center {} is missing a corner", center);
                return 0;
            }
        };

        let start = self.strips.len();
        self.append_vertex(corners[0]);
        self.append_vertex(corners[0]);
        for q in 1..4 {
            self.sub_mesh_refine(nodes, center, q);
            self.add_strip_vertex(corners[q], 1);
        }
        self.sub_mesh_refine(nodes, center, 0);
        self.append_vertex(corners[0]);
        self.strips.flip_parity();

        self.strips.len() - start
    }

    /// Emits triangle `t` and its refinements as one strip. Returns the number of indices added.
    pub(crate) fn mesh_refine_triangle(&mut self, nodes: &SurfaceNodes, t: TriangleId) -> usize {
        if !self.is_refined(t.node()) {
            return 0;
        }
        let (left, right) = match (
            nodes.get_node(t, Direction::Left),
            nodes.get_node(t, Direction::Right),
        ) {
            (Some(left), Some(right)) => (left, right),
            _ => return 0,
        };

        let start = self.strips.len();
        self.append_vertex(left);
        self.append_vertex(left);
        self.sub_mesh_refine(nodes, t.node(), t.corner());
        self.append_vertex(right);
        self.append_vertex(right);

        self.strips.len() - start
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn repeated_vertices_are_dropped() {
        let mut strip = StripList::with_capacity(16);
        strip.append(0);
        strip.append(0);
        strip.add_triangle(1, 1);
        strip.add_triangle(1, 0);
        strip.add_triangle(0, 0);

        assert_eq!(strip.indices, vec![0, 0, 1]);
    }

    #[test]
    fn matching_parity_repeats_a_vertex() {
        let mut strip = StripList::with_capacity(16);
        strip.append(0);
        strip.append(0);
        // Parity changes from 0 to 1: no padding.
        strip.add_triangle(1, 1);
        // Same parity again: the vertex before last is repeated first.
        strip.add_triangle(2, 1);

        assert_eq!(strip.indices, vec![0, 0, 1, 0, 2]);
        assert_eq!(strip.element_range(), (0, 2));
    }

    #[test]
    fn new_strip_resets_the_element_range() {
        let mut strip = StripList::with_capacity(16);
        strip.append(7);
        strip.append(9);
        strip.new_strip();
        strip.append(3);

        assert_eq!(strip.element_range(), (3, 3));
        assert_eq!(strip.len(), 3);
    }
}
