use super::*;
use std::ops::ControlFlow;

const RTREE_CHILDREN_PER_NODE: usize = 8;
const OVERLAP_FUDGE_FACTOR: f64 = 1.0e-9;

/// Minimum extent of the curve domain, keeps the Hilbert mapping defined when every item sits on
/// the same latitude or longitude.
const MIN_DOMAIN_EXTENT: f64 = 1.0e-6;

#[derive(Debug)]
enum RTreeNode {
    Node {
        bbox: BoundingBox,
        children: Vec<RTreeNode>,
    },
    Leaf {
        bbox: BoundingBox,
        index: usize,
    },
}

impl RTreeNode {
    fn bounding_box(&self) -> BoundingBox {
        match self {
            Self::Node { bbox, .. } => *bbox,
            Self::Leaf { bbox, .. } => *bbox,
        }
    }

    fn new_nodes(children: Vec<Self>) -> Self {
        let mut bbox = BoundingBox::empty();
        for child in &children {
            bbox.expand(&child.bounding_box());
        }

        Self::Node { bbox, children }
    }

    /// Recursively visit the objects in `data` that have bounding boxes that overlap `region`.
    ///
    /// ## Parameters
    ///
    /// data - is managed by the parent Hilbert2DRTreeView object. Indexes of `Self::Leaf{..}`
    /// nodes index into this slice.
    ///
    /// region - is the region of interest.
    ///
    /// visit - is applied to every item that overlaps `region` along with its index in `data` and
    /// the accumulated `user_data`. Returning `Break(..)` stops the search.
    fn foreach<T, V, F>(
        &self,
        data: &[T],
        region: &BoundingBox,
        visit: &mut F,
        user_data: V,
    ) -> ControlFlow<V, V>
    where
        F: FnMut(&T, usize, V) -> ControlFlow<V, V>,
    {
        if !self.bounding_box().overlap(region, OVERLAP_FUDGE_FACTOR) {
            return ControlFlow::Continue(user_data);
        }

        match self {
            Self::Leaf { index, .. } => visit(&data[*index], *index, user_data),
            Self::Node { children, .. } => {
                let mut user_data = user_data;
                for child in children {
                    match child.foreach(data, region, visit, user_data) {
                        ControlFlow::Continue(value) => user_data = value,
                        brk @ ControlFlow::Break(_) => return brk,
                    }
                }

                ControlFlow::Continue(user_data)
            }
        }
    }
}

/// A read only, bulk loaded R-tree over a slice of [Geo] items.
///
/// Items are ordered along a Hilbert curve before being packed into nodes, which keeps nearby
/// items in the same branches of the tree.
#[derive(Debug)]
pub struct Hilbert2DRTreeView<'a, T> {
    root: RTreeNode,
    data: &'a [T],
}

impl<'a, T: Geo> Hilbert2DRTreeView<'a, T> {
    /// Build a view into the provided list.
    ///
    /// Returns `None` if `data` is empty.
    pub fn build_for(data: &'a [T], precomputed_domain: Option<BoundingBox>) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        let data_domain = precomputed_domain.unwrap_or_else(|| Self::build_domain(data));

        let hc = HilbertCurve::new(16, data_domain);

        // Build the leaf nodes - level 0
        let mut leaves: Vec<(u64, RTreeNode)> = data
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let hilbert_num = hc.translate_to_curve_distance(item.centroid());
                let bbox = item.bounding_box();
                (hilbert_num, RTreeNode::Leaf { bbox, index })
            })
            .collect();

        // Sort the leaf nodes by Hilbert number. This is how we get locality for the parent nodes.
        // Ties keep slice order so the tree layout only depends on the data.
        leaves.sort_by_key(|(hilbert_num, _)| *hilbert_num);

        let mut level_nodes: Vec<RTreeNode> = leaves.into_iter().map(|(_, leaf)| leaf).collect();
        while level_nodes.len() > 1 {
            let child_nodes = level_nodes;
            level_nodes = Vec::with_capacity(child_nodes.len() / RTREE_CHILDREN_PER_NODE + 1);

            let mut children = Vec::with_capacity(RTREE_CHILDREN_PER_NODE);
            for child_node in child_nodes.into_iter() {
                children.push(child_node);

                if children.len() == RTREE_CHILDREN_PER_NODE {
                    level_nodes.push(RTreeNode::new_nodes(children));
                    children = Vec::with_capacity(RTREE_CHILDREN_PER_NODE);
                }
            }

            if !children.is_empty() {
                level_nodes.push(RTreeNode::new_nodes(children));
            }
        }

        let root = level_nodes.pop()?;

        Some(Hilbert2DRTreeView { root, data })
    }

    /// Number of items indexed by this view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Apply a function to all elements with bounding boxes that overlap `region`.
    ///
    /// The closure gets each item, its index in the underlying slice, and the accumulator. It
    /// returns `Break(..)` to stop early. The final accumulator value is returned.
    pub fn foreach<V, F>(&self, region: BoundingBox, user_data: V, mut visit: F) -> V
    where
        F: FnMut(&T, usize, V) -> ControlFlow<V, V>,
    {
        match self.root.foreach(self.data, &region, &mut visit, user_data) {
            ControlFlow::Break(value) => value,
            ControlFlow::Continue(value) => value,
        }
    }

    /// Collect the indexes of all the items that overlap `region` into `buffer`.
    ///
    /// The buffer is cleared first so it can be reused between queries.
    pub fn indexes_in(&self, region: BoundingBox, buffer: &mut Vec<usize>) {
        buffer.clear();
        self.foreach(region, buffer, |_item, index, buffer| {
            buffer.push(index);
            ControlFlow::Continue(buffer)
        });
    }

    fn build_domain(data: &[T]) -> BoundingBox {
        let mut mbr = BoundingBox::empty();
        for item in data {
            mbr.expand(&item.bounding_box());
        }

        if mbr.ur.lon - mbr.ll.lon < MIN_DOMAIN_EXTENT {
            mbr.ll.lon -= MIN_DOMAIN_EXTENT;
            mbr.ur.lon += MIN_DOMAIN_EXTENT;
        }

        if mbr.ur.lat - mbr.ll.lat < MIN_DOMAIN_EXTENT {
            mbr.ll.lat -= MIN_DOMAIN_EXTENT;
            mbr.ur.lat += MIN_DOMAIN_EXTENT;
        }

        mbr
    }
}

#[derive(Debug)]
struct HilbertCurve {
    // The number of iterations to use for this curve.
    //
    // This number can be a maximum of 31. If it is larger than 31, we won't have enough bits to do
    // the binary transformation correctly.
    iterations: u32,

    // This is the domain that the curve will cover.
    domain: BoundingBox,

    // These are needed for fast transformations from the "domain" space into the "Hilbert" space.
    max_dim: u32,
    width: f64,
    height: f64,
}

impl HilbertCurve {
    fn new(iterations: u32, domain: BoundingBox) -> Self {
        debug_assert!((1..=31).contains(&iterations));

        let max_dim = (1u32 << iterations) - 1;
        let width = domain.ur.lon - domain.ll.lon;
        let height = domain.ur.lat - domain.ll.lat;

        Self {
            iterations,
            domain,
            max_dim,
            width,
            height,
        }
    }

    /// Skilling's "axes to transpose" followed by interleaving the bits, x is the high bit of
    /// each pair.
    fn coords_to_integer(&self, HilbertCoord { x, y }: HilbertCoord) -> u64 {
        debug_assert!(x <= self.max_dim && y <= self.max_dim);

        let mut axes = [x, y];
        let m = 1u32 << (self.iterations - 1);

        // Inverse undo excess work
        let mut q = m;
        while q > 1 {
            let p = q - 1;
            for i in 0..axes.len() {
                if (axes[i] & q) != 0 {
                    axes[0] ^= p;
                } else {
                    let t = (axes[0] ^ axes[i]) & p;
                    axes[0] ^= t;
                    axes[i] ^= t;
                }
            }
            q >>= 1;
        }

        // Gray encode
        axes[1] ^= axes[0];
        let mut t = 0u32;
        q = m;
        while q > 1 {
            if (axes[1] & q) != 0 {
                t ^= q - 1;
            }
            q >>= 1;
        }
        axes[0] ^= t;
        axes[1] ^= t;

        let [x, y] = axes.map(u64::from);
        (0..u64::from(self.iterations)).fold(0u64, |hilbert_int, b| {
            let x_bit = ((x >> b) & 1) << (2 * b + 1);
            let y_bit = ((y >> b) & 1) << (2 * b);
            hilbert_int | x_bit | y_bit
        })
    }

    fn translate_to_hilbert_coords(&self, coord: Coord) -> HilbertCoord {
        let hilbert_edge_len = (self.max_dim + 1) as f64;

        // Float to int casts saturate, so anything left of or below the domain maps to 0.
        let x = ((coord.lon - self.domain.ll.lon) / self.width * hilbert_edge_len) as u32;
        let y = ((coord.lat - self.domain.ll.lat) / self.height * hilbert_edge_len) as u32;

        HilbertCoord {
            x: x.min(self.max_dim),
            y: y.min(self.max_dim),
        }
    }

    fn translate_to_curve_distance(&self, coord: Coord) -> u64 {
        self.coords_to_integer(self.translate_to_hilbert_coords(coord))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HilbertCoord {
    x: u32,
    y: u32,
}
