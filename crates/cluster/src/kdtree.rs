use foundation::math::precision::stable_total_cmp_f64;

/// A static 2D k-d tree over projected points.
///
/// Ordering contract:
/// - `range` and `within` return point indices in ascending order.
///
/// The tree is built once and never mutated; rebuilding is cheap enough for
/// fleets in the low thousands.
#[derive(Debug, Clone, Default)]
pub struct KdTree {
    items: Vec<(u32, [f64; 2])>,
    node_size: usize,
}

impl KdTree {
    pub fn build(points: &[[f64; 2]], node_size: usize) -> Self {
        let mut tree = Self {
            items: points
                .iter()
                .enumerate()
                .map(|(idx, p)| (idx as u32, *p))
                .collect(),
            node_size: node_size.max(1),
        };
        let len = tree.items.len();
        tree.sort(0, len, 0);
        tree
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Indices of points inside the closed box `[min, max]`.
    pub fn range(&self, min: [f64; 2], max: [f64; 2]) -> Vec<u32> {
        let inside = |p: [f64; 2]| p[0] >= min[0] && p[0] <= max[0] && p[1] >= min[1] && p[1] <= max[1];
        self.search(inside, |axis, split| {
            (min[axis] <= split, max[axis] >= split)
        })
    }

    /// Indices of points within Euclidean distance `r` of `center`.
    pub fn within(&self, center: [f64; 2], r: f64) -> Vec<u32> {
        let r2 = r * r;
        let inside = |p: [f64; 2]| {
            let dx = p[0] - center[0];
            let dy = p[1] - center[1];
            dx * dx + dy * dy <= r2
        };
        self.search(inside, |axis, split| {
            (center[axis] - r <= split, center[axis] + r >= split)
        })
    }

    /// Shared traversal. `descend(axis, split)` answers whether the lower and
    /// upper halves may hold hits.
    fn search(
        &self,
        inside: impl Fn([f64; 2]) -> bool,
        descend: impl Fn(usize, f64) -> (bool, bool),
    ) -> Vec<u32> {
        let mut hits = Vec::new();
        if self.items.is_empty() {
            return hits;
        }

        // (start, end, axis) over half-open ranges.
        let mut stack: Vec<(usize, usize, usize)> = vec![(0, self.items.len(), 0)];
        while let Some((lo, hi, axis)) = stack.pop() {
            if hi - lo <= self.node_size {
                for (idx, p) in &self.items[lo..hi] {
                    if inside(*p) {
                        hits.push(*idx);
                    }
                }
                continue;
            }

            let mid = (lo + hi) / 2;
            let (idx, p) = self.items[mid];
            if inside(p) {
                hits.push(idx);
            }

            let (lower, upper) = descend(axis, p[axis]);
            let next_axis = 1 - axis;
            if lower {
                stack.push((lo, mid, next_axis));
            }
            if upper {
                stack.push((mid + 1, hi, next_axis));
            }
        }

        hits.sort_unstable();
        hits
    }

    fn sort(&mut self, lo: usize, hi: usize, axis: usize) {
        if hi - lo <= self.node_size {
            return;
        }
        let mid = (lo + hi) / 2;
        self.items[lo..hi].select_nth_unstable_by(mid - lo, |a, b| {
            stable_total_cmp_f64(a.1[axis], b.1[axis]).then_with(|| a.0.cmp(&b.0))
        });
        self.sort(lo, mid, 1 - axis);
        self.sort(mid + 1, hi, 1 - axis);
    }
}
