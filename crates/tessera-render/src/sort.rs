//! In-place heap sort over a batch's draw order, and the standard depth policies.
//!
//! The sort only ever swaps `u16` insertion indices; attribute columns are
//! read through the comparator and never moved.

use std::cmp::Ordering;

use crate::batch::QuadBatch;

/// Sort `order` ascending under `compare`. O(n log n), no allocation.
pub fn heap_sort<F>(order: &mut [u16], mut compare: F)
where
    F: FnMut(u16, u16) -> Ordering,
{
    let len = order.len();
    if len < 2 {
        return;
    }

    heapify(order, &mut compare);
    for end in (1..len).rev() {
        order.swap(0, end);
        sift_down(order, 0, end, &mut compare);
    }
}

/// Arrange `order` into a binary max-heap under `compare`.
pub fn heapify<F>(order: &mut [u16], compare: &mut F)
where
    F: FnMut(u16, u16) -> Ordering,
{
    let len = order.len();
    for root in (0..len / 2).rev() {
        sift_down(order, root, len, compare);
    }
}

/// Restore the heap property for the subtree at `root`, considering only
/// `order[..end]`.
pub fn sift_down<F>(order: &mut [u16], mut root: usize, end: usize, compare: &mut F)
where
    F: FnMut(u16, u16) -> Ordering,
{
    loop {
        let mut child = 2 * root + 1;
        if child >= end {
            break;
        }
        if child + 1 < end && compare(order[child], order[child + 1]) == Ordering::Less {
            child += 1;
        }
        if compare(order[root], order[child]) != Ordering::Less {
            break;
        }
        order.swap(root, child);
        root = child;
    }
}

/// Larger depth draws first; equal depths keep insertion order.
pub fn back_to_front<S>(batch: &QuadBatch<S>, a: u16, b: u16) -> Ordering
where
    S: Copy + PartialEq,
{
    batch
        .depth(b)
        .total_cmp(&batch.depth(a))
        .then_with(|| a.cmp(&b))
}

/// Smaller depth draws first; equal depths keep insertion order.
pub fn front_to_back<S>(batch: &QuadBatch<S>, a: u16, b: u16) -> Ordering
where
    S: Copy + PartialEq,
{
    batch
        .depth(a)
        .total_cmp(&batch.depth(b))
        .then_with(|| a.cmp(&b))
}

/// Named depth-ordering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthOrder {
    /// Paint distant quads first. Required for alpha blending.
    #[default]
    BackToFront,
    /// Paint near quads first, maximizing early depth rejection for opaque quads.
    FrontToBack,
}

impl DepthOrder {
    pub fn compare<S>(self, batch: &QuadBatch<S>, a: u16, b: u16) -> Ordering
    where
        S: Copy + PartialEq,
    {
        match self {
            DepthOrder::BackToFront => back_to_front(batch, a, b),
            DepthOrder::FrontToBack => front_to_back(batch, a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::QuadParams;

    #[test]
    fn test_heap_sort_plain_keys() {
        let mut order = [5u16, 3, 9, 0, 7, 1, 1, 8];
        heap_sort(&mut order, |a, b| a.cmp(&b));
        assert_eq!(order, [0, 1, 1, 3, 5, 7, 8, 9]);
    }

    #[test]
    fn test_heap_sort_trivial_inputs() {
        let mut empty: [u16; 0] = [];
        heap_sort(&mut empty, |a, b| a.cmp(&b));

        let mut single = [4u16];
        heap_sort(&mut single, |_, _| panic!("single element needs no comparison"));
        assert_eq!(single, [4]);
    }

    #[test]
    fn test_heapify_builds_max_heap() {
        let mut order = [2u16, 8, 5, 1, 9, 3];
        heapify(&mut order, &mut |a: u16, b: u16| a.cmp(&b));
        assert_eq!(order[0], 9);
        for i in 1..order.len() {
            assert!(order[(i - 1) / 2] >= order[i]);
        }
    }

    #[test]
    fn test_nan_depth_still_total() {
        let mut batch = QuadBatch::new(4);
        for depth in [1.0, f32::NAN, 0.5, f32::NAN] {
            batch.add(0u8, &QuadParams::default().with_depth(depth)).unwrap();
        }

        batch.sort(front_to_back);
        // Positive NaN sorts above every number under total_cmp
        assert_eq!(batch.order(), &[2, 0, 1, 3]);
    }

    #[test]
    fn test_reverse_input_sorted() {
        let mut batch = QuadBatch::new(300);
        for i in 0..300 {
            batch.add(0u8, &QuadParams::default().with_depth(i as f32)).unwrap();
        }

        batch.sort(back_to_front);
        let expected: Vec<u16> = (0..300).rev().collect();
        assert_eq!(batch.order(), expected.as_slice());
    }
}
