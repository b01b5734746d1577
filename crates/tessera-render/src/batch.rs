//! Fixed-capacity columnar storage for quads awaiting submission.
//!
//! A [`QuadBatch`] stores each quad's attributes in parallel columns indexed
//! by insertion index, plus an `order` array of `u16` insertion indices.
//! Sorting permutes only `order`; every consumer reads quads through it.

use std::cmp::Ordering;
use std::fmt;

use tessera_core::geometry::Rect;
use tessera_core::math::{Vec2, rotate};
use tessera_core::profiling::profile_function;

use crate::color::PackedColor;
use crate::sort::{self, DepthOrder};

/// Upper bound on a batch's capacity (every insertion index fits in a `u16`).
pub const MAX_BATCH_QUADS: usize = 65536;

/// Per-quad placement, appearance and texture mapping passed to [`QuadBatch::add`].
///
/// `source_*` is the sub-rectangle of the image in pixels; the on-screen size
/// is derived from it as `source_w * scale_x` by `source_h * scale_y`.
///
/// ```
/// use tessera_render::QuadParams;
///
/// let params = QuadParams::new(100.0, 50.0)
///     .with_source(0.0, 0.0, 32.0, 32.0)
///     .with_image(128.0, 64.0)
///     .with_depth(2.0);
/// assert_eq!(params.scale_x, 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadParams {
    pub x: f32,
    pub y: f32,
    pub depth: f32,
    /// Offset of the rotation pivot inside the target rectangle.
    pub origin_x: f32,
    pub origin_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Rotation around the origin, in radians.
    pub orientation: f32,
    pub color: PackedColor,
    pub source_x: f32,
    pub source_y: f32,
    pub source_w: f32,
    pub source_h: f32,
    pub image_w: f32,
    pub image_h: f32,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            depth: 0.0,
            origin_x: 0.0,
            origin_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            orientation: 0.0,
            color: PackedColor::WHITE,
            source_x: 0.0,
            source_y: 0.0,
            source_w: 1.0,
            source_h: 1.0,
            image_w: 1.0,
            image_h: 1.0,
        }
    }
}

impl QuadParams {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.source_x = x;
        self.source_y = y;
        self.source_w = width;
        self.source_h = height;
        self
    }

    pub fn with_image(mut self, width: f32, height: f32) -> Self {
        self.image_w = width;
        self.image_h = height;
        self
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_origin(mut self, x: f32, y: f32) -> Self {
        self.origin_x = x;
        self.origin_y = y;
        self
    }

    pub fn with_scale(mut self, x: f32, y: f32) -> Self {
        self.scale_x = x;
        self.scale_y = y;
        self
    }

    pub fn with_orientation(mut self, radians: f32) -> Self {
        self.orientation = radians;
        self
    }

    pub fn with_color(mut self, color: impl Into<PackedColor>) -> Self {
        self.color = color.into();
        self
    }
}

/// Errors reported by [`QuadBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    /// `add` was called on a full batch. Nothing was written.
    CapacityExceeded { capacity: usize },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::CapacityExceeded { capacity } => {
                write!(f, "Quad batch is full (capacity {})", capacity)
            }
        }
    }
}

impl std::error::Error for BatchError {}

/// A read-only snapshot of one stored quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadRef<S> {
    pub index: u16,
    pub state: S,
    pub depth: f32,
    pub source: Rect<f32>,
    pub target: Rect<f32>,
    pub origin: Vec2,
    pub scale_factor: Vec2,
    pub color: PackedColor,
    pub orientation: f32,
}

impl<S> QuadRef<S> {
    /// Scene-space corners in TL, TR, BR, BL order.
    ///
    /// Corners are taken relative to the origin, rotated by the orientation
    /// and translated so the origin lands on the target position.
    pub fn corners(&self) -> [Vec2; 4] {
        let position = Vec2::new(self.target.x, self.target.y);
        let local = Rect::new(
            -self.origin.x,
            -self.origin.y,
            self.target.width,
            self.target.height,
        );
        local
            .corners()
            .map(|corner| position + rotate(Vec2::from_array(corner), self.orientation))
    }

    /// Normalized texture coordinates matching [`corners`](Self::corners).
    pub fn tex_coords(&self) -> [Vec2; 4] {
        self.source
            .corners()
            .map(|corner| Vec2::from_array(corner) * self.scale_factor)
    }
}

/// Fixed-capacity, insert-only quad storage.
///
/// `S` is the per-quad render-state token (typically the texture to bind).
/// Consecutive quads with equal tokens are drawn with a single draw call.
///
/// # Lifecycle
///
/// `add` until the frame is built, optionally sort, submit, then `flush`.
/// Storage is allocated once in [`new`](Self::new) / [`resize`](Self::resize);
/// none of the per-frame operations allocate.
pub struct QuadBatch<S> {
    capacity: usize,
    order: Vec<u16>,
    states: Vec<S>,
    depths: Vec<f32>,
    sources: Vec<Rect<f32>>,
    targets: Vec<Rect<f32>>,
    origins: Vec<Vec2>,
    scale_factors: Vec<Vec2>,
    colors: Vec<PackedColor>,
    orientations: Vec<f32>,
}

impl<S: Copy + PartialEq> QuadBatch<S> {
    /// Create an empty batch; `capacity` is clamped to [`MAX_BATCH_QUADS`].
    pub fn new(capacity: usize) -> Self {
        let capacity = clamp_capacity(capacity);
        Self {
            capacity,
            order: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity),
            depths: Vec::with_capacity(capacity),
            sources: Vec::with_capacity(capacity),
            targets: Vec::with_capacity(capacity),
            origins: Vec::with_capacity(capacity),
            scale_factors: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
            orientations: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of quads inserted since the last flush.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Insertion indices in draw order.
    pub fn order(&self) -> &[u16] {
        &self.order
    }

    /// Append a quad and return its insertion index.
    pub fn add(&mut self, state: S, params: &QuadParams) -> Result<u16, BatchError> {
        profile_function!();

        if self.is_full() {
            return Err(BatchError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let index = self.states.len() as u16;
        self.order.push(index);
        self.states.push(state);
        self.depths.push(params.depth);
        self.sources.push(Rect::new(
            params.source_x,
            params.source_y,
            params.source_w,
            params.source_h,
        ));
        self.targets.push(Rect::new(
            params.x,
            params.y,
            params.source_w * params.scale_x,
            params.source_h * params.scale_y,
        ));
        self.origins.push(Vec2::new(params.origin_x, params.origin_y));
        self.scale_factors
            .push(Vec2::new(1.0 / params.image_w, 1.0 / params.image_h));
        self.colors.push(params.color);
        self.orientations.push(params.orientation);

        Ok(index)
    }

    /// Forget every quad, keeping the storage for the next frame.
    pub fn flush(&mut self) -> &mut Self {
        self.order.clear();
        self.states.clear();
        self.depths.clear();
        self.sources.clear();
        self.targets.clear();
        self.origins.clear();
        self.scale_factors.clear();
        self.colors.clear();
        self.orientations.clear();
        self
    }

    /// Reallocate for a new capacity and reset to empty. Not for per-frame use.
    pub fn resize(&mut self, capacity: usize) -> &mut Self {
        *self = Self::new(capacity);
        self
    }

    /// Heap-sort the draw order with `compare(batch, a, b)`.
    ///
    /// Runs in place over `order` without allocating. `compare` must define
    /// a total order; break ties on the indices themselves to keep equal
    /// keys in a predictable order. [`order`](Self::order) and
    /// [`sorted`](Self::sorted) read as empty from inside `compare`; `len`
    /// and the per-quad accessors see the full batch.
    pub fn sort<F>(&mut self, mut compare: F)
    where
        F: FnMut(&QuadBatch<S>, u16, u16) -> Ordering,
    {
        profile_function!();

        let mut order = std::mem::take(&mut self.order);
        sort::heap_sort(&mut order, |a, b| compare(self, a, b));
        self.order = order;
    }

    /// Sort with one of the standard depth policies.
    pub fn sort_by_depth(&mut self, policy: DepthOrder) {
        self.sort(|batch, a, b| policy.compare(batch, a, b));
    }

    /// Insertion indices in draw order.
    pub fn sorted(&self) -> impl ExactSizeIterator<Item = u16> + '_ {
        self.order.iter().copied()
    }

    pub fn state(&self, index: u16) -> S {
        self.states[index as usize]
    }

    pub fn depth(&self, index: u16) -> f32 {
        self.depths[index as usize]
    }

    pub fn source_rect(&self, index: u16) -> Rect<f32> {
        self.sources[index as usize]
    }

    pub fn target_rect(&self, index: u16) -> Rect<f32> {
        self.targets[index as usize]
    }

    pub fn origin(&self, index: u16) -> Vec2 {
        self.origins[index as usize]
    }

    /// `(1 / image width, 1 / image height)`.
    pub fn scale_factor(&self, index: u16) -> Vec2 {
        self.scale_factors[index as usize]
    }

    pub fn color(&self, index: u16) -> PackedColor {
        self.colors[index as usize]
    }

    pub fn orientation(&self, index: u16) -> f32 {
        self.orientations[index as usize]
    }

    /// All attributes of the quad at insertion index `index`.
    pub fn quad(&self, index: u16) -> QuadRef<S> {
        let i = index as usize;
        QuadRef {
            index,
            state: self.states[i],
            depth: self.depths[i],
            source: self.sources[i],
            target: self.targets[i],
            origin: self.origins[i],
            scale_factor: self.scale_factors[i],
            color: self.colors[i],
            orientation: self.orientations[i],
        }
    }
}

fn clamp_capacity(capacity: usize) -> usize {
    if capacity > MAX_BATCH_QUADS {
        tracing::warn!(
            "Quad batch capacity {} clamped to {}",
            capacity,
            MAX_BATCH_QUADS
        );
        MAX_BATCH_QUADS
    } else {
        capacity
    }
}

impl<S: Copy + PartialEq> fmt::Debug for QuadBatch<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadBatch")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_permutation(order: &[u16]) -> bool {
        let mut seen = vec![false; order.len()];
        for &i in order {
            match seen.get_mut(i as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }

    fn batch_with_depths(depths: &[f32]) -> QuadBatch<u32> {
        let mut batch = QuadBatch::new(depths.len());
        for &depth in depths {
            batch.add(0, &QuadParams::new(0.0, 0.0).with_depth(depth)).unwrap();
        }
        batch
    }

    #[test]
    fn test_add_writes_derived_attributes() {
        let mut batch = QuadBatch::new(4);
        let params = QuadParams::new(10.0, 20.0)
            .with_source(8.0, 16.0, 32.0, 64.0)
            .with_image(128.0, 256.0)
            .with_scale(2.0, 0.5)
            .with_origin(1.0, 2.0);

        let index = batch.add(7u32, &params).unwrap();

        assert_eq!(index, 0);
        assert_eq!(batch.target_rect(0), Rect::new(10.0, 20.0, 64.0, 32.0));
        assert_eq!(batch.source_rect(0), Rect::new(8.0, 16.0, 32.0, 64.0));
        assert_eq!(batch.scale_factor(0), Vec2::new(1.0 / 128.0, 1.0 / 256.0));
        assert_eq!(batch.origin(0), Vec2::new(1.0, 2.0));
        assert_eq!(batch.state(0), 7);
        assert_eq!(batch.order(), &[0]);
    }

    #[test]
    fn test_add_past_capacity_fails_without_writing() {
        let mut batch = QuadBatch::new(2);
        batch.add(1u8, &QuadParams::default()).unwrap();
        batch.add(2u8, &QuadParams::default()).unwrap();

        let err = batch.add(3u8, &QuadParams::default()).unwrap_err();
        assert_eq!(err, BatchError::CapacityExceeded { capacity: 2 });
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.order(), &[0, 1]);
    }

    #[test]
    fn test_capacity_is_clamped() {
        let batch: QuadBatch<u8> = QuadBatch::new(MAX_BATCH_QUADS + 10);
        assert_eq!(batch.capacity(), MAX_BATCH_QUADS);
    }

    #[test]
    fn test_full_capacity_indices_fit_u16() {
        let mut batch: QuadBatch<u8> = QuadBatch::new(MAX_BATCH_QUADS);
        let mut last = 0;
        for _ in 0..MAX_BATCH_QUADS {
            last = batch.add(0, &QuadParams::default()).unwrap();
        }
        assert_eq!(last, u16::MAX);
        assert!(batch.is_full());
    }

    #[test]
    fn test_flush_keeps_capacity() {
        let mut batch = batch_with_depths(&[1.0, 2.0, 3.0]);
        batch.flush();

        assert!(batch.is_empty());
        assert_eq!(batch.capacity(), 3);
        assert_eq!(batch.add(0, &QuadParams::default()), Ok(0));
    }

    #[test]
    fn test_resize_resets() {
        let mut batch = batch_with_depths(&[1.0, 2.0]);
        batch.resize(10);
        assert!(batch.is_empty());
        assert_eq!(batch.capacity(), 10);
    }

    #[test]
    fn test_sort_depth_policies() {
        let mut batch = batch_with_depths(&[3.0, 1.0, 2.0]);

        batch.sort_by_depth(DepthOrder::BackToFront);
        assert_eq!(batch.order(), &[0, 2, 1]);

        batch.sort_by_depth(DepthOrder::FrontToBack);
        assert_eq!(batch.order(), &[1, 2, 0]);
    }

    #[test]
    fn test_sort_ties_keep_insertion_order() {
        let mut batch = batch_with_depths(&[5.0, 1.0, 5.0, 5.0, 1.0, 5.0]);

        batch.sort_by_depth(DepthOrder::BackToFront);
        assert_eq!(batch.order(), &[0, 2, 3, 5, 1, 4]);

        batch.sort_by_depth(DepthOrder::FrontToBack);
        assert_eq!(batch.order(), &[1, 4, 0, 2, 3, 5]);
    }

    #[test]
    fn test_order_stays_a_permutation() {
        let depths: Vec<f32> = (0..97).map(|i| ((i * 37) % 11) as f32).collect();
        let mut batch = batch_with_depths(&depths);
        assert!(is_permutation(batch.order()));

        batch.sort_by_depth(DepthOrder::BackToFront);
        assert!(is_permutation(batch.order()));

        batch.sort(|b, x, y| b.depth(x).total_cmp(&b.depth(y)).reverse().then(y.cmp(&x)));
        assert!(is_permutation(batch.order()));
        assert_eq!(batch.len(), 97);
    }

    #[test]
    fn test_len_is_stable_inside_comparator() {
        let mut batch = batch_with_depths(&[3.0, 1.0, 2.0, 4.0]);

        let mut seen = Vec::new();
        batch.sort(|b, x, y| {
            seen.push((b.len(), b.is_empty(), b.is_full()));
            b.depth(x).total_cmp(&b.depth(y))
        });

        assert!(!seen.is_empty());
        assert!(seen.iter().all(|&entry| entry == (4, false, true)));
        assert_eq!(batch.order(), &[1, 2, 0, 3]);
    }

    #[test]
    fn test_quad_corners_and_tex_coords() {
        let mut batch = QuadBatch::new(1);
        batch
            .add(
                (),
                &QuadParams::new(10.0, 20.0)
                    .with_source(16.0, 32.0, 16.0, 32.0)
                    .with_image(64.0, 64.0),
            )
            .unwrap();

        let quad = batch.quad(0);
        assert_eq!(
            quad.corners(),
            [
                Vec2::new(10.0, 20.0),
                Vec2::new(26.0, 20.0),
                Vec2::new(26.0, 52.0),
                Vec2::new(10.0, 52.0),
            ]
        );
        assert_eq!(quad.tex_coords()[0], Vec2::new(0.25, 0.5));
        assert_eq!(quad.tex_coords()[2], Vec2::new(0.5, 1.0));
    }

    #[test]
    fn test_rotated_corners_pivot_on_origin() {
        let mut batch = QuadBatch::new(1);
        batch
            .add(
                (),
                &QuadParams::new(0.0, 0.0)
                    .with_source(0.0, 0.0, 2.0, 2.0)
                    .with_origin(1.0, 1.0)
                    .with_orientation(std::f32::consts::PI),
            )
            .unwrap();

        let corners = batch.quad(0).corners();
        // A half turn around the center swaps opposite corners
        assert!(corners[0].abs_diff_eq(Vec2::new(1.0, 1.0), 1e-5));
        assert!(corners[2].abs_diff_eq(Vec2::new(-1.0, -1.0), 1e-5));
    }
}
