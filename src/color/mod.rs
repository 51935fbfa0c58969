//! Color index for "filter by dominant color" queries.
//!
//! Each image's dominant colors are converted to CIELAB and registered in
//! the grid cell ("bucket") that contains them. A query starts at the
//! target's own bucket and grows outward one ring of cells at a time until
//! the best `limit` candidates are provably found.
//!
//! # Ring expansion
//!
//! ```text
//!   radius 0        radius 1          radius 2
//!                 ┌───┬───┬───┐   ┌───┬───┬───┬───┬───┐
//!                 │ 1 │ 1 │ 1 │   │ 2 │ 2 │ 2 │ 2 │ 2 │
//!     ┌───┐       ├───┼───┼───┤   ├───┼───┼───┼───┼───┤
//!     │ 0 │       │ 1 │ 0 │ 1 │   │ 2 │ · │ · │ · │ 2 │
//!     └───┘       ├───┼───┼───┤   │ … │   │ 0 │   │ … │
//!                 │ 1 │ 1 │ 1 │
//!                 └───┴───┴───┘
//! ```
//!
//! A point in a cell at Chebyshev ring `r + 1` is at least `r * cell_size`
//! away from any target inside the center cell, so once the `limit`-th best
//! distance is within that bound no unexplored ring can improve the answer.

mod space;

pub use space::{Lab, Rgb};

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use tracing::debug;

use crate::config::ColorIndexConfig;
use crate::error::{GalleryDBError, Result};
use crate::types::ImageId;

/// A color query hit: image id and its CIELAB distance to the target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorMatch {
    /// Matching image.
    pub id: ImageId,
    /// Distance from the target to the image's closest dominant color.
    pub distance: f32,
}

/// Grid cell in CIELAB space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BucketKey {
    l: i32,
    a: i32,
    b: i32,
}

impl BucketKey {
    fn of(lab: &Lab, cell_size: f32) -> Self {
        Self {
            l: (lab.l / cell_size).floor() as i32,
            a: (lab.a / cell_size).floor() as i32,
            b: (lab.b / cell_size).floor() as i32,
        }
    }

    fn chebyshev(&self, other: &BucketKey) -> u32 {
        let dl = self.l.abs_diff(other.l);
        let da = self.a.abs_diff(other.a);
        let db = self.b.abs_diff(other.b);
        dl.max(da).max(db)
    }
}

#[derive(Debug, Default)]
struct ColorState {
    buckets: HashMap<BucketKey, BTreeSet<ImageId>>,
    colors: HashMap<ImageId, Vec<Lab>>,
}

impl ColorState {
    fn insert(&mut self, id: ImageId, labs: Vec<Lab>, cell_size: f32) {
        for lab in &labs {
            self.buckets
                .entry(BucketKey::of(lab, cell_size))
                .or_default()
                .insert(id);
        }
        self.colors.insert(id, labs);
    }

    fn remove(&mut self, id: ImageId, cell_size: f32) -> bool {
        let Some(labs) = self.colors.remove(&id) else {
            return false;
        };
        for lab in &labs {
            let key = BucketKey::of(lab, cell_size);
            if let Some(set) = self.buckets.get_mut(&key) {
                set.remove(&id);
                if set.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
        true
    }

    fn closest_distance(&self, id: ImageId, target: &Lab) -> Option<f32> {
        self.colors.get(&id).and_then(|labs| {
            labs.iter()
                .map(|lab| lab.distance(target))
                .min_by(|a, b| a.total_cmp(b))
        })
    }
}

// Largest span of any CIELAB axis for 8-bit sRGB input, with margin.
const LAB_SPAN: f32 = 260.0;

/// Color index over images' dominant colors.
///
/// Mutations take the write lock, queries share the read lock, so a
/// query never observes an image registered under only some of its
/// buckets.
#[derive(Debug)]
pub struct ColorIndex {
    state: RwLock<ColorState>,
    config: ColorIndexConfig,
    max_radius: u32,
}

impl ColorIndex {
    /// Creates an empty color index.
    pub fn new(config: &ColorIndexConfig) -> Self {
        Self {
            state: RwLock::new(ColorState::default()),
            config: config.clone(),
            max_radius: (LAB_SPAN / config.cell_size).ceil() as u32 + 1,
        }
    }

    /// Builds an index from `(id, colors)` pairs.
    pub fn build(
        config: &ColorIndexConfig,
        entries: impl IntoIterator<Item = (ImageId, Vec<Rgb>)>,
    ) -> Self {
        let mut index = Self::new(config);
        let state = index.build_state(entries);
        index.state = RwLock::new(state);
        index
    }

    fn build_state(&self, entries: impl IntoIterator<Item = (ImageId, Vec<Rgb>)>) -> ColorState {
        let mut state = ColorState::default();
        for (id, colors) in entries {
            let labs = self.to_labs(&colors);
            if !labs.is_empty() {
                state.insert(id, labs, self.config.cell_size);
            }
        }
        state
    }

    fn to_labs(&self, colors: &[Rgb]) -> Vec<Lab> {
        colors
            .iter()
            .take(self.config.max_colors)
            .map(Rgb::to_lab)
            .collect()
    }

    /// Registers an image under the buckets of its dominant colors.
    ///
    /// Any previous registration for `id` is removed first, so stale
    /// buckets never retain it. An empty color list just removes it.
    pub fn index(&self, id: ImageId, colors: &[Rgb]) -> Result<()> {
        let labs = self.to_labs(colors);
        let mut state = self
            .state
            .write()
            .map_err(|_| GalleryDBError::index("Color index lock poisoned"))?;

        state.remove(id, self.config.cell_size);
        if !labs.is_empty() {
            state.insert(id, labs, self.config.cell_size);
        }

        debug!(id = %id, colors = colors.len(), "Colors indexed");
        Ok(())
    }

    /// Removes an image from every bucket. No-op if absent.
    pub fn remove(&self, id: ImageId) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| GalleryDBError::index("Color index lock poisoned"))?;
        if state.remove(id, self.config.cell_size) {
            debug!(id = %id, "Colors removed");
        }
        Ok(())
    }

    /// Replaces the whole index with one built from `entries`.
    ///
    /// The new state is built without holding the lock; readers keep
    /// seeing the previous state until the swap.
    pub fn rebuild(&self, entries: impl IntoIterator<Item = (ImageId, Vec<Rgb>)>) -> Result<()> {
        let fresh = self.build_state(entries);
        let mut state = self
            .state
            .write()
            .map_err(|_| GalleryDBError::index("Color index lock poisoned"))?;
        *state = fresh;
        Ok(())
    }

    /// Returns up to `limit` images whose dominant colors are closest to
    /// `target`, ascending by distance, ties by ascending id.
    pub fn query(&self, target: Rgb, limit: usize) -> Result<Vec<ColorMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let state = self
            .state
            .read()
            .map_err(|_| GalleryDBError::index("Color index lock poisoned"))?;
        if state.colors.is_empty() {
            return Ok(Vec::new());
        }

        let target_lab = target.to_lab();
        let center = BucketKey::of(&target_lab, self.config.cell_size);
        let total = state.colors.len();

        let mut seen: HashSet<ImageId> = HashSet::new();
        let mut matches: Vec<ColorMatch> = Vec::new();

        for radius in 0..=self.max_radius {
            for key in ring_keys(&state, center, radius) {
                let Some(ids) = state.buckets.get(&key) else {
                    continue;
                };
                for &id in ids {
                    if !seen.insert(id) {
                        continue;
                    }
                    if let Some(distance) = state.closest_distance(id, &target_lab) {
                        matches.push(ColorMatch { id, distance });
                    }
                }
            }

            if seen.len() >= total {
                break;
            }
            if matches.len() >= limit {
                matches.sort_by(compare_matches);
                let bound = radius as f32 * self.config.cell_size;
                if matches[limit - 1].distance <= bound || seen.len() >= self.config.max_candidates
                {
                    break;
                }
            }
        }

        matches.sort_by(compare_matches);
        matches.truncate(limit);
        Ok(matches)
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: ImageId) -> bool {
        self.state
            .read()
            .ok()
            .is_some_and(|s| s.colors.contains_key(&id))
    }

    /// Returns the number of registered images.
    pub fn len(&self) -> usize {
        self.state.read().map_or(0, |s| s.colors.len())
    }

    /// Returns true if no image is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of non-empty buckets.
    pub fn bucket_count(&self) -> usize {
        self.state.read().map_or(0, |s| s.buckets.len())
    }
}

fn compare_matches(x: &ColorMatch, y: &ColorMatch) -> Ordering {
    x.distance
        .total_cmp(&y.distance)
        .then_with(|| x.id.cmp(&y.id))
}

/// Keys of the cells at exactly Chebyshev distance `radius` from `center`.
///
/// Large rings are resolved by filtering the occupied buckets instead of
/// enumerating every cell of the ring.
fn ring_keys(state: &ColorState, center: BucketKey, radius: u32) -> Vec<BucketKey> {
    if radius == 0 {
        return vec![center];
    }

    let side = 2 * radius as u64 + 1;
    let inner = side - 2;
    let ring_cells = side * side * side - inner * inner * inner;

    if ring_cells > state.buckets.len() as u64 {
        return state
            .buckets
            .keys()
            .filter(|key| key.chebyshev(&center) == radius)
            .copied()
            .collect();
    }

    let r = radius as i32;
    let mut keys = Vec::with_capacity(ring_cells as usize);
    for dl in -r..=r {
        for da in -r..=r {
            for db in -r..=r {
                if dl.abs().max(da.abs()).max(db.abs()) != r {
                    continue;
                }
                keys.push(BucketKey {
                    l: center.l + dl,
                    a: center.a + da,
                    b: center.b + db,
                });
            }
        }
    }
    keys
}
