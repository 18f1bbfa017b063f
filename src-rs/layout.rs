//! Grid autolayout: snap panel widths to divisors of the grid and panel
//! heights to a dominant height, without pushing anything off the grid.
//!
//! The passes only look at geometry. Rows are obstacles like any other
//! panel but are never resized themselves. No move is applied that would
//! make two panels overlap that did not overlap before, or push a panel
//! off the grid.

use tracing::debug;

use crate::model::{GridPos, GRID_COLUMNS, MAX_GRID_UNITS};

/// Widths that divide the 24 column grid evenly.
pub const CANONICAL_WIDTHS: [i64; 8] = [1, 2, 3, 4, 6, 8, 12, 24];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub rect: GridPos,
    /// False for rows: they occupy space but keep their size.
    pub movable: bool,
}

/// The placed panels of one dashboard. Tiles keep the index of the panel
/// they came from so results can be written back.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    tiles: Vec<Tile>,
    slots: Vec<usize>,
    original: Vec<GridPos>,
}

/// Canonical width closest to `w`; ties go to the larger width.
pub fn nearest_canonical_width(w: i64) -> i64 {
    CANONICAL_WIDTHS
        .iter()
        .copied()
        .min_by_key(|value| ((w - value).abs(), -value))
        .unwrap_or(GRID_COLUMNS)
}

/// `|delta| / current <= percent / 100`, in exact integer arithmetic.
fn within_tolerance(delta: i64, current: i64, percent: u32) -> bool {
    current > 0 && delta.abs() * 100 <= i64::from(percent) * current
}

fn overlaps(a: &GridPos, b: &GridPos) -> bool {
    a.x < b.right() && b.x < a.right() && a.y < b.bottom() && b.y < a.bottom()
}

fn off_grid(rect: &GridPos) -> bool {
    rect.x < 0 || rect.y < 0 || rect.right() > GRID_COLUMNS
}

impl Grid {
    /// Builds the grid from per-panel tiles; `None` marks a panel without
    /// usable geometry, which takes no part in the layout.
    pub fn new(tiles: impl IntoIterator<Item = Option<Tile>>) -> Self {
        let mut grid = Self::default();
        for (slot, tile) in tiles.into_iter().enumerate() {
            if let Some(tile) = tile {
                grid.original.push(tile.rect);
                grid.tiles.push(tile);
                grid.slots.push(slot);
            }
        }
        grid
    }

    /// Number of placed panels.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Current rectangle of the panel at `slot`.
    pub fn rect(&self, slot: usize) -> Option<GridPos> {
        self.slots
            .iter()
            .position(|&s| s == slot)
            .map(|index| self.tiles[index].rect)
    }

    /// Panels whose rectangle differs from what the grid was built with.
    pub fn moved(&self) -> impl Iterator<Item = (usize, GridPos)> + '_ {
        self.tiles
            .iter()
            .zip(&self.original)
            .zip(&self.slots)
            .filter(|((tile, original), _)| tile.rect != **original)
            .map(|((tile, _), &slot)| (slot, tile.rect))
    }

    /// Number of different heights among resizable panels.
    pub fn distinct_heights(&self) -> usize {
        let mut heights: Vec<i64> = self.movable().map(|index| self.tiles[index].rect.h).collect();
        heights.sort_unstable();
        heights.dedup();
        heights.len()
    }

    fn movable(&self) -> impl Iterator<Item = usize> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| tile.movable)
            .map(|(index, _)| index)
    }

    /// Panels sharing some of `index`'s vertical span (touching edges count)
    /// that start further right.
    fn panels_to_right(&self, index: usize) -> Vec<usize> {
        let rect = self.tiles[index].rect;
        self.tiles
            .iter()
            .enumerate()
            .filter(|(other, tile)| {
                *other != index
                    && !(rect.y > tile.rect.bottom() || rect.bottom() < tile.rect.y)
                    && tile.rect.x > rect.x
            })
            .map(|(other, _)| other)
            .collect()
    }

    /// Whether resizing `index` to `resized` while moving `shifted` by
    /// `(dx, dy)` would overlap two panels that were apart, or take a panel
    /// that was on the grid off it.
    fn disturbs(&self, index: usize, resized: GridPos, shifted: &[usize], dx: i64, dy: i64) -> bool {
        let current: Vec<GridPos> = self.tiles.iter().map(|tile| tile.rect).collect();
        let mut proposed = current.clone();
        let mut changed = vec![false; current.len()];
        proposed[index] = resized;
        changed[index] = true;
        for &other in shifted {
            proposed[other].x += dx;
            proposed[other].y += dy;
            changed[other] = true;
        }
        (0..proposed.len()).filter(|&a| changed[a]).any(|a| {
            (off_grid(&proposed[a]) && !off_grid(&current[a]))
                || (0..proposed.len()).any(|b| {
                    b != a && overlaps(&proposed[a], &proposed[b]) && !overlaps(&current[a], &current[b])
                })
        })
    }

    /// Growing must keep the panel and everything pushed along with it
    /// inside the grid, and neither direction may run into a panel that is
    /// not pushed along.
    fn can_add_w(&self, index: usize, delta: i64) -> bool {
        let right = self.panels_to_right(index);
        let fits = delta < 0
            || right
                .iter()
                .chain(std::iter::once(&index))
                .all(|&other| self.tiles[other].rect.right() + delta <= GRID_COLUMNS);
        let mut resized = self.tiles[index].rect;
        resized.w += delta;
        fits && !self.disturbs(index, resized, &right, delta, 0)
    }

    fn add_w(&mut self, index: usize, delta: i64) {
        for other in self.panels_to_right(index) {
            self.tiles[other].rect.x += delta;
        }
        self.tiles[index].rect.w += delta;
    }

    /// Resizes one unit at a time. After each step the panels below move
    /// along, unless one of them already sits flush against the new bottom
    /// edge and the resize alone collides with nothing. When moving the
    /// panels below would collide with a panel beside them, only the resize
    /// is applied; when that collides too the panel stops where it is.
    /// Returns whether anything changed.
    fn add_h(&mut self, index: usize, delta: i64) -> bool {
        let top = self.tiles[index].rect.y;
        let below: Vec<usize> = self
            .tiles
            .iter()
            .enumerate()
            .filter(|(other, tile)| *other != index && tile.rect.y > top)
            .map(|(other, _)| other)
            .collect();
        let step = delta.signum();
        let mut changed = false;
        for _ in 0..delta.abs() {
            let mut resized = self.tiles[index].rect;
            resized.h += step;
            let clear = !self.disturbs(index, resized, &[], 0, 0);
            let flush = below.iter().any(|&other| self.tiles[other].rect.y == resized.bottom());
            if !(flush && clear) && !self.disturbs(index, resized, &below, 0, step) {
                for &other in &below {
                    self.tiles[other].rect.y += step;
                }
            } else if !clear {
                debug!(panel = self.slots[index], "height change blocked");
                break;
            }
            self.tiles[index].rect = resized;
            changed = true;
        }
        changed
    }

    /// Snaps non-canonical widths to the nearest canonical width when the
    /// relative change is within `percent` and the row has room for it.
    /// Returns whether any panel changed.
    pub fn snap_widths(&mut self, percent: u32) -> bool {
        if percent == 0 {
            return false;
        }
        let mut changed = false;
        let candidates: Vec<usize> = self.movable().collect();
        for index in candidates {
            let w = self.tiles[index].rect.w;
            if w <= 0 || CANONICAL_WIDTHS.contains(&w) {
                continue;
            }
            let target_w = nearest_canonical_width(w);
            let delta = target_w - w;
            if within_tolerance(delta, w, percent) && self.can_add_w(index, delta) {
                debug!(panel = self.slots[index], from = w, to = target_w, "snapping panel width");
                self.add_w(index, delta);
                changed = true;
            }
        }
        changed
    }

    /// One height pass: tries `prefer_h` first, then observed heights from
    /// most to least common, and applies the first one that changes
    /// anything. Returns whether any panel changed.
    pub fn snap_heights(&mut self, percent: u32, prefer_h: Option<u32>) -> bool {
        if percent == 0 {
            return false;
        }
        let mut counts: Vec<(i64, usize)> = Vec::new();
        for index in self.movable() {
            let h = self.tiles[index].rect.h;
            match counts.iter_mut().find(|(height, _)| *height == h) {
                Some((_, count)) => *count += 1,
                None => counts.push((h, 1)),
            }
        }
        // Stable, so equally common heights keep first-seen order.
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        let candidates = prefer_h
            .map(i64::from)
            .into_iter()
            .chain(counts.into_iter().map(|(height, _)| height));
        for target_h in candidates {
            if self.try_target_h(target_h, percent) {
                return true;
            }
        }
        false
    }

    fn try_target_h(&mut self, target_h: i64, percent: u32) -> bool {
        if target_h <= 0 || target_h > MAX_GRID_UNITS {
            return false;
        }
        let mut changed = false;
        let candidates: Vec<usize> = self.movable().collect();
        for index in candidates {
            let h = self.tiles[index].rect.h;
            if h == target_h {
                continue;
            }
            let delta = target_h - h;
            if within_tolerance(delta, h, percent) && self.add_h(index, delta) {
                debug!(panel = self.slots[index], from = h, to = target_h, "snapped panel height");
                changed = true;
            }
        }
        changed
    }
}
