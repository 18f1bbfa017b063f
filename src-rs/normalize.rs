//! One normalization run over a parsed dashboard: the content fixes first,
//! then the autolayout until neither layout pass changes anything.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::layout::{Grid, Tile};
use crate::model::{Dashboard, PanelKind};
use crate::rules;

/// Knobs for one normalization run. The default runs the content fixes
/// only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Allowed relative width change in percent; `None`/0 skips the width pass.
    pub autolayout_percent_x: Option<u32>,
    /// Allowed relative height change in percent; `None`/0 skips the height pass.
    pub autolayout_percent_y: Option<u32>,
    /// Height to try before the most common ones.
    pub autolayout_prefer_h: Option<u32>,
    /// Skip every fix; the caller only re-serializes.
    pub indent_only: bool,
}

/// Applies the content fixes and the autolayout to `document` in place.
/// Returns whether anything changed.
pub fn normalize(document: &mut Value, options: &NormalizeOptions) -> bool {
    if options.indent_only {
        return false;
    }
    let before = document.clone();
    if let Some(mut dashboard) = Dashboard::new(document) {
        rules::fix_dashboard(&mut dashboard);
        autolayout(&mut dashboard, options);
    }
    *document != before
}

fn autolayout(dashboard: &mut Dashboard<'_>, options: &NormalizeOptions) {
    let percent_x = options.autolayout_percent_x.filter(|p| *p > 0);
    let percent_y = options.autolayout_percent_y.filter(|p| *p > 0);
    if percent_x.is_none() && percent_y.is_none() {
        return;
    }

    let mut grid = Grid::new(dashboard.panels_mut().map(|panel| {
        panel.grid_pos().map(|rect| Tile {
            rect,
            movable: panel.kind() != PanelKind::Row,
        })
    }));
    // A height change can free room a width snap was refused for, so the
    // passes alternate until a round changes nothing. Every productive width
    // round snaps a panel for good and heights settle in the first round,
    // which bounds the rounds by the panel count.
    let limit = grid.len() + 2;
    let mut rounds = 0;
    loop {
        let widths = percent_x.is_some_and(|percent| grid.snap_widths(percent));
        let heights = percent_y
            .is_some_and(|percent| settle_heights(&mut grid, percent, options.autolayout_prefer_h) > 0);
        if !widths && !heights {
            break;
        }
        rounds += 1;
        if rounds >= limit {
            warn!(rounds, "autolayout did not settle");
            break;
        }
    }

    let moved: Vec<_> = grid.moved().collect();
    if moved.is_empty() {
        return;
    }
    let mut moved = moved.into_iter().peekable();
    for (slot, mut panel) in dashboard.panels_mut().enumerate() {
        if let Some((_, rect)) = moved.next_if(|(moved_slot, _)| *moved_slot == slot) {
            panel.set_grid_pos(rect);
        }
    }
}

/// Reruns the height pass until it stops changing anything.
///
/// Each productive pass folds at least one whole height class into another
/// observed height (the preferred height may add one class, once), so the
/// number of distinct heights plus two bounds the loop. Returns the number
/// of productive passes.
pub fn settle_heights(grid: &mut Grid, percent: u32, prefer_h: Option<u32>) -> usize {
    let limit = grid.distinct_heights() + 2;
    let mut passes = 0;
    while grid.snap_heights(percent, prefer_h) {
        passes += 1;
        if passes >= limit {
            warn!(passes, "height autolayout did not settle");
            break;
        }
    }
    info!(passes, "height autolayout settled");
    passes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GridPos, GRID_COLUMNS};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    fn layout_options(x: u32, y: u32) -> NormalizeOptions {
        NormalizeOptions {
            autolayout_percent_x: Some(x),
            autolayout_percent_y: Some(y),
            ..NormalizeOptions::default()
        }
    }

    fn normalized(mut document: Value, options: &NormalizeOptions) -> Value {
        normalize(&mut document, options);
        document
    }

    fn sample_dashboard() -> Value {
        json!({
            "title": "Node",
            "panels": [
                {"type": "row", "title": "CPU", "gridPos": {"x": 0, "y": 0, "w": 24, "h": 1}},
                {
                    "type": "timeseries",
                    "title": "load",
                    "gridPos": {"x": 0, "y": 1, "w": 13, "h": 7},
                    "fieldConfig": {"defaults": {}, "custom": {"stacking": {"mode": "normal"}}},
                    "targets": [{"datasource": {"type": "prometheus"}, "expr": "node_load1", "instant": true, "range": true}]
                },
                {"type": "stat", "title": "up", "gridPos": {"x": 13, "y": 1, "w": 11, "h": 8}},
                {"type": "row", "title": "Disk", "gridPos": {"x": 0, "y": 9, "w": 24, "h": 1}},
                {"type": "timeseries", "title": "io", "gridPos": {"x": 0, "y": 10, "w": 23, "h": 8}},
                {"type": "text", "title": "notes"}
            ]
        })
    }

    #[test]
    fn reports_change_and_no_change() {
        let mut document = json!({"graphTooltip": 0});
        assert!(normalize(&mut document, &NormalizeOptions::default()));
        assert_eq!(document, json!({"graphTooltip": 1}));
        assert!(!normalize(&mut document, &NormalizeOptions::default()));
    }

    #[test]
    fn indent_only_skips_all_fixes() {
        let mut document = json!({"graphTooltip": 0, "panels": [{"type": "timeseries"}]});
        let options = NormalizeOptions {
            indent_only: true,
            ..layout_options(20, 20)
        };
        assert!(!normalize(&mut document, &options));
        assert_eq!(document, json!({"graphTooltip": 0, "panels": [{"type": "timeseries"}]}));
    }

    #[test]
    fn non_mapping_document_is_left_alone() {
        let mut document = json!([1, 2, 3]);
        assert!(!normalize(&mut document, &layout_options(20, 20)));
    }

    #[test]
    fn full_run_fixes_content_and_layout() {
        let out = normalized(sample_dashboard(), &layout_options(20, 20));
        assert_eq!(out["graphTooltip"], json!(1));
        let load = &out["panels"][1];
        assert_eq!(load["options"]["tooltip"], json!({"mode": "multi", "sort": "desc"}));
        assert_eq!(load["fieldConfig"]["defaults"]["min"], json!(0));
        assert_eq!(load["fieldConfig"]["custom"]["fillOpacity"], json!(50));
        assert_eq!(load["targets"][0]["instant"], json!(false));
        assert_eq!(load["gridPos"], json!({"x": 0, "y": 1, "w": 12, "h": 8}));
        // Shifted left by the shrink next to it, then grown back to 12.
        assert_eq!(out["panels"][2]["gridPos"], json!({"x": 12, "y": 1, "w": 12, "h": 8}));
        // Grew into the gap above the row, so nothing below moved.
        assert_eq!(out["panels"][3]["gridPos"], json!({"x": 0, "y": 9, "w": 24, "h": 1}));
        assert_eq!(out["panels"][4]["gridPos"], json!({"x": 0, "y": 10, "w": 24, "h": 8}));
    }

    #[test]
    fn layout_keeps_panels_on_grid_and_leaves_unplaced_panels() {
        let out = normalized(sample_dashboard(), &layout_options(20, 20));
        for panel in out["panels"].as_array().unwrap() {
            if let Some(rect) = GridPos::from_value(&panel["gridPos"]) {
                assert!(rect.right() <= 24, "{panel}");
            }
        }
        assert!(out["panels"][5].get("gridPos").is_none());
    }

    #[test]
    fn normalization_is_idempotent() {
        for options in [
            NormalizeOptions::default(),
            layout_options(20, 0),
            layout_options(0, 30),
            layout_options(25, 25),
            NormalizeOptions {
                autolayout_prefer_h: Some(9),
                ..layout_options(20, 20)
            },
        ] {
            let once = normalized(sample_dashboard(), &options);
            let twice = normalized(once.clone(), &options);
            assert_eq!(once, twice, "{options:?}");
        }
    }

    #[test]
    fn width_snap_freed_by_height_change_is_applied_in_the_same_run() {
        let document = json!({"panels": [
            {"type": "stat", "gridPos": {"x": 2, "y": 0, "w": 11, "h": 8}},
            {"type": "stat", "gridPos": {"x": 13, "y": 0, "w": 8, "h": 6}},
            {"type": "stat", "gridPos": {"x": 13, "y": 8, "w": 11, "h": 8}}
        ]});
        let options = layout_options(40, 40);
        let once = normalized(document, &options);
        let positions: Vec<&Value> = once["panels"]
            .as_array()
            .unwrap()
            .iter()
            .map(|panel| &panel["gridPos"])
            .collect();
        assert_eq!(
            positions,
            vec![
                &json!({"x": 2, "y": 0, "w": 12, "h": 8}),
                &json!({"x": 14, "y": 0, "w": 8, "h": 8}),
                &json!({"x": 13, "y": 10, "w": 11, "h": 8}),
            ]
        );
        let mut twice = once.clone();
        assert!(!normalize(&mut twice, &options));
        assert_eq!(twice, once);
    }

    #[test]
    fn absurd_geometry_is_left_alone() {
        let document = json!({"panels": [
            {"type": "stat", "gridPos": {"x": 0, "y": 0, "w": 4611686018427387904_i64, "h": 8}},
            {"type": "stat", "gridPos": {"x": 0, "y": 8, "w": 13, "h": 9223372036854775807_i64}},
            {"type": "stat", "gridPos": {"x": 0, "y": 20, "w": 13, "h": 8}}
        ]});
        let out = normalized(
            document.clone(),
            &NormalizeOptions {
                autolayout_prefer_h: Some(u32::MAX),
                ..layout_options(20, 20)
            },
        );
        assert_eq!(out["panels"][0]["gridPos"], document["panels"][0]["gridPos"]);
        assert_eq!(out["panels"][1]["gridPos"], document["panels"][1]["gridPos"]);
        assert_eq!(out["panels"][2]["gridPos"], json!({"x": 0, "y": 20, "w": 12, "h": 8}));
    }

    /// Bands of side-by-side columns, each column one or two panels tall,
    /// optionally headed by a row. Widths and heights are slightly off the
    /// canonical values so both passes have work to do.
    fn generated_dashboard(seed: u64) -> Value {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut panels = Vec::new();
        let mut y = 0;
        for _ in 0..rng.gen_range(1..=4) {
            if rng.gen_bool(0.5) {
                panels.push(json!({"type": "row", "gridPos": {"x": 0, "y": y, "w": GRID_COLUMNS, "h": 1}}));
                y += 1;
            }
            let columns: i64 = rng.gen_range(1..=4);
            let mut x = 0;
            let mut band = 0;
            let slot = GRID_COLUMNS / columns;
            for _ in 0..columns {
                let w = slot - rng.gen_range(0..=2);
                let mut bottom = y;
                for _ in 0..rng.gen_range(1..=2) {
                    let h: i64 = rng.gen_range(4..=12);
                    let kind = if rng.gen_bool(0.7) { "timeseries" } else { "stat" };
                    panels.push(json!({"type": kind, "gridPos": {"x": x, "y": bottom, "w": w, "h": h}}));
                    bottom += h;
                }
                band = band.max(bottom - y);
                x += if rng.gen_bool(0.5) { slot } else { w };
            }
            y += band;
        }
        json!({"panels": panels})
    }

    fn placed(document: &Value) -> Vec<GridPos> {
        document["panels"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|panel| GridPos::from_value(&panel["gridPos"]))
            .collect()
    }

    #[test]
    fn generated_layouts_stay_on_grid_apart_and_stable() {
        let option_sets = [
            layout_options(20, 20),
            layout_options(40, 40),
            layout_options(25, 0),
            NormalizeOptions {
                autolayout_prefer_h: Some(8),
                ..layout_options(0, 30)
            },
            NormalizeOptions {
                autolayout_prefer_h: Some(6),
                ..layout_options(50, 50)
            },
        ];
        for seed in 0..40 {
            let document = generated_dashboard(seed);
            for options in &option_sets {
                let once = normalized(document.clone(), options);
                let rects = placed(&once);
                assert_eq!(rects.len(), placed(&document).len());
                for (a, first) in rects.iter().enumerate() {
                    assert!(first.x >= 0 && first.y >= 0 && first.right() <= GRID_COLUMNS, "seed {seed}: {first:?}");
                    for second in &rects[a + 1..] {
                        let apart = first.right() <= second.x
                            || second.right() <= first.x
                            || first.bottom() <= second.y
                            || second.bottom() <= first.y;
                        assert!(apart, "seed {seed} {options:?}: {first:?} overlaps {second:?}");
                    }
                }
                let twice = normalized(once.clone(), options);
                assert_eq!(once, twice, "seed {seed} {options:?}");
            }
        }
    }

    #[test]
    fn height_pass_reaches_fixed_point() {
        let mut grid = Grid::new(vec![
            Some(Tile { rect: GridPos::new(0, 0, 12, 10), movable: true }),
            Some(Tile { rect: GridPos::new(12, 0, 12, 10), movable: true }),
            Some(Tile { rect: GridPos::new(0, 10, 12, 13), movable: true }),
            Some(Tile { rect: GridPos::new(12, 10, 12, 8), movable: true }),
        ]);
        let passes = settle_heights(&mut grid, 25, None);
        assert!(passes >= 1);
        assert!(!grid.snap_heights(25, None));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: NormalizeOptions =
            serde_json::from_value(json!({"autolayout_percent_y": 15})).unwrap();
        assert_eq!(
            options,
            NormalizeOptions {
                autolayout_percent_y: Some(15),
                ..NormalizeOptions::default()
            }
        );
    }
}
