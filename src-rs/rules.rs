//! Opinionated, idempotent content fixes.
//!
//! Each fix inspects the fields it cares about and leaves the document
//! alone when the goal is already met or the precondition does not hold.
//! Nothing here can fail: missing or oddly shaped structure just means the
//! fix does not apply.

use serde_json::Value;
use tracing::debug;

use crate::model::{Dashboard, Panel, PanelKind, Target};

/// Below this stacked series are (mostly) see-through.
const MIN_STACKED_FILL_OPACITY: f64 = 20.0;
const STACKED_FILL_OPACITY: i64 = 50;

/// Applies every content fix to the dashboard and its panels.
pub fn fix_dashboard(dashboard: &mut Dashboard<'_>) {
    for mut panel in dashboard.panels_mut() {
        fix_panel(&mut panel);
    }
    fix_graph_tooltip(dashboard);
}

/// Shared crosshair; zero only highlights the hovered graph.
pub fn fix_graph_tooltip(dashboard: &mut Dashboard<'_>) {
    if dashboard.graph_tooltip_enabled() {
        return;
    }
    debug!("enabling shared crosshair");
    dashboard.enable_graph_tooltip();
}

/// Only timeseries panels are opinionated about; rows and every other
/// panel type are left as they are, targets included.
pub fn fix_panel(panel: &mut Panel<'_>) {
    if panel.kind() != PanelKind::Timeseries {
        return;
    }
    fix_timeseries_hover(panel);
    fix_timeseries_min(panel);
    fix_timeseries_stacking_opacity(panel);
    for target in panel.targets_mut().into_iter().flatten() {
        fix_target(target);
    }
}

/// Hover shows every series, largest first. Only a mode other than
/// `multi` triggers the change; an existing `multi` keeps its sort.
pub fn fix_timeseries_hover(panel: &mut Panel<'_>) {
    let title = panel.title().to_string();
    let Some(tooltip) = panel.tooltip_mut() else {
        return;
    };
    if tooltip.get("mode").and_then(Value::as_str) == Some("multi") {
        return;
    }
    debug!(panel = %title, "setting multi tooltip");
    tooltip.insert("mode".to_string(), Value::from("multi"));
    tooltip.insert("sort".to_string(), Value::from("desc"));
}

/// Pins the y axis at zero when no query can plausibly go negative.
///
/// We can only guess for PromQL, so any target with another (or unknown)
/// datasource, or an expression starting with `-`, vetoes the whole panel.
pub fn fix_timeseries_min(panel: &mut Panel<'_>) {
    match panel.field_defaults_mut() {
        Some(defaults) if !defaults.contains_key("min") => {}
        _ => return,
    }
    let vetoed = panel.targets_mut().iter().any(|target| match target {
        Some(target) => !target.is_prometheus() || !target.expr_looks_non_negative(),
        None => true,
    });
    if vetoed {
        return;
    }
    let title = panel.title().to_string();
    if let Some(defaults) = panel.field_defaults_mut() {
        debug!(panel = %title, "setting min to 0");
        defaults.insert("min".to_string(), Value::from(0));
    }
}

/// Stacked series need a visible fill.
pub fn fix_timeseries_stacking_opacity(panel: &mut Panel<'_>) {
    let title = panel.title().to_string();
    let Some(custom) = panel.field_custom_mut() else {
        return;
    };
    let stacking_mode = custom
        .get("stacking")
        .and_then(Value::as_object)
        .and_then(|stacking| stacking.get("mode"))
        .and_then(Value::as_str)
        .unwrap_or("none");
    if stacking_mode == "none" {
        return;
    }
    let opacity = match custom.get("fillOpacity") {
        None => 0.0,
        Some(value) => match value.as_f64() {
            Some(opacity) => opacity,
            None => return,
        },
    };
    if opacity < MIN_STACKED_FILL_OPACITY {
        debug!(panel = %title, stacking_mode, opacity, "raising stacked fill opacity");
        custom.insert("fillOpacity".to_string(), Value::from(STACKED_FILL_OPACITY));
    }
}

/// Instant + range on one Prometheus query duplicates series in most
/// visualizations; treat it as a range query.
pub fn fix_target(mut target: Target<'_>) {
    if !target.is_prometheus() {
        return;
    }
    if target.is_instant() && target.is_range() {
        debug!("dropping instant from instant+range target");
        target.set_instant(false);
    }
}
