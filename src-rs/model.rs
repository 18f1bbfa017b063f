//! Guarded views over a parsed dashboard document.
//!
//! The document stays an owned `serde_json::Value` so that unknown fields
//! survive a rewrite untouched. `Dashboard`, `Panel` and `Target` borrow a
//! mapping out of that tree and expose only the fields the rules and the
//! autolayout care about. Every accessor distinguishes "key absent" from
//! "key present with an unexpected shape" and returns `None` for both
//! rather than failing.

use serde_json::{Map, Value};

/// Grafana lays panels out on a grid this many columns wide.
pub const GRID_COLUMNS: i64 = 24;

/// Largest coordinate or size read from a `gridPos`. Anything beyond it (or
/// negative) is not a real layout and leaves the panel out of autolayout.
pub const MAX_GRID_UNITS: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    Row,
    Timeseries,
    Other,
}

impl PanelKind {
    fn from_type(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("row") => PanelKind::Row,
            Some("timeseries") => PanelKind::Timeseries,
            _ => PanelKind::Other,
        }
    }
}

/// A panel rectangle in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridPos {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl GridPos {
    pub fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.h
    }

    /// Reads `{x, y, w, h}`; all four must be integers in
    /// `0..=MAX_GRID_UNITS`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let field = |key: &str| {
            map.get(key)
                .and_then(Value::as_i64)
                .filter(|v| (0..=MAX_GRID_UNITS).contains(v))
        };
        Some(Self {
            x: field("x")?,
            y: field("y")?,
            w: field("w")?,
            h: field("h")?,
        })
    }

    fn write_into(&self, map: &mut Map<String, Value>) {
        for (key, value) in [("x", self.x), ("y", self.y), ("w", self.w), ("h", self.h)] {
            if map.get(key).and_then(Value::as_i64) != Some(value) {
                map.insert(key.to_string(), Value::from(value));
            }
        }
    }
}

/// JSON truthiness: null, false, 0, "" and empty containers are falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(v)) => *v,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Returns the mapping under `key`, inserting an empty one when the key is
/// absent. A key holding anything other than a mapping yields `None`.
fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    map.entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

fn object_at<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Map<String, Value>> {
    map.get_mut(key).and_then(Value::as_object_mut)
}

/// The root mapping of one dashboard.
#[derive(Debug)]
pub struct Dashboard<'a> {
    map: &'a mut Map<String, Value>,
}

impl<'a> Dashboard<'a> {
    /// `None` when the document's top level is not a mapping.
    pub fn new(document: &'a mut Value) -> Option<Self> {
        document.as_object_mut().map(|map| Self { map })
    }

    pub fn graph_tooltip_enabled(&self) -> bool {
        is_truthy(self.map.get("graphTooltip"))
    }

    pub fn enable_graph_tooltip(&mut self) {
        self.map.insert("graphTooltip".to_string(), Value::from(1));
    }

    /// Panels in document order. Entries that are not mappings are skipped,
    /// so every caller walking this iterator sees the same sequence.
    pub fn panels_mut(&mut self) -> impl Iterator<Item = Panel<'_>> {
        self.map
            .get_mut("panels")
            .and_then(Value::as_array_mut)
            .into_iter()
            .flatten()
            .filter_map(Panel::new)
    }
}

/// One visualization unit on the dashboard grid.
#[derive(Debug)]
pub struct Panel<'a> {
    map: &'a mut Map<String, Value>,
}

impl<'a> Panel<'a> {
    pub fn new(value: &'a mut Value) -> Option<Self> {
        value.as_object_mut().map(|map| Self { map })
    }

    pub fn kind(&self) -> PanelKind {
        PanelKind::from_type(self.map.get("type"))
    }

    pub fn title(&self) -> &str {
        self.map.get("title").and_then(Value::as_str).unwrap_or("")
    }

    pub fn grid_pos(&self) -> Option<GridPos> {
        self.map.get("gridPos").and_then(GridPos::from_value)
    }

    /// Writes the rectangle back, touching only coordinates that differ.
    pub fn set_grid_pos(&mut self, rect: GridPos) {
        if let Some(map) = object_entry(self.map, "gridPos") {
            rect.write_into(map);
        }
    }

    /// `options.tooltip`, creating `options` and `tooltip` when absent.
    pub fn tooltip_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let options = object_entry(self.map, "options")?;
        object_entry(options, "tooltip")
    }

    /// `fieldConfig.defaults`; never created.
    pub fn field_defaults_mut(&mut self) -> Option<&mut Map<String, Value>> {
        object_at(object_at(self.map, "fieldConfig")?, "defaults")
    }

    /// `fieldConfig.custom`; never created.
    pub fn field_custom_mut(&mut self) -> Option<&mut Map<String, Value>> {
        object_at(object_at(self.map, "fieldConfig")?, "custom")
    }

    /// Targets in order. `None` stands for an entry that is not a mapping;
    /// a `targets` value that is not an array yields a single `None`.
    pub fn targets_mut(&mut self) -> Vec<Option<Target<'_>>> {
        match self.map.get_mut("targets") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter_mut().map(Target::new).collect(),
            Some(_) => vec![None],
        }
    }
}

/// One query feeding a panel.
#[derive(Debug)]
pub struct Target<'a> {
    map: &'a mut Map<String, Value>,
}

impl<'a> Target<'a> {
    pub fn new(value: &'a mut Value) -> Option<Self> {
        value.as_object_mut().map(|map| Self { map })
    }

    pub fn datasource_type(&self) -> Option<&str> {
        self.map
            .get("datasource")
            .and_then(Value::as_object)
            .and_then(|datasource| datasource.get("type"))
            .and_then(Value::as_str)
    }

    pub fn is_prometheus(&self) -> bool {
        self.datasource_type() == Some("prometheus")
    }

    /// True unless `expr` starts with `-` or is not a string at all.
    pub fn expr_looks_non_negative(&self) -> bool {
        match self.map.get("expr") {
            None => true,
            Some(Value::String(expr)) => !expr.starts_with('-'),
            Some(_) => false,
        }
    }

    pub fn is_instant(&self) -> bool {
        is_truthy(self.map.get("instant"))
    }

    pub fn is_range(&self) -> bool {
        is_truthy(self.map.get("range"))
    }

    pub fn set_instant(&mut self, instant: bool) {
        self.map.insert("instant".to_string(), Value::Bool(instant));
    }
}
