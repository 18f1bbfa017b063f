//! Normalizes Grafana dashboard JSON: a handful of opinionated panel and
//! query fixes plus an optional grid autolayout that snaps panel sizes to a
//! consistent set.

pub mod layout;
pub mod model;
pub mod normalize;
pub mod rewrite;
pub mod rules;

pub use normalize::{normalize, NormalizeOptions};
pub use rewrite::{canonical_text, render_dashboard, rewrite_dashboard, RewriteOutcome};
