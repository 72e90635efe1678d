//! Indicators: pure functions from a series index to a value.
//!
//! Primitive indicators read bar data directly. Derived indicators compose
//! other indicators and memoize through [`cache::CachedValues`], so each index
//! is calculated at most once per instance.
//!
//! Every indicator bounds-checks its index against the series and panics on
//! out-of-range access.

pub mod atr;
pub mod cache;
pub mod datetime;
pub mod ema;
pub mod price;
pub mod registry;
pub mod sma;
pub mod stddev;

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::num::Num;
use std::fmt;
use std::sync::Arc;

pub use atr::{AtrIndicator, TrueRangeIndicator};
pub use cache::CachedValues;
pub use datetime::DateTimeIndicator;
pub use ema::EmaIndicator;
pub use price::{ConstantIndicator, PriceField, PriceIndicator};
pub use registry::indicator_from_descriptor;
pub use sma::SmaIndicator;
pub use stddev::StdDevIndicator;

pub trait Indicator<T = Num>: Send + Sync + fmt::Debug {
    /// Value at `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is outside the series.
    fn value(&self, index: usize) -> T;

    fn series(&self) -> &Arc<BarSeries>;

    /// Portable description, or `None` when this indicator has no descriptor form.
    fn describe(&self) -> Option<ComponentDescriptor> {
        None
    }
}

/// Shared handle to a numeric indicator.
pub type IndicatorRef = Arc<dyn Indicator>;

/// Builds the descriptor of a derived indicator with one `barCount` parameter
/// and its source as the only component.
pub(crate) fn describe_windowed(
    type_name: &str,
    bar_count: usize,
    source: Option<&IndicatorRef>,
) -> Option<ComponentDescriptor> {
    let builder = ComponentDescriptor::builder(type_name).param("barCount", bar_count);
    match source {
        Some(source) => Some(builder.component(source.describe()?).build()),
        None => Some(builder.build()),
    }
}
