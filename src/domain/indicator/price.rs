//! Primitive indicators reading bar fields, plus a constant.

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::indicator::{Indicator, IndicatorRef};
use crate::domain::num::Num;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub const ALL: [PriceField; 5] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            PriceField::Open => "OpenPriceIndicator",
            PriceField::High => "HighPriceIndicator",
            PriceField::Low => "LowPriceIndicator",
            PriceField::Close => "ClosePriceIndicator",
            PriceField::Volume => "VolumeIndicator",
        }
    }

    pub fn from_type_name(name: &str) -> Option<PriceField> {
        Self::ALL.into_iter().find(|f| f.type_name() == name)
    }
}

#[derive(Debug)]
pub struct PriceIndicator {
    series: Arc<BarSeries>,
    field: PriceField,
}

impl PriceIndicator {
    pub fn new(series: &Arc<BarSeries>, field: PriceField) -> Self {
        Self {
            series: Arc::clone(series),
            field,
        }
    }

    pub fn close(series: &Arc<BarSeries>) -> IndicatorRef {
        Arc::new(Self::new(series, PriceField::Close))
    }

    pub fn field(&self) -> PriceField {
        self.field
    }
}

impl Indicator for PriceIndicator {
    fn value(&self, index: usize) -> Num {
        let bar = self.series.bar(index);
        match self.field {
            PriceField::Open => bar.open,
            PriceField::High => bar.high,
            PriceField::Low => bar.low,
            PriceField::Close => bar.close,
            PriceField::Volume => bar.volume,
        }
    }

    fn series(&self) -> &Arc<BarSeries> {
        &self.series
    }

    fn describe(&self) -> Option<ComponentDescriptor> {
        Some(ComponentDescriptor::builder(self.field.type_name()).build())
    }
}

/// The same value at every index.
#[derive(Debug)]
pub struct ConstantIndicator {
    series: Arc<BarSeries>,
    value: Num,
}

impl ConstantIndicator {
    pub fn new(series: &Arc<BarSeries>, value: Num) -> Self {
        Self {
            series: Arc::clone(series),
            value: series.factory().convert(value),
        }
    }

    pub fn of(series: &Arc<BarSeries>, value: f64) -> IndicatorRef {
        Arc::new(Self::new(series, series.factory().num_of(value)))
    }
}

impl Indicator for ConstantIndicator {
    fn value(&self, index: usize) -> Num {
        self.series.check_index(index);
        self.value
    }

    fn series(&self) -> &Arc<BarSeries> {
        &self.series
    }

    fn describe(&self) -> Option<ComponentDescriptor> {
        Some(
            ComponentDescriptor::builder("ConstantIndicator")
                .param("value", self.value)
                .build(),
        )
    }
}
