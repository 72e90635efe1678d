//! Bar end time as an indicator, consumed by calendar rules.

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::indicator::Indicator;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug)]
pub struct DateTimeIndicator {
    series: Arc<BarSeries>,
}

impl DateTimeIndicator {
    pub const TYPE_NAME: &'static str = "DateTimeIndicator";

    pub fn new(series: &Arc<BarSeries>) -> Arc<Self> {
        Arc::new(Self {
            series: Arc::clone(series),
        })
    }
}

impl Indicator<DateTime<Utc>> for DateTimeIndicator {
    fn value(&self, index: usize) -> DateTime<Utc> {
        self.series.bar(index).end_time
    }

    fn series(&self) -> &Arc<BarSeries> {
        &self.series
    }

    fn describe(&self) -> Option<ComponentDescriptor> {
        Some(ComponentDescriptor::builder(Self::TYPE_NAME).build())
    }
}
