//! Rebuilds indicators from their descriptors.

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::error::CodecError;
use crate::domain::indicator::{
    AtrIndicator, ConstantIndicator, DateTimeIndicator, EmaIndicator, IndicatorRef, PriceField,
    PriceIndicator, SmaIndicator, StdDevIndicator, TrueRangeIndicator,
};
use std::sync::Arc;

pub fn indicator_from_descriptor(
    series: &Arc<BarSeries>,
    descriptor: &ComponentDescriptor,
) -> Result<IndicatorRef, CodecError> {
    let name = descriptor.type_name.as_str();
    if name.trim().is_empty() {
        return Err(CodecError::MissingType);
    }
    if let Some(field) = PriceField::from_type_name(name) {
        return Ok(Arc::new(PriceIndicator::new(series, field)));
    }
    let indicator: IndicatorRef = match name {
        "ConstantIndicator" => {
            let value = descriptor.num_param("value", series.factory())?;
            Arc::new(ConstantIndicator::new(series, value))
        }
        "TrueRangeIndicator" => Arc::new(TrueRangeIndicator::new(series)),
        "ATRIndicator" => Arc::new(AtrIndicator::new(series, descriptor.usize_param("barCount")?)?),
        "SMAIndicator" => {
            let (source, bar_count) = windowed(series, descriptor)?;
            Arc::new(SmaIndicator::new(source, bar_count)?)
        }
        "EMAIndicator" => {
            let (source, bar_count) = windowed(series, descriptor)?;
            Arc::new(EmaIndicator::new(source, bar_count)?)
        }
        "StandardDeviationIndicator" => {
            let (source, bar_count) = windowed(series, descriptor)?;
            Arc::new(StdDevIndicator::new(source, bar_count)?)
        }
        other => return Err(CodecError::UnknownType(other.to_string())),
    };
    Ok(indicator)
}

/// The time source of calendar rules.
pub fn datetime_from_descriptor(
    series: &Arc<BarSeries>,
    descriptor: &ComponentDescriptor,
) -> Result<Arc<DateTimeIndicator>, CodecError> {
    if descriptor.type_name != DateTimeIndicator::TYPE_NAME {
        return Err(descriptor.malformed(format!(
            "expected {}, found {}",
            DateTimeIndicator::TYPE_NAME,
            descriptor.type_name
        )));
    }
    Ok(DateTimeIndicator::new(series))
}

fn windowed(
    series: &Arc<BarSeries>,
    descriptor: &ComponentDescriptor,
) -> Result<(IndicatorRef, usize), CodecError> {
    let bar_count = descriptor.usize_param("barCount")?;
    let source = match descriptor.components.as_slice() {
        [source] => indicator_from_descriptor(series, source)?,
        other => {
            return Err(descriptor.malformed(format!(
                "expected 1 source component, found {}",
                other.len()
            )));
        }
    };
    Ok((source, bar_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::Param;
    use crate::domain::num::NumFactory;

    fn series() -> Arc<BarSeries> {
        Arc::new(BarSeries::new("registry", NumFactory::Decimal))
    }

    fn round_trip(d: &ComponentDescriptor) -> ComponentDescriptor {
        indicator_from_descriptor(&series(), d)
            .unwrap()
            .describe()
            .unwrap()
    }

    #[test]
    fn rebuilds_nested_indicators() {
        let d = ComponentDescriptor::builder("EMAIndicator")
            .param("barCount", 5usize)
            .component(
                ComponentDescriptor::builder("SMAIndicator")
                    .param("barCount", 3usize)
                    .component(ComponentDescriptor::builder("HighPriceIndicator").build())
                    .build(),
            )
            .build();
        assert_eq!(round_trip(&d), d);
    }

    #[test]
    fn constant_value_is_canonicalised() {
        let d = ComponentDescriptor::builder("ConstantIndicator")
            .param("value", "7.50")
            .build();
        let rebuilt = round_trip(&d);
        assert_eq!(rebuilt.param("value"), Some(&Param::Text("7.5".into())));
        assert!(rebuilt.structurally_eq(&d));
    }

    #[test]
    fn unknown_type_is_reported() {
        let d = ComponentDescriptor::builder("RSIIndicator").build();
        assert!(matches!(
            indicator_from_descriptor(&series(), &d).unwrap_err(),
            CodecError::UnknownType(name) if name == "RSIIndicator"
        ));
    }

    #[test]
    fn missing_source_is_malformed() {
        let d = ComponentDescriptor::builder("SMAIndicator")
            .param("barCount", 3usize)
            .build();
        assert!(matches!(
            indicator_from_descriptor(&series(), &d).unwrap_err(),
            CodecError::Malformed { .. }
        ));
    }

    #[test]
    fn zero_bar_count_is_invalid() {
        let d = ComponentDescriptor::builder("ATRIndicator")
            .param("barCount", 0usize)
            .build();
        assert!(matches!(
            indicator_from_descriptor(&series(), &d).unwrap_err(),
            CodecError::InvalidRule(_)
        ));
    }

    #[test]
    fn datetime_requires_its_own_type() {
        let ok = ComponentDescriptor::builder("DateTimeIndicator").build();
        assert!(datetime_from_descriptor(&series(), &ok).is_ok());
        let wrong = ComponentDescriptor::builder("ClosePriceIndicator").build();
        assert!(datetime_from_descriptor(&series(), &wrong).is_err());
    }
}
