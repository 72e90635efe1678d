//! Engine settings read through [`ConfigPort`].
//!
//! ```ini
//! [engine]
//! num_type = decimal        ; or double
//!
//! [codec]
//! pretty_json = false
//! strict_parameters = false
//! ```
//!
//! Every key is optional. Values that are present but unusable are rejected
//! rather than silently replaced by the default.

use crate::domain::bar::BarSeries;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::error::{CodecError, EngineError};
use crate::domain::num::NumFactory;
use crate::domain::rule_codec::RuleCodec;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub num_factory: NumFactory,
    pub pretty_json: bool,
    pub strict_parameters: bool,
}

impl EngineConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        let num_factory = match config.get_string("engine", "num_type") {
            Some(value) => value.parse::<NumFactory>().map_err(|_| EngineError::ConfigInvalid {
                section: "engine".to_string(),
                key: "num_type".to_string(),
                reason: format!("num_type must be 'double' or 'decimal', got '{}'", value.trim()),
            })?,
            None => NumFactory::default(),
        };
        Ok(Self {
            num_factory,
            pretty_json: read_bool(config, "codec", "pretty_json")?,
            strict_parameters: read_bool(config, "codec", "strict_parameters")?,
        })
    }

    pub fn codec(&self) -> RuleCodec {
        RuleCodec::new(self.strict_parameters)
    }

    /// Empty series using the configured number representation.
    pub fn new_series(&self, name: &str) -> BarSeries {
        BarSeries::new(name, self.num_factory)
    }

    /// Descriptor as JSON text in the configured layout.
    pub fn render(&self, descriptor: &ComponentDescriptor) -> Result<String, CodecError> {
        if self.pretty_json {
            descriptor.to_pretty_json()
        } else {
            descriptor.to_json()
        }
    }
}

/// Missing keys read as `false`; anything other than a recognised boolean is
/// an error so typos never pass as `false`.
fn read_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<bool, EngineError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(false);
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{key} must be a boolean, got '{}'", raw.trim()),
        }),
    }
}
