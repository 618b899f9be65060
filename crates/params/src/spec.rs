use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::value::ParamValue;

/// Declaration of one harness parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub id: String,
    pub label: String,
    pub domain: Domain,
    #[serde(default)]
    pub default: ParamValue,
}

impl ParamSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        domain: Domain,
        default: impl Into<ParamValue>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            domain,
            default: default.into(),
        }
    }

    pub fn toggle(
        id: impl Into<String>,
        label: impl Into<String>,
        on: &str,
        off: &str,
        default: bool,
    ) -> Self {
        Self::new(id, label, Domain::toggle(on, off), default)
    }

    pub fn range(
        id: impl Into<String>,
        label: impl Into<String>,
        min: f64,
        max: f64,
        step: f64,
        default: f64,
    ) -> Self {
        Self::new(id, label, Domain::range(min, max, step), default)
    }

    pub fn choice(
        id: impl Into<String>,
        label: impl Into<String>,
        options: &[(&str, &str)],
        default: &str,
    ) -> Self {
        Self::new(id, label, Domain::choice(options.iter().copied()), default)
    }

    pub fn action(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, Domain::Action, ParamValue::Trigger)
    }

    pub fn with_default(mut self, default: impl Into<ParamValue>) -> Self {
        self.default = default.into();
        self
    }

    /// The default must be a member of the domain (actions have none).
    pub fn validate(&self) -> Result<(), String> {
        self.domain.validate()?;
        if matches!(self.domain, Domain::Action) || self.domain.contains(&self.default) {
            Ok(())
        } else {
            Err(format!(
                "default {} is outside the domain of {:?}",
                self.default, self.id
            ))
        }
    }
}
