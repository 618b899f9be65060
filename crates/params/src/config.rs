use serde::{Deserialize, Serialize};

use crate::spec::ParamSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "config parse error: {msg}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn default_renderer_param() -> String {
    "renderer".to_string()
}

fn default_debug_param() -> String {
    "debug".to_string()
}

fn default_instrument_param() -> String {
    "instrument".to_string()
}

/// Declarative description of a harness panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Parameter driving renderer selection.
    #[serde(default = "default_renderer_param")]
    pub renderer_param: String,
    /// Opt-in flag for forwarding diagnostics to the console.
    #[serde(default = "default_debug_param")]
    pub debug_param: String,
    /// Flag that enables instrumentation (takes effect on reload).
    #[serde(default = "default_instrument_param")]
    pub instrument_param: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            params: vec![
                ParamSpec::choice(
                    "renderer",
                    "Renderer",
                    &[("Canvas", "canvas"), ("WebGL", "webgl"), ("WebGPU", "webgpu")],
                    "canvas",
                ),
                ParamSpec::range("count", "Feature count", 1.0, 20000.0, 1.0, 1000.0),
                ParamSpec::choice(
                    "geometry",
                    "Geometry",
                    &[("Points", "points"), ("Lines", "lines"), ("Polygons", "polygons")],
                    "points",
                ),
                ParamSpec::toggle("animate", "Animate", "true", "false", true),
                ParamSpec::toggle("instrument", "Instrumentation (reloads)", "true", "false", false),
                ParamSpec::toggle("debug", "Debug log", "true", "false", false),
                ParamSpec::action("regenerate", "Regenerate features"),
            ],
            renderer_param: default_renderer_param(),
            debug_param: default_debug_param(),
            instrument_param: default_instrument_param(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, spec) in self.params.iter().enumerate() {
            if spec.id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("parameter #{i} has an empty id")));
            }
            if self.params[..i].iter().any(|p| p.id == spec.id) {
                return Err(ConfigError::Invalid(format!("duplicate parameter {:?}", spec.id)));
            }
            spec.validate()
                .map_err(|e| ConfigError::Invalid(format!("{}: {e}", spec.id)))?;
        }
        Ok(())
    }

    pub fn param(&self, id: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, HarnessConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid_and_round_trips_through_json() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(HarnessConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn built_in_panel_matches_the_browser_panel() {
        let browser = include_str!("../../apps/bench_web/harness.json");
        assert_eq!(HarnessConfig::from_json(browser).unwrap(), HarnessConfig::default());
    }

    #[test]
    fn missing_ids_use_defaults() {
        let config = HarnessConfig::from_json(r#"{"params":[]}"#).unwrap();
        assert_eq!(config.renderer_param, "renderer");
        assert_eq!(config.debug_param, "debug");
        assert_eq!(config.instrument_param, "instrument");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"{"params":[
            {"id":"a","label":"A","domain":{"kind":"action"}},
            {"id":"a","label":"A again","domain":{"kind":"action"}}
        ]}"#;
        assert!(matches!(
            HarnessConfig::from_json(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn bad_default_is_rejected() {
        let raw = r#"{"params":[
            {"id":"count","label":"Count",
             "domain":{"kind":"range","min":1,"max":10,"step":1},"default":"ten"}
        ]}"#;
        assert!(matches!(
            HarnessConfig::from_json(raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn broken_json_is_a_parse_error() {
        assert!(matches!(
            HarnessConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
