use params::ParamValue;
use serde::Serialize;

/// Rendering backend family.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum RendererMode {
    #[default]
    #[serde(rename = "canvas")]
    Canvas,
    #[serde(rename = "webgl")]
    WebGl,
    #[serde(rename = "webgpu")]
    WebGpu,
}

impl RendererMode {
    pub const ALL: [RendererMode; 3] = [RendererMode::Canvas, RendererMode::WebGl, RendererMode::WebGpu];

    pub fn token(self) -> &'static str {
        match self {
            RendererMode::Canvas => "canvas",
            RendererMode::WebGl => "webgl",
            RendererMode::WebGpu => "webgpu",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.token() == token)
    }

    /// Requested mode carried by a parameter value; anything unset or
    /// unrecognized means canvas.
    pub fn from_value(value: Option<&ParamValue>) -> Self {
        value
            .and_then(ParamValue::as_str)
            .and_then(Self::from_token)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for RendererMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorState {
    /// Nothing evaluated yet.
    #[default]
    Idle,
    Canvas,
    #[serde(rename = "webgl")]
    WebGl,
    #[serde(rename = "webgpu-pending")]
    WebGpuPending,
    #[serde(rename = "webgpu-active")]
    WebGpuActive,
    #[serde(rename = "webgl-fallback")]
    WebGlFallback,
}

impl SelectorState {
    /// Mode whose layer is attached in this state.
    pub fn active_mode(self) -> Option<RendererMode> {
        match self {
            SelectorState::Canvas => Some(RendererMode::Canvas),
            SelectorState::WebGl | SelectorState::WebGlFallback => Some(RendererMode::WebGl),
            SelectorState::WebGpuActive => Some(RendererMode::WebGpu),
            SelectorState::Idle | SelectorState::WebGpuPending => None,
        }
    }

    pub fn is_fallback(self) -> bool {
        self == SelectorState::WebGlFallback
    }
}

#[cfg(test)]
mod tests {
    use super::{RendererMode, SelectorState};
    use params::ParamValue;

    #[test]
    fn tokens_round_trip() {
        for mode in RendererMode::ALL {
            assert_eq!(RendererMode::from_token(mode.token()), Some(mode));
        }
        assert_eq!(RendererMode::from_token("svg"), None);
    }

    #[test]
    fn unset_or_unknown_value_means_canvas() {
        assert_eq!(RendererMode::from_value(None), RendererMode::Canvas);
        assert_eq!(
            RendererMode::from_value(Some(&ParamValue::Number(1.0))),
            RendererMode::Canvas
        );
        assert_eq!(
            RendererMode::from_value(Some(&ParamValue::from("webgpu"))),
            RendererMode::WebGpu
        );
    }

    #[test]
    fn pending_has_no_active_mode() {
        assert_eq!(SelectorState::WebGpuPending.active_mode(), None);
        assert_eq!(
            SelectorState::WebGlFallback.active_mode(),
            Some(RendererMode::WebGl)
        );
        assert!(SelectorState::WebGlFallback.is_fallback());
    }
}
