use serde::{Deserialize, Serialize};

/// Live value of a parameter.
///
/// `Trigger` is what action parameters hand to their callback; it has no URL
/// form.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
    #[default]
    Trigger,
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Best-effort reading of a raw URL token whose parameter has not been
    /// registered: number, then boolean literal, then the raw text.
    pub fn guess(token: &str) -> Self {
        if let Ok(n) = token.trim().parse::<f64>() {
            if n.is_finite() {
                return ParamValue::Number(n);
            }
        }
        match token {
            "true" => ParamValue::Bool(true),
            "false" => ParamValue::Bool(false),
            _ => ParamValue::Text(token.to_string()),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Trigger => f.write_str("<trigger>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ParamValue;

    #[test]
    fn guess_prefers_numbers_then_booleans() {
        assert_eq!(ParamValue::guess("42"), ParamValue::Number(42.0));
        assert_eq!(ParamValue::guess("-1.5"), ParamValue::Number(-1.5));
        assert_eq!(ParamValue::guess("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::guess("false"), ParamValue::Bool(false));
        assert_eq!(ParamValue::guess("webgpu"), ParamValue::from("webgpu"));
    }

    #[test]
    fn guess_does_not_turn_nan_into_a_number() {
        assert_eq!(ParamValue::guess("NaN"), ParamValue::from("NaN"));
        assert_eq!(ParamValue::guess("inf"), ParamValue::from("inf"));
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![
            ParamValue::Bool(true),
            ParamValue::Number(3.0),
            ParamValue::from("x"),
        ])
        .unwrap();
        assert_eq!(json, r#"[true,3.0,"x"]"#);
    }
}
