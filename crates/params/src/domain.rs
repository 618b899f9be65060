use serde::{Deserialize, Serialize};

use crate::value::ParamValue;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Toggle,
    Range,
    Choice,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub token: String,
}

/// Set of values a parameter may take, together with its URL encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    /// Boolean carried by two literal tokens.
    Toggle { on: String, off: String },
    /// Bounded number; tokens are base-10 numbers.
    Range { min: f64, max: f64, step: f64 },
    /// String enum; the value is the option token.
    Choice { options: Vec<ChoiceOption> },
    /// Zero-argument action with no persisted value.
    Action,
}

impl Domain {
    pub fn toggle(on: impl Into<String>, off: impl Into<String>) -> Self {
        Domain::Toggle {
            on: on.into(),
            off: off.into(),
        }
    }

    pub fn range(min: f64, max: f64, step: f64) -> Self {
        Domain::Range { min, max, step }
    }

    pub fn choice<L: Into<String>, T: Into<String>>(options: impl IntoIterator<Item = (L, T)>) -> Self {
        Domain::Choice {
            options: options
                .into_iter()
                .map(|(label, token)| ChoiceOption {
                    label: label.into(),
                    token: token.into(),
                })
                .collect(),
        }
    }

    pub fn kind(&self) -> ParamKind {
        match self {
            Domain::Toggle { .. } => ParamKind::Toggle,
            Domain::Range { .. } => ParamKind::Range,
            Domain::Choice { .. } => ParamKind::Choice,
            Domain::Action => ParamKind::Action,
        }
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Domain::Toggle { .. }, ParamValue::Bool(_)) => true,
            (Domain::Range { min, max, .. }, ParamValue::Number(n)) => {
                n.is_finite() && *n >= *min && *n <= *max
            }
            (Domain::Choice { options }, ParamValue::Text(t)) => {
                options.iter().any(|o| o.token == *t)
            }
            _ => false,
        }
    }

    /// Token for `value`, or `None` when the value is not part of the domain.
    pub fn encode(&self, value: &ParamValue) -> Option<String> {
        if !self.contains(value) {
            return None;
        }
        match (self, value) {
            (Domain::Toggle { on, off }, ParamValue::Bool(b)) => {
                Some(if *b { on.clone() } else { off.clone() })
            }
            (Domain::Range { .. }, ParamValue::Number(n)) => Some(format!("{n}")),
            (Domain::Choice { .. }, ParamValue::Text(t)) => Some(t.clone()),
            _ => None,
        }
    }

    /// Value carried by `token`, or `None` when it is malformed or outside the
    /// domain. Numbers are accepted only in the exact spelling [`encode`]
    /// produces, so every accepted token maps back to itself.
    ///
    /// [`encode`]: Domain::encode
    pub fn decode(&self, token: &str) -> Option<ParamValue> {
        let value = match self {
            Domain::Toggle { on, off } => {
                if token == on {
                    ParamValue::Bool(true)
                } else if token == off {
                    ParamValue::Bool(false)
                } else {
                    return None;
                }
            }
            Domain::Range { .. } => {
                let n = token.parse::<f64>().ok()?;
                if format!("{n}") != token {
                    return None;
                }
                ParamValue::Number(n)
            }
            Domain::Choice { .. } => ParamValue::Text(token.to_string()),
            Domain::Action => return None,
        };
        self.contains(&value).then_some(value)
    }

    /// Checks that the domain itself is usable.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Domain::Toggle { on, off } if on == off => {
                Err(format!("toggle tokens must differ (both {on:?})"))
            }
            Domain::Range { min, max, step } => {
                if !(min.is_finite() && max.is_finite() && step.is_finite()) {
                    Err("range bounds must be finite".to_string())
                } else if min > max {
                    Err(format!("range min {min} exceeds max {max}"))
                } else if *step <= 0.0 {
                    Err(format!("range step must be positive, got {step}"))
                } else {
                    Ok(())
                }
            }
            Domain::Choice { options } => {
                if options.is_empty() {
                    return Err("choice needs at least one option".to_string());
                }
                for (i, o) in options.iter().enumerate() {
                    if options[..i].iter().any(|p| p.token == o.token) {
                        return Err(format!("duplicate choice token {:?}", o.token));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Domain, ParamKind};
    use crate::value::ParamValue;
    use pretty_assertions::assert_eq;

    fn renderer_domain() -> Domain {
        Domain::choice([("Canvas", "canvas"), ("WebGL", "webgl"), ("WebGPU", "webgpu")])
    }

    #[test]
    fn toggle_uses_caller_tokens() {
        let d = Domain::toggle("yes", "no");
        assert_eq!(d.decode("yes"), Some(ParamValue::Bool(true)));
        assert_eq!(d.decode("no"), Some(ParamValue::Bool(false)));
        assert_eq!(d.decode("true"), None);
        assert_eq!(d.encode(&ParamValue::Bool(false)), Some("no".to_string()));
    }

    #[test]
    fn range_rejects_out_of_bounds_and_garbage() {
        let d = Domain::range(1.0, 20000.0, 1.0);
        assert_eq!(d.decode("500"), Some(ParamValue::Number(500.0)));
        assert_eq!(d.decode("20001"), None);
        assert_eq!(d.decode("0"), None);
        assert_eq!(d.decode("abc"), None);
        assert_eq!(d.decode("NaN"), None);
        assert_eq!(d.decode("inf"), None);
    }

    #[test]
    fn range_accepts_only_canonical_spellings() {
        let d = Domain::range(1.0, 20000.0, 1.0);
        for token in ["500.0", "+500", "0500", " 500", "500 ", "5e2", "5E2", "500."] {
            assert_eq!(d.decode(token), None, "{token:?} should not decode");
        }
        assert_eq!(d.decode("0.5"), None);
        assert_eq!(d.decode("2.5"), Some(ParamValue::Number(2.5)));
    }

    #[test]
    fn range_encodes_integers_without_fraction() {
        let d = Domain::range(0.0, 1.0e6, 1.0);
        assert_eq!(d.encode(&ParamValue::Number(750.0)), Some("750".to_string()));
        assert_eq!(d.encode(&ParamValue::Number(0.25)), Some("0.25".to_string()));
        assert_eq!(d.encode(&ParamValue::Number(-1.0)), None);
    }

    #[test]
    fn choice_accepts_tokens_not_labels() {
        let d = renderer_domain();
        assert_eq!(d.decode("webgpu"), Some(ParamValue::from("webgpu")));
        assert_eq!(d.decode("WebGPU"), None);
        assert_eq!(d.encode(&ParamValue::from("svg")), None);
    }

    #[test]
    fn mismatched_value_types_are_outside_the_domain() {
        assert!(!Domain::toggle("1", "0").contains(&ParamValue::Number(1.0)));
        assert!(!Domain::range(0.0, 1.0, 0.1).contains(&ParamValue::Bool(true)));
        assert!(!Domain::Action.contains(&ParamValue::Trigger));
        assert_eq!(Domain::Action.decode(""), None);
    }

    #[test]
    fn kinds() {
        assert_eq!(Domain::Action.kind(), ParamKind::Action);
        assert_eq!(renderer_domain().kind(), ParamKind::Choice);
    }

    #[test]
    fn validate_catches_broken_domains() {
        assert!(Domain::toggle("x", "x").validate().is_err());
        assert!(Domain::range(5.0, 1.0, 1.0).validate().is_err());
        assert!(Domain::range(0.0, 1.0, 0.0).validate().is_err());
        assert!(Domain::choice::<&str, &str>([]).validate().is_err());
        assert!(Domain::choice([("A", "a"), ("B", "a")]).validate().is_err());
        assert!(renderer_domain().validate().is_ok());
    }

    #[test]
    fn domain_json_shape() {
        let d: Domain =
            serde_json::from_str(r#"{"kind":"range","min":1,"max":20000,"step":1}"#).unwrap();
        assert_eq!(d, Domain::range(1.0, 20000.0, 1.0));
        let a: Domain = serde_json::from_str(r#"{"kind":"action"}"#).unwrap();
        assert_eq!(a, Domain::Action);
    }
}
