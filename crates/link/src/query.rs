use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pair {
    key: String,
    value: String,
    /// Segment text as it arrived; `None` once the pair has been rewritten.
    raw: Option<String>,
}

/// Ordered view of a URL query string.
///
/// Pairs keep their original order and, until written through [`set`],
/// their original text, so keys the harness does not own survive a rewrite
/// byte for byte. Values are exposed decoded.
///
/// [`set`]: QueryString::set
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryString {
    pairs: Vec<Pair>,
}

impl QueryString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `?a=1&b=two`, with or without the leading `?`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let pairs = raw
            .split('&')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                let (key, value) = match segment.split_once('=') {
                    Some((k, v)) => (decode(k), decode(v)),
                    None => (decode(segment), String::new()),
                };
                Pair {
                    key,
                    value,
                    raw: Some(segment.to_string()),
                }
            })
            .collect();
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Replaces the first entry for `key` (appending if absent) and drops any
    /// later duplicates of it. Only the written pair is re-encoded.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.pairs.iter().position(|p| p.key == key) {
            Some(idx) => {
                let pair = &mut self.pairs[idx];
                pair.value = value.to_string();
                pair.raw = None;
                let mut seen = 0usize;
                self.pairs.retain(|p| {
                    if p.key != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.pairs.push(Pair {
                key: key.to_string(),
                value: value.to_string(),
                raw: None,
            }),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Keys whose first value differs between `self` and `other`, in the order
    /// they appear in `other`, followed by keys only present in `self`.
    pub fn changed_keys(&self, other: &QueryString) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for key in other.keys().chain(self.keys()) {
            if out.iter().any(|k| k == key) {
                continue;
            }
            if self.get(key) != other.get(key) {
                out.push(key.to_string());
            }
        }
        out
    }
}

impl fmt::Display for QueryString {
    /// Renders `?k=v&..`, or nothing at all for an empty query.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pair) in self.pairs.iter().enumerate() {
            f.write_str(if i == 0 { "?" } else { "&" })?;
            match &pair.raw {
                Some(raw) => f.write_str(raw)?,
                None => {
                    f.write_str(&encode(&pair.key))?;
                    f.write_str("=")?;
                    f.write_str(&encode(&pair.value))?;
                }
            }
        }
        Ok(())
    }
}

fn encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b',' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    // Malformed escapes are kept literally.
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
