//! Codec for the serialized SPEC parameter blob.
//!
//! The blob is a PHP-array-style string:
//!
//! ```text
//! a:<N>:{s:<len>:"<key>";s:<len>:"<value>";...}
//! ```
//!
//! where `<len>` is the UTF-8 byte length of the quoted text. Values must not
//! contain a literal `"`: the grammar has no escape and such values do not
//! survive a decode.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::Serialize;

static PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"s:(\d+):"([^"]*)";s:(\d+):"([^"]*)";"#).expect("pair pattern is valid")
});

static WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^a:(\d+):\{.*\}$").expect("wrapper pattern is valid"));

/// One of the six well-known SPEC parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SpecKey {
    /// Product name.
    Name,
    /// Nominal size.
    Size,
    /// Product type.
    Type,
    /// Filter / classification.
    Filter,
    /// Manufacturer.
    Manufacturer,
    /// Material.
    Material,
}

impl SpecKey {
    /// Emission order of the encoder. Independent of how inputs are supplied.
    pub const ORDER: [Self; 6] = [
        Self::Name,
        Self::Size,
        Self::Type,
        Self::Filter,
        Self::Manufacturer,
        Self::Material,
    ];

    /// The key as it appears inside the blob.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Size => "size",
            Self::Type => "type",
            Self::Filter => "filter",
            Self::Manufacturer => "manufacturer",
            Self::Material => "material",
        }
    }

    /// Matches a blob key against the well-known keys, ignoring case.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ORDER
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six SPEC parameter values mirrored out of the blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpecParameters {
    /// Product name.
    pub name: String,
    /// Nominal size.
    pub size: String,
    /// Product type.
    pub kind: String,
    /// Filter / classification.
    pub filter: String,
    /// Manufacturer.
    pub manufacturer: String,
    /// Material.
    pub material: String,
}

impl SpecParameters {
    /// Returns the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: SpecKey) -> &str {
        match key {
            SpecKey::Name => &self.name,
            SpecKey::Size => &self.size,
            SpecKey::Type => &self.kind,
            SpecKey::Filter => &self.filter,
            SpecKey::Manufacturer => &self.manufacturer,
            SpecKey::Material => &self.material,
        }
    }

    /// Replaces the value stored for `key`.
    pub fn set(&mut self, key: SpecKey, value: String) {
        let slot = match key {
            SpecKey::Name => &mut self.name,
            SpecKey::Size => &mut self.size,
            SpecKey::Type => &mut self.kind,
            SpecKey::Filter => &mut self.filter,
            SpecKey::Manufacturer => &mut self.manufacturer,
            SpecKey::Material => &mut self.material,
        };
        *slot = value;
    }

    /// Whether every parameter is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        SpecKey::ORDER.iter().all(|key| self.get(*key).is_empty())
    }
}

/// Encodes the SPEC parameters into a blob.
///
/// Empty parameters are skipped; when all are empty the result is an empty
/// string rather than `a:0:{}`.
#[must_use]
pub fn encode(parameters: &SpecParameters) -> String {
    encode_pairs(
        SpecKey::ORDER
            .iter()
            .map(|key| (key.as_str(), parameters.get(*key))),
    )
}

/// Encodes arbitrary key/value pairs in the given order, skipping empty values.
#[must_use]
pub fn encode_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let pairs: Vec<_> = pairs
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect();

    if pairs.is_empty() {
        return String::new();
    }

    let mut out = format!("a:{}:{{", pairs.len());
    for (key, value) in pairs {
        push_string(&mut out, key);
        push_string(&mut out, value);
    }
    out.push('}');
    out
}

fn push_string(out: &mut String, text: &str) {
    use std::fmt::Write;

    // `str::len` is the UTF-8 byte count
    let _ = write!(out, "s:{}:\"{text}\";", text.len());
}

/// The result of decoding a blob.
///
/// Entries keep the order in which they were found. Decoding never fails;
/// input that does not match the grammar simply yields no entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedProperties {
    entries: Vec<(String, String)>,
}

impl DecodedProperties {
    /// Number of recovered key/value pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a value by exact key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All recovered pairs, in blob order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The six well-known parameters. Later duplicates win.
    #[must_use]
    pub fn spec_parameters(&self) -> SpecParameters {
        let mut parameters = SpecParameters::default();
        for (key, value) in &self.entries {
            if let Some(key) = SpecKey::from_key(key) {
                parameters.set(key, value.clone());
            }
        }
        parameters
    }

    /// Pairs whose key is not one of the six well-known parameters.
    pub fn unrecognised(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter(|(key, _)| SpecKey::from_key(key).is_none())
    }
}

/// Decodes a blob by scanning for `s:<n>:"key";s:<n>:"value";` pairs anywhere
/// in the text.
#[must_use]
pub fn decode(blob: &str) -> DecodedProperties {
    let entries = PAIR
        .captures_iter(blob)
        .map(|caps| (caps[2].to_string(), caps[4].to_string()))
        .collect();
    DecodedProperties { entries }
}

/// A structural defect in a blob.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatViolation {
    /// The text is not wrapped as `a:<n>:{...}`.
    #[error("properties must have the form a:<n>:{{...}}")]
    WrapperShape,
    /// Opening and closing braces do not pair up.
    #[error("properties braces are unbalanced ({open} opening, {close} closing)")]
    UnbalancedBraces {
        /// Count of `{`.
        open: usize,
        /// Count of `}`.
        close: usize,
    },
    /// The declared entry count does not match what could be recovered.
    #[error("properties declares {declared} entries but {recovered} could be read")]
    CountMismatch {
        /// The `<n>` in `a:<n>:{`.
        declared: usize,
        /// Number of key/value pairs recovered by the decoder.
        recovered: usize,
    },
}

/// Checks the structure of a non-empty blob.
///
/// An empty blob is valid. All violations found are reported.
#[must_use]
pub fn check_structure(blob: &str) -> Vec<FormatViolation> {
    let blob = blob.trim();
    if blob.is_empty() {
        return Vec::new();
    }

    let mut violations = Vec::new();

    let declared = WRAPPER
        .captures(blob)
        .and_then(|caps| caps[1].parse::<usize>().ok());
    if declared.is_none() {
        violations.push(FormatViolation::WrapperShape);
    }

    let open = blob.matches('{').count();
    let close = blob.matches('}').count();
    if open != close {
        violations.push(FormatViolation::UnbalancedBraces { open, close });
    }

    if let Some(declared) = declared {
        let recovered = decode(blob).len();
        if declared != recovered {
            violations.push(FormatViolation::CountMismatch {
                declared,
                recovered,
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SpecParameters {
        SpecParameters {
            name: "Ball valve".to_string(),
            size: "DN50".to_string(),
            kind: "PN16".to_string(),
            filter: "Valves".to_string(),
            manufacturer: "Acme".to_string(),
            material: "Brass".to_string(),
        }
    }

    #[test]
    fn encodes_in_fixed_order() {
        let parameters = SpecParameters {
            material: "Steel".to_string(),
            name: "Pipe".to_string(),
            ..SpecParameters::default()
        };
        assert_eq!(
            encode(&parameters),
            r#"a:2:{s:4:"name";s:4:"Pipe";s:8:"material";s:5:"Steel";}"#
        );
    }

    #[test]
    fn empty_input_encodes_to_empty_string() {
        assert_eq!(encode(&SpecParameters::default()), "");
    }

    #[test]
    fn byte_lengths_count_utf8_bytes() {
        let parameters = SpecParameters {
            material: "é".to_string(),
            ..SpecParameters::default()
        };
        assert_eq!(encode(&parameters), r#"a:1:{s:8:"material";s:2:"é";}"#);
    }

    #[test]
    fn decode_recovers_encoded_parameters() {
        let parameters = sample();
        let decoded = decode(&encode(&parameters));
        assert_eq!(decoded.len(), 6);
        assert_eq!(decoded.spec_parameters(), parameters);
    }

    #[test]
    fn decode_keeps_unrecognised_keys() {
        let decoded = decode(r#"a:2:{s:4:"name";s:1:"x";s:5:"color";s:3:"red";}"#);
        let unknown: Vec<_> = decoded.unrecognised().collect();
        assert_eq!(unknown, vec![("color", "red")]);
        assert_eq!(decoded.spec_parameters().name, "x");
    }

    #[test]
    fn decode_of_garbage_is_empty() {
        assert!(decode("not a blob").is_empty());
        assert!(decode("").is_empty());
    }

    #[test]
    fn decode_matches_keys_case_insensitively() {
        let decoded = decode(r#"a:1:{s:4:"Size";s:4:"DN80";}"#);
        assert_eq!(decoded.spec_parameters().size, "DN80");
    }

    #[test]
    fn embedded_quote_breaks_the_grammar() {
        let parameters = SpecParameters {
            name: r#"12" pipe"#.to_string(),
            ..SpecParameters::default()
        };
        assert_ne!(decode(&encode(&parameters)).spec_parameters(), parameters);
    }

    #[test]
    fn well_formed_blob_has_no_violations() {
        assert!(check_structure(&encode(&sample())).is_empty());
        assert!(check_structure("").is_empty());
    }

    #[test]
    fn detects_wrapper_shape() {
        let violations = check_structure(r#"s:4:"name";s:1:"x";"#);
        assert!(violations.contains(&FormatViolation::WrapperShape));
    }

    #[test]
    fn detects_unbalanced_braces() {
        let violations = check_structure(r#"a:1:{s:4:"name";s:1:"x";}}"#);
        assert_eq!(
            violations,
            vec![FormatViolation::UnbalancedBraces { open: 1, close: 2 }]
        );
    }

    #[test]
    fn detects_count_mismatch() {
        let violations = check_structure(r#"a:3:{s:4:"name";s:1:"x";}"#);
        assert_eq!(
            violations,
            vec![FormatViolation::CountMismatch {
                declared: 3,
                recovered: 1
            }]
        );
    }
}
