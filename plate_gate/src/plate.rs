use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical form of a recognised plate: uppercase letters and digits only.
/// The empty value means "no plate".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct NormalizedPlate(String);

impl NormalizedPlate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }
}

impl From<String> for NormalizedPlate {
    fn from(text: String) -> Self {
        normalize(&text)
    }
}

impl From<&str> for NormalizedPlate {
    fn from(text: &str) -> Self {
        normalize(text)
    }
}

impl From<NormalizedPlate> for String {
    fn from(plate: NormalizedPlate) -> Self {
        plate.0
    }
}

impl fmt::Display for NormalizedPlate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uppercases and drops everything that is not a letter or digit.
pub fn normalize(text: &str) -> NormalizedPlate {
    NormalizedPlate(
        text.chars()
            .flat_map(char::to_uppercase)
            .filter(|c| c.is_alphanumeric())
            .collect(),
    )
}

/// Same as [`normalize`] for text that may be missing altogether.
pub fn normalize_opt(text: Option<&str>) -> NormalizedPlate {
    text.map(normalize).unwrap_or_default()
}
