//! Class label to defect code mapping.

use crate::core::errors::MappingError;
use serde::Serialize;

/// Integer defect category encoded as the leading numeral of a class label,
/// e.g. `"0 OK"` is 0 and `"1 Underextrusion"` is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DefectCode(pub u8);

impl DefectCode {
    /// Reads the code from the first character of `label`.
    ///
    /// Only one character is read, so a label such as `"12 Stringing"` maps to 1.
    pub fn from_label(label: &str) -> Result<Self, MappingError> {
        label
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .map(|d| DefectCode(d as u8))
            .ok_or_else(|| MappingError {
                label: label.to_string(),
            })
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for DefectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
