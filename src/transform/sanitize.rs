//! Final text clean-up pass.

use super::{TransformError, Transformation};
use crate::dataset::{Dataset, Value};

/// Strip NUL characters from text values and decode binary payloads to text.
///
/// Runs after every shape change so it only ever sees final column names.
#[derive(Debug, Clone, Default)]
pub struct StripNulChars;

impl Transformation for StripNulChars {
    fn name(&self) -> &str {
        "strip_nul_chars"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        dataset.map_values(|value| match value {
            Value::Text(text) if text.contains('\0') => {
                text.retain(|c| c != '\0');
            }
            Value::Bytes(bytes) => {
                let mut text = String::from_utf8_lossy(bytes).into_owned();
                text.retain(|c| c != '\0');
                *value = Value::Text(text);
            }
            _ => {}
        });
        Ok(dataset)
    }
}
