//! JSON Schema validation of tool input

use serde_json::Value;

use super::ToolError;

/// Compiled validator for one tool's input schema
pub struct InputValidator {
    validator: jsonschema::Validator,
}

impl InputValidator {
    /// Compile `schema`. Fails if the schema itself is malformed.
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
        Ok(Self { validator })
    }

    /// Check `input`, collecting every violation into one message
    pub fn validate(&self, input: &Value) -> Result<(), ToolError> {
        if self.validator.is_valid(input) {
            return Ok(());
        }
        let errors: Vec<String> = self
            .validator
            .iter_errors(input)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        Err(ToolError::InvalidInput(errors.join("; ")))
    }
}
