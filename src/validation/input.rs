use garde::Validate;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::rpc::error::RpcError;

/// The input schema of a procedure.
///
/// Decoding is done by serde; [`RpcInput::check`] runs the value-level rules.
/// Types deriving [`garde::Validate`] delegate to [`validate_with_garde`].
pub trait RpcInput: DeserializeOwned + Send + 'static {
    fn check(&self) -> Result<(), RpcError>;
}

/// Runs `garde` validation and maps its report to `BAD_INPUT`.
pub fn validate_with_garde<T>(input: &T) -> Result<(), RpcError>
where
    T: Validate,
    T::Context: Default,
{
    input.validate().map_err(|report| {
        tracing::debug!("Validation error: {}", report);
        RpcError::bad_input(report.to_string())
    })
}

/// Decodes a raw JSON input and validates it.
///
/// A missing input arrives as `Value::Null`.
pub fn decode<I: RpcInput>(raw: Value) -> Result<I, RpcError> {
    let input: I = serde_json::from_value(raw)
        .map_err(|e| RpcError::bad_input(format!("Invalid input: {}", e)))?;
    input.check()?;
    Ok(input)
}

impl RpcInput for () {
    fn check(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

impl RpcInput for Value {
    fn check(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::error::RpcErrorCode;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize, Validate)]
    struct Named {
        #[garde(length(min = 1, max = 8))]
        name: String,
    }

    impl RpcInput for Named {
        fn check(&self) -> Result<(), RpcError> {
            validate_with_garde(self)
        }
    }

    #[test]
    fn unit_input_accepts_null() {
        assert!(decode::<()>(Value::Null).is_ok());
        assert_eq!(
            decode::<()>(json!({"a": 1})).unwrap_err().code,
            RpcErrorCode::BadInput
        );
    }

    #[test]
    fn encode_then_decode_is_identity_on_valid_inputs() {
        let original = Named { name: "ada".to_string() };
        let raw = serde_json::to_value(&original).unwrap();
        assert_eq!(decode::<Named>(raw).unwrap(), original);
    }

    #[test]
    fn schema_violations_are_bad_input() {
        assert_eq!(
            decode::<Named>(json!({"name": ""})).unwrap_err().code,
            RpcErrorCode::BadInput
        );
        assert_eq!(
            decode::<Named>(json!({"name": 5})).unwrap_err().code,
            RpcErrorCode::BadInput
        );
        assert_eq!(decode::<Named>(Value::Null).unwrap_err().code, RpcErrorCode::BadInput);
    }
}
