// Request handlers behind the JSON-RPC methods

pub mod feed;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod transition;

pub use feed::*;
pub use ingest::*;
pub use metrics::*;
pub use query::*;
pub use transition::*;

use tracing::error;
use validator::Validate;

use crate::{SiaasError, SiaasResult};

/// Run derive-based request validation, flattening field errors into one message
pub(crate) fn validate_request<T: Validate>(request: &T) -> SiaasResult<()> {
    let Err(validation_errors) = request.validate() else {
        return Ok(());
    };
    error!("Request validation failed: {:?}", validation_errors);

    let field_errors = validation_errors.field_errors();
    let first_field = field_errors.keys().next().map(|field| field.to_string());
    let mut messages: Vec<String> = field_errors
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                format!(
                    "Field '{}': {}",
                    field,
                    error
                        .message
                        .as_ref()
                        .map(|m| m.as_ref())
                        .unwrap_or("validation error")
                )
            })
        })
        .collect();
    if messages.is_empty() {
        messages.push(validation_errors.to_string());
    }

    Err(SiaasError::validation(
        messages.join("; "),
        first_field.as_deref(),
    ))
}
