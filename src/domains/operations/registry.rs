//! Operation Registry - per-server registration and dispatch.
//!
//! The registry maps operation names to their schema and handler. It is built
//! once at server startup through ordinary `register` calls and is read-only
//! afterwards, so `invoke` only needs `&self` and can run concurrently.
//!
//! Each operation's JSON Schema is compiled when it is registered. `invoke`
//! checks parameters against the compiled schema first, then against the
//! params type the schema was generated from, and only then calls the handler.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use super::error::{HandlerError, OperationError};
use super::handlers::{Operation, OperationDescriptor, Parameters};

struct Registered {
    operation: Operation,
    validator: JSONSchema,
}

impl Registered {
    fn validate(&self, params: &Parameters) -> Result<(), String> {
        let instance = Value::Object(params.clone());
        if let Err(errors) = self.validator.validate(&instance) {
            let reasons: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    match path.trim_start_matches('/') {
                        "" => e.to_string(),
                        field => format!("{field}: {e}"),
                    }
                })
                .collect();
            return Err(reasons.join("; "));
        }
        self.operation.check_types(params)
    }
}

/// Registry of the operations one tool server exposes.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Registered>,
    /// Registration order, used for listing.
    order: Vec<String>,
}

impl OperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation. Names are unique within a registry and the
    /// parameter schema must compile.
    pub fn register(&mut self, operation: Operation) -> Result<(), OperationError> {
        let name = operation.name().to_string();
        if self.operations.contains_key(&name) {
            return Err(OperationError::duplicate(name));
        }
        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(operation.schema())
            .map_err(|e| OperationError::invalid_schema(&name, e.to_string()))?;

        debug!(operation = %name, idempotent = operation.is_idempotent(), "Registered operation");
        self.order.push(name.clone());
        self.operations.insert(
            name,
            Registered {
                operation,
                validator,
            },
        );
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&Registered, OperationError> {
        self.operations
            .get(name)
            .ok_or_else(|| OperationError::unknown(name))
    }

    /// Look up an operation by name.
    pub fn lookup(&self, name: &str) -> Result<&Operation, OperationError> {
        self.entry(name).map(|entry| &entry.operation)
    }

    /// Registered operation names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Registered operations, in registration order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.order
            .iter()
            .filter_map(|name| self.operations.get(name))
            .map(|entry| &entry.operation)
    }

    /// Catalog of all operations, in registration order.
    pub fn catalog(&self) -> Vec<OperationDescriptor> {
        self.operations().map(Operation::descriptor).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Validate `params` and run the operation's handler.
    ///
    /// The handler is only called when the operation exists and the parameters
    /// satisfy its schema. A handler panic is caught and reported as
    /// `HandlerFailure`, the same as any other internal fault.
    #[instrument(skip(self, params))]
    pub async fn invoke(&self, name: &str, params: &Parameters) -> Result<Value, OperationError> {
        let entry = self.entry(name).inspect_err(|_| {
            warn!("Unknown operation requested: {}", name);
        })?;

        entry
            .validate(params)
            .map_err(|reason| OperationError::invalid_parameters(name, reason))?;

        let outcome = AssertUnwindSafe(entry.operation.handler().call(params))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(HandlerError::Invalid(reason))) => {
                Err(OperationError::invalid_parameters(name, reason))
            }
            Ok(Err(HandlerError::Internal(detail))) => {
                error!(operation = %name, %detail, "Operation handler failed");
                Err(OperationError::handler_failure(name, detail))
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(operation = %name, %detail, "Operation handler panicked");
                Err(OperationError::handler_failure(name, format!("panic: {detail}")))
            }
        }
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct ChargeParams {
        card_id: String,
        #[schemars(range(min = 0))]
        amount: f64,
        #[serde(default = "one")]
        #[schemars(range(min = 1, max = 9))]
        count: u32,
    }

    fn one() -> u32 {
        1
    }

    #[derive(Deserialize, JsonSchema)]
    struct NoParams {}

    fn counting_op(name: &str, calls: Arc<AtomicUsize>) -> Operation {
        Operation::from_fn::<ChargeParams, _>(name, move |p: &Parameters| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "card_id": p["card_id"] }))
        })
    }

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_duplicate_registration() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = OperationRegistry::new();
        registry.register(counting_op("op", calls.clone())).unwrap();
        let err = registry.register(counting_op("op", calls)).unwrap_err();
        assert!(matches!(err, OperationError::DuplicateOperation(ref n) if n == "op"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = OperationRegistry::new();
        assert!(matches!(
            registry.lookup("missing"),
            Err(OperationError::UnknownOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_calls_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = OperationRegistry::new();
        registry.register(counting_op("op", calls.clone())).unwrap();

        let out = registry
            .invoke("op", &params(json!({ "card_id": "c1", "amount": 10 })))
            .await
            .unwrap();
        assert_eq!(out, json!({ "card_id": "c1" }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_unknown_never_calls_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = OperationRegistry::new();
        registry.register(counting_op("op", calls.clone())).unwrap();

        let err = registry.invoke("other", &Parameters::new()).await.unwrap_err();
        assert!(matches!(err, OperationError::UnknownOperation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_before_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = OperationRegistry::new();
        registry.register(counting_op("op", calls.clone())).unwrap();

        let missing = registry
            .invoke("op", &params(json!({ "amount": 1 })))
            .await
            .unwrap_err();
        assert!(matches!(missing, OperationError::InvalidParameters { .. }));

        let negative = registry
            .invoke("op", &params(json!({ "card_id": "c1", "amount": -5 })))
            .await
            .unwrap_err();
        assert!(negative.to_string().contains("amount: "), "{negative}");
        assert!(negative.to_string().contains("minimum"), "{negative}");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_schema_and_params_type_agree() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = OperationRegistry::new();
        registry.register(counting_op("op", calls.clone())).unwrap();

        // An explicit null is not the same as leaving a defaulted field out.
        let null_count = registry
            .invoke("op", &params(json!({ "card_id": "c1", "amount": 1, "count": null })))
            .await
            .unwrap_err();
        assert!(matches!(null_count, OperationError::InvalidParameters { .. }));
        assert!(null_count.to_string().contains("count: "), "{null_count}");

        // 2.0 is an integer to JSON Schema but not to the u32 field.
        let float_count = registry
            .invoke("op", &params(json!({ "card_id": "c1", "amount": 1, "count": 2.0 })))
            .await
            .unwrap_err();
        assert!(matches!(float_count, OperationError::InvalidParameters { .. }));
        let message = float_count.to_string();
        assert!(message.contains("u32") || message.contains("integer"), "{message}");

        let too_many = registry
            .invoke("op", &params(json!({ "card_id": "c1", "amount": 1, "count": 10 })))
            .await
            .unwrap_err();
        assert!(too_many.to_string().contains("count: "), "{too_many}");

        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry
            .invoke("op", &params(json!({ "card_id": "c1", "amount": 1, "count": 2 })))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_uncompilable_schema_rejected() {
        struct Broken;

        impl JsonSchema for Broken {
            fn schema_name() -> std::borrow::Cow<'static, str> {
                "Broken".into()
            }

            fn json_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
                schemars::json_schema!({
                    "type": "object",
                    "properties": { "card_id": { "type": "string", "pattern": "(" } }
                })
            }
        }

        impl<'de> Deserialize<'de> for Broken {
            fn deserialize<D: serde::Deserializer<'de>>(_: D) -> Result<Self, D::Error> {
                Ok(Broken)
            }
        }

        let mut registry = OperationRegistry::new();
        let err = registry
            .register(Operation::from_fn::<Broken, _>("broken", |_: &Parameters| Ok(json!(null))))
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidSchema { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_handler_errors_are_classified() {
        let mut registry = OperationRegistry::new();
        registry
            .register(Operation::from_fn::<NoParams, _>("bad_input", |_: &Parameters| {
                Err(HandlerError::invalid("Card ID is required"))
            }))
            .unwrap();
        registry
            .register(Operation::from_fn::<NoParams, _>("broken", |_: &Parameters| {
                Err(HandlerError::internal("connection reset by upstream"))
            }))
            .unwrap();

        let err = registry.invoke("bad_input", &Parameters::new()).await.unwrap_err();
        assert!(matches!(err, OperationError::InvalidParameters { .. }));
        assert!(err.public_message().contains("Card ID is required"));

        let err = registry.invoke("broken", &Parameters::new()).await.unwrap_err();
        assert!(matches!(err, OperationError::HandlerFailure { .. }));
        assert_eq!(err.public_message(), "internal error");
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let mut registry = OperationRegistry::new();
        registry
            .register(Operation::from_fn::<NoParams, _>("boom", |_: &Parameters| {
                panic!("handler exploded")
            }))
            .unwrap();
        registry
            .register(Operation::from_fn::<NoParams, _>("fine", |_: &Parameters| Ok(json!(1))))
            .unwrap();

        let err = registry.invoke("boom", &Parameters::new()).await.unwrap_err();
        match err {
            OperationError::HandlerFailure { detail, .. } => assert!(detail.contains("handler exploded")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(registry.invoke("fine", &Parameters::new()).await.unwrap(), json!(1));
    }

    #[test]
    fn test_catalog_keeps_registration_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = OperationRegistry::new();
        registry.register(counting_op("zeta", calls.clone())).unwrap();
        registry.register(counting_op("alpha", calls)).unwrap();
        let names: Vec<_> = registry.catalog().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
    }
}
