//! Operation handler contract.
//!
//! Business logic plugs into a tool server through [`OperationHandler`]. A
//! handler receives the already-validated parameter map and returns a JSON
//! value or a [`HandlerError`]. Handlers must not manage transport, logging
//! setup or process lifecycle; the server owns all of that.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::error::HandlerError;

/// Parameters passed to an operation.
pub type Parameters = Map<String, Value>;

/// Result type returned by handlers.
pub type HandlerResult = Result<Value, HandlerError>;

/// Trait implemented by every operation's business logic.
///
/// Handlers may be invoked concurrently. Any mutable state they keep must be
/// synchronized by the handler itself.
#[async_trait::async_trait]
pub trait OperationHandler: Send + Sync {
    /// Execute the operation.
    async fn call(&self, params: &Parameters) -> HandlerResult;
}

/// Plain synchronous closures are handlers.
#[async_trait::async_trait]
impl<F> OperationHandler for F
where
    F: Fn(&Parameters) -> HandlerResult + Send + Sync,
{
    async fn call(&self, params: &Parameters) -> HandlerResult {
        self(params)
    }
}

/// Checks that a parameter map deserializes into the operation's typed params.
type Conformance = fn(&Parameters) -> Result<(), String>;

/// A registered operation: name, schema, retry eligibility and handler.
///
/// The parameter schema is generated from the params struct `P` given at
/// construction, so the advertised schema and the type the handler parses
/// cannot drift apart.
#[derive(Clone)]
pub struct Operation {
    name: String,
    description: String,
    schema: Value,
    conforms: Conformance,
    idempotent: bool,
    handler: Arc<dyn OperationHandler>,
}

impl Operation {
    /// Create a non-idempotent operation taking parameters of type `P`.
    pub fn new<P>(name: impl Into<String>, handler: impl OperationHandler + 'static) -> Self
    where
        P: JsonSchema + DeserializeOwned,
    {
        Self {
            name: name.into(),
            description: String::new(),
            schema: parameters_schema::<P>(),
            conforms: conforms_to::<P>,
            idempotent: false,
            handler: Arc::new(handler),
        }
    }

    /// Create a non-idempotent operation from a synchronous closure.
    pub fn from_fn<P, F>(name: impl Into<String>, handler: F) -> Self
    where
        P: JsonSchema + DeserializeOwned,
        F: Fn(&Parameters) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new::<P>(name, handler)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare the operation safe to retry after a timeout.
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// JSON Schema (draft 7) of the parameter object.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Check that `params` deserializes into this operation's params type.
    pub(crate) fn check_types(&self, params: &Parameters) -> Result<(), String> {
        (self.conforms)(params)
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    pub(crate) fn handler(&self) -> &Arc<dyn OperationHandler> {
        &self.handler
    }

    /// Catalog entry advertised to routers.
    pub fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            idempotent: self.idempotent,
            parameters: self.schema.clone(),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("idempotent", &self.idempotent)
            .finish_non_exhaustive()
    }
}

/// Serializable description of an operation, as served by `GET /operations`.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub idempotent: bool,
    #[serde(default)]
    pub parameters: Value,
}

fn parameters_schema<P: JsonSchema>() -> Value {
    SchemaSettings::draft07()
        .into_generator()
        .into_root_schema_for::<P>()
        .to_value()
}

fn conforms_to<P: DeserializeOwned>(params: &Parameters) -> Result<(), String> {
    serde_json::from_value::<P>(Value::Object(params.clone()))
        .map(drop)
        .map_err(|e| format!("parameters do not match the declared types: {e}"))
}

/// Deserialize a handler's parameter map into a typed struct.
///
/// The registry has already checked the map against the same type, so failures
/// here only happen when a handler is called directly.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: &Parameters) -> Result<T, HandlerError> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| HandlerError::invalid(format!("Invalid input parameters: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct Anything {}

    /// Parameters of a lookup.
    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct LookupParams {
        /// Key to look up
        key: String,
        /// Maximum number of results
        #[schemars(range(min = 1, max = 50))]
        #[serde(default = "default_limit")]
        limit: u32,
    }

    fn default_limit() -> u32 {
        10
    }

    #[tokio::test]
    async fn test_closure_is_handler() {
        let op = Operation::from_fn::<Anything, _>("echo", |p: &Parameters| {
            Ok(Value::Object(p.clone()))
        });
        let mut params = Parameters::new();
        params.insert("x".into(), json!(1));
        let out = op.handler().call(&params).await.unwrap();
        assert_eq!(out, json!({ "x": 1 }));
    }

    #[test]
    fn test_descriptor() {
        let op = Operation::from_fn::<LookupParams, _>("lookup", |_: &Parameters| Ok(Value::Null))
            .with_description("Look something up")
            .idempotent();
        let d = op.descriptor();
        assert_eq!(d.name, "lookup");
        assert!(d.idempotent);
        assert_eq!(d.parameters["type"], "object");
        assert_eq!(d.parameters["required"], json!(["key"]));
        assert_eq!(d.parameters["properties"]["key"]["description"], "Key to look up");
        assert_eq!(d.parameters["properties"]["limit"]["maximum"], json!(50));
        assert_eq!(d.parameters["properties"]["limit"]["default"], json!(10));
    }

    #[test]
    fn test_check_types_follows_params_struct() {
        let op = Operation::from_fn::<LookupParams, _>("lookup", |_: &Parameters| Ok(Value::Null));
        let params = |v: Value| v.as_object().cloned().unwrap();

        assert!(op.check_types(&params(json!({ "key": "k" }))).is_ok());
        assert!(op.check_types(&params(json!({ "key": "k", "limit": 3 }))).is_ok());

        let err = op
            .check_types(&params(json!({ "key": "k", "limit": 2.5 })))
            .unwrap_err();
        assert!(err.contains("expected u32"), "{err}");
        assert!(op.check_types(&params(json!({ "limit": 3 }))).is_err());
    }

    #[test]
    fn test_parse_params() {
        #[derive(serde::Deserialize)]
        struct P {
            card_id: String,
        }
        let mut params = Parameters::new();
        params.insert("card_id".into(), json!("c1"));
        let p: P = parse_params(&params).unwrap();
        assert_eq!(p.card_id, "c1");

        let err = parse_params::<P>(&Parameters::new()).err().unwrap();
        assert!(matches!(err, HandlerError::Invalid(_)));
    }
}
