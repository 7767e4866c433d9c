//! Task invocation entities
//!
//! A task invocation is one call of a user function handed over by the
//! dispatcher. Every resource the executor creates for it (artifact keys,
//! image tag, container and job names) is derived from its [`RunId`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Namespace for run identifiers. Fixed so that the same
/// `(dispatch_id, node_id)` pair always maps to the same run id.
const RUN_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6b75_6265_7461_736b_8000_0000_0000_0001);

/// Identifier naming one task invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Derive the run id for a dispatch/node pair.
    ///
    /// The pair is length-prefixed before hashing so that `("a-b", "c")` and
    /// `("a", "b-c")` never share an input. The resulting UUIDv5 is lowercase
    /// hex with hyphens, which is valid in image tags, object keys and
    /// Kubernetes resource names.
    pub fn derive(dispatch_id: &str, node_id: &str) -> Self {
        let name = format!("{}:{}:{}", dispatch_id.len(), dispatch_id, node_id);
        Self(Uuid::new_v5(&RUN_ID_NAMESPACE, name.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the serialized task payload
    pub fn function_key(&self) -> String {
        format!("func-{}.pkl", self.0)
    }

    /// Key of the serialized result
    pub fn result_key(&self) -> String {
        format!("result-{}.pkl", self.0)
    }

    /// Tag of the task image
    pub fn image_tag(&self) -> String {
        self.0.clone()
    }

    pub fn container_name(&self) -> String {
        format!("task-{}", self.0)
    }

    pub fn job_name(&self) -> String {
        format!("job-{}", self.0)
    }

    /// Name of the generated entrypoint script
    pub fn entrypoint_filename(&self) -> String {
        format!("entrypoint-{}.py", self.0)
    }

    /// Name of the generated container build file
    pub fn build_filename(&self) -> String {
        format!("Dockerfile-{}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Function and arguments to execute remotely.
///
/// `function` is the opaque blob produced by the dispatcher's serializer;
/// the executor never looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub function: Vec<u8>,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl TaskPayload {
    pub fn new(function: Vec<u8>) -> Self {
        Self {
            function,
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }
}

/// Resource requests for the worker container, as Kubernetes quantities
/// (`"100m"`, `"500Mi"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequests {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

impl ResourceRequests {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

/// One call of a user function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    pub dispatch_id: String,
    pub node_id: String,
    pub payload: TaskPayload,
    /// Overrides the configured resources when set
    pub resources: Option<ResourceRequests>,
    /// Overrides the configured base image when set
    pub base_image: Option<String>,
    /// Overrides the configured namespace when set
    pub namespace: Option<String>,
}

impl TaskInvocation {
    pub fn new(dispatch_id: impl Into<String>, node_id: impl Into<String>, payload: TaskPayload) -> Self {
        Self {
            dispatch_id: dispatch_id.into(),
            node_id: node_id.into(),
            payload,
            resources: None,
            base_image: None,
            namespace: None,
        }
    }

    pub fn run_id(&self) -> RunId {
        RunId::derive(&self.dispatch_id, &self.node_id)
    }
}
