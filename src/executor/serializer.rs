use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::entities::TaskPayload;
use crate::error::{ExecutorError, Result};

/// Worker-side half of a serialization format, as entrypoint source text.
///
/// `load_task` runs with `func_path` bound and must bind `function`, `args`
/// and `kwargs`. `dump_result` runs with `result` and `partial_path` bound
/// and must write the result to `partial_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCodec {
    pub imports: String,
    pub load_task: String,
    pub dump_result: String,
}

/// Converts task payloads to artifact bytes and result artifacts back.
///
/// The worker reads and writes the same format through [`Self::worker_codec`].
pub trait TaskSerializer: Send + Sync {
    fn serialize_task(&self, payload: &TaskPayload) -> Result<Vec<u8>>;

    fn deserialize_result(&self, bytes: &[u8]) -> Result<Value>;

    fn worker_codec(&self) -> WorkerCodec;

    fn name(&self) -> &'static str;
}

/// JSON document `{"function": [bytes], "args": [...], "kwargs": {...}}`.
///
/// `function` holds the dispatcher's pickled callable; the worker turns it
/// back into a callable with the serializer package from `WorkerRuntime`.
/// Results are written as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTaskSerializer;

impl TaskSerializer for JsonTaskSerializer {
    fn serialize_task(&self, payload: &TaskPayload) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(payload)?)
    }

    fn deserialize_result(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| {
            ExecutorError::DeserializationError(format!("result is not valid JSON: {}", e))
        })
    }

    fn worker_codec(&self) -> WorkerCodec {
        WorkerCodec {
            imports: "import json\nimport cloudpickle\n".to_string(),
            load_task: r#"with open(func_path, "r") as f:
    payload = json.load(f)
function = cloudpickle.loads(bytes(payload["function"]))
args = payload["args"]
kwargs = payload["kwargs"]
"#
            .to_string(),
            dump_result: r#"with open(partial_path, "w") as f:
    json.dump(result, f)
"#
            .to_string(),
        }
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
