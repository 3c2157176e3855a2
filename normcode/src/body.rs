//! The external contract the engine requires from its host: calling
//! paradigms (composed LLM/tool operations) and resolving perception
//! wrappers on string-typed inputs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineError;

/// An opaque declarative spec the engine hands to `call_paradigm`
/// unexamined — the engine never interprets paradigm contents.
pub type ParadigmSpec = Value;

/// The external contract the engine requires from its host. A real
/// implementation performs LLM calls, file I/O, and persistent
/// key/value lookups; the engine only needs these four operations and
/// must not assume anything about how they are implemented beyond
/// "deterministic-given-inputs" (retries are the Body's concern).
#[async_trait]
pub trait BodyInterface: Send + Sync {
    async fn call_paradigm(&self, paradigm_id: &str, inputs: HashMap<String, Value>) -> Result<Value, EngineError>;

    async fn read_file(&self, path: &str) -> Result<String, EngineError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), EngineError>;

    async fn read_memorized(&self, key: &str) -> Result<Value, EngineError>;
}

/// A perception wrapper recognized on a string-typed imperative/judgement
/// input, resolved during the MVP step.
#[derive(Debug, Clone, PartialEq)]
pub enum PerceptionWrapper {
    FileLocation(String),
    PromptLocation(String),
    ScriptLocation(String),
    MemorizedParameter(String),
    SavePath(String),
}

impl PerceptionWrapper {
    const PREFIXES: &'static [(&'static str, fn(String) -> PerceptionWrapper)] = &[
        ("%{file_location}(", PerceptionWrapper::FileLocation as fn(String) -> PerceptionWrapper),
        ("%{prompt_location}(", PerceptionWrapper::PromptLocation as fn(String) -> PerceptionWrapper),
        ("%{script_location}(", PerceptionWrapper::ScriptLocation as fn(String) -> PerceptionWrapper),
        ("%{memorized_parameter}(", PerceptionWrapper::MemorizedParameter as fn(String) -> PerceptionWrapper),
        ("%{save_path}(", PerceptionWrapper::SavePath as fn(String) -> PerceptionWrapper),
    ];

    /// Parse `%{wrapper_name}(argument)` out of a raw string input. Returns
    /// `None` for any string that isn't one of the five recognized
    /// wrappers — callers treat those as plain literal values.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        for (prefix, ctor) in Self::PREFIXES {
            if let Some(rest) = raw.strip_prefix(prefix) {
                let arg = rest.strip_suffix(')')?;
                return Some(ctor(arg.to_string()));
            }
        }
        None
    }

    /// Resolve this wrapper against a Body, returning the value an
    /// imperative/judgement input should actually bind to.
    pub async fn resolve(&self, body: &dyn BodyInterface) -> Result<Value, EngineError> {
        match self {
            PerceptionWrapper::FileLocation(path) => Ok(Value::String(body.read_file(path).await?)),
            PerceptionWrapper::PromptLocation(path) => Ok(Value::String(body.read_file(path).await?)),
            PerceptionWrapper::ScriptLocation(path) => match body.read_file(path).await {
                Ok(content) => Ok(Value::String(content)),
                Err(_) => Ok(Value::Null),
            },
            PerceptionWrapper::MemorizedParameter(key) => body.read_memorized(key).await,
            PerceptionWrapper::SavePath(path) => Ok(Value::String(path.clone())),
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// An in-memory `BodyInterface` test double: paradigm calls are
    /// resolved from a fixed lookup table keyed by `paradigm_id`, files
    /// and memorized values from in-memory maps populated by the test.
    #[derive(Default)]
    pub struct MockBody {
        pub paradigm_results: StdHashMap<String, Value>,
        /// Per-paradigm queues consumed in order before falling back to
        /// `paradigm_results` — for handlers (looping) that call the same
        /// paradigm once per iteration with a different result each time.
        pub paradigm_sequence: Mutex<StdHashMap<String, VecDeque<Value>>>,
        pub files: Mutex<StdHashMap<String, String>>,
        pub memorized: StdHashMap<String, Value>,
        pub writes: Mutex<Vec<(String, String)>>,
    }

    impl MockBody {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_paradigm(mut self, id: impl Into<String>, result: Value) -> Self {
            self.paradigm_results.insert(id.into(), result);
            self
        }

        pub fn with_paradigm_sequence(self, id: impl Into<String>, results: Vec<Value>) -> Self {
            self.paradigm_sequence
                .lock()
                .unwrap()
                .insert(id.into(), results.into_iter().collect());
            self
        }

        pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
            self.files.lock().unwrap().insert(path.into(), content.into());
            self
        }

        pub fn with_memorized(mut self, key: impl Into<String>, value: Value) -> Self {
            self.memorized.insert(key.into(), value);
            self
        }
    }

    #[async_trait]
    impl BodyInterface for MockBody {
        async fn call_paradigm(&self, paradigm_id: &str, _inputs: StdHashMap<String, Value>) -> Result<Value, EngineError> {
            if let Some(queue) = self.paradigm_sequence.lock().unwrap().get_mut(paradigm_id) {
                if let Some(next) = queue.pop_front() {
                    return Ok(next);
                }
            }
            self.paradigm_results
                .get(paradigm_id)
                .cloned()
                .ok_or_else(|| EngineError::BodyError(format!("no mock result for paradigm '{paradigm_id}'")))
        }

        async fn read_file(&self, path: &str) -> Result<String, EngineError> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| EngineError::BodyError(format!("mock file not found: {path}")))
        }

        async fn write_file(&self, path: &str, content: &str) -> Result<(), EngineError> {
            self.files.lock().unwrap().insert(path.to_string(), content.to_string());
            self.writes.lock().unwrap().push((path.to_string(), content.to_string()));
            Ok(())
        }

        async fn read_memorized(&self, key: &str) -> Result<Value, EngineError> {
            self.memorized
                .get(key)
                .cloned()
                .ok_or_else(|| EngineError::BodyError(format!("no mock memorized value for key '{key}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::mock::MockBody;

    #[test]
    fn parses_recognized_wrappers() {
        assert_eq!(
            PerceptionWrapper::parse("%{file_location}(/tmp/a.txt)"),
            Some(PerceptionWrapper::FileLocation("/tmp/a.txt".to_string()))
        );
        assert_eq!(
            PerceptionWrapper::parse("%{memorized_parameter}(k)"),
            Some(PerceptionWrapper::MemorizedParameter("k".to_string()))
        );
    }

    #[test]
    fn rejects_plain_strings() {
        assert_eq!(PerceptionWrapper::parse("plain value"), None);
    }

    #[tokio::test]
    async fn resolves_file_location_through_body() {
        let body = MockBody::new().with_file("/tmp/a.txt", "hello");
        let wrapper = PerceptionWrapper::FileLocation("/tmp/a.txt".to_string());
        let value = wrapper.resolve(&body).await.unwrap();
        assert_eq!(value, Value::String("hello".to_string()));
    }

    #[tokio::test]
    async fn resolves_memorized_parameter_through_body() {
        let body = MockBody::new().with_memorized("k", serde_json::json!(42));
        let wrapper = PerceptionWrapper::MemorizedParameter("k".to_string());
        let value = wrapper.resolve(&body).await.unwrap();
        assert_eq!(value, serde_json::json!(42));
    }

    #[tokio::test]
    async fn paradigm_sequence_drains_before_falling_back() {
        let body = MockBody::new()
            .with_paradigm_sequence("step", vec![serde_json::json!(1), serde_json::json!(2)])
            .with_paradigm("step", serde_json::json!("fallback"));
        assert_eq!(body.call_paradigm("step", Default::default()).await.unwrap(), serde_json::json!(1));
        assert_eq!(body.call_paradigm("step", Default::default()).await.unwrap(), serde_json::json!(2));
        assert_eq!(
            body.call_paradigm("step", Default::default()).await.unwrap(),
            serde_json::json!("fallback")
        );
    }
}
