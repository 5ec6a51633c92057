use serde::{Deserialize, Serialize};

/// Variables the workflow engine attaches to a running step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub space_id: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Operation id shared by every step of one operation
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub current_activity_id: Option<String>,
    #[serde(default)]
    pub process_instance_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(space_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            correlation_id: Some(correlation_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    #[must_use]
    pub fn with_current_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.current_activity_id = Some(activity_id.into());
        self
    }

    #[must_use]
    pub fn with_process_instance_id(mut self, process_instance_id: impl Into<String>) -> Self {
        self.process_instance_id = Some(process_instance_id.into());
        self
    }

    /// The operation id, empty when absent.
    pub fn operation_id(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or_default()
    }

    /// The task id, or the current activity id when no task id is set.
    /// Empty when neither is present.
    pub fn activity_id(&self) -> &str {
        self.task_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or(self.current_activity_id.as_deref())
            .unwrap_or_default()
    }
}
