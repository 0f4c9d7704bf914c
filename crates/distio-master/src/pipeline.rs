//! [`Pipeline`] — an ordered chain of `(task, slave, interceptor?)` stages
//! that threads a value through, per `SPEC_FULL.md` §4.8.

use std::sync::Arc;

use distio_core::{DistioError, Response};

use crate::slave::SlaveHandle;

/// Per-stage interceptor: inspects the stage's `Response` and may
/// short-circuit the pipeline by returning `Some(sentinel_value)`.
pub type Interceptor = Box<dyn Fn(&Response) -> Option<serde_json::Value> + Send + Sync>;

/// One pipeline stage.
pub struct Stage {
    task_name: String,
    slave: Arc<SlaveHandle>,
    interceptor: Option<Interceptor>,
}

impl Stage {
    pub fn new(task_name: impl Into<String>, slave: Arc<SlaveHandle>) -> Self {
        Self {
            task_name: task_name.into(),
            slave,
            interceptor: None,
        }
    }

    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }
}

/// A reusable ordered chain of stages. `execute` may be called concurrently
/// and repeatedly; each call is independent.
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Thread `initial` through every stage in order.
    ///
    /// # Errors
    ///
    /// Returns the first stage's transport/slave-level `dispatch` error
    /// (`PipelineAborted` is not raised for this case — only synthesized via
    /// an interceptor's short-circuit). If a stage's response carries a task
    /// error and no interceptor consumes it, returns that
    /// [`DistioError::TaskError`]; no downstream stage runs either way.
    pub async fn execute(&self, initial: serde_json::Value) -> Result<Response, DistioError> {
        let mut value = initial;
        let mut last: Option<Response> = None;

        for stage in &self.stages {
            let response = stage.slave.dispatch(stage.task_name.clone(), value.clone()).await?;

            if let Some(interceptor) = &stage.interceptor
                && let Some(short_value) = interceptor(&response)
            {
                return Ok(Response::ok(
                    response.request_id,
                    response.slave_id,
                    response.task_name.clone(),
                    response.sent_at,
                    short_value,
                ));
            }

            if let Some(error) = &response.error {
                return Err(DistioError::TaskError {
                    task_name: response.task_name.clone(),
                    message: error.message.clone(),
                });
            }

            value = response.value.clone().unwrap_or(serde_json::Value::Null);
            last = Some(response);
        }

        last.ok_or_else(|| DistioError::invalid_argument("pipeline has no stages"))
    }
}
