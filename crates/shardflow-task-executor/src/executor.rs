use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::input::{TaskInput, TaskOutput};

/// Performs the actual tool invocation for a task.
///
/// Implementations own container/process invocation and resource sizing,
/// and classify failures as transient or permanent. They should return
/// promptly with [`ExecutorError::Cancelled`] once `cancel` fires.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
  async fn invoke(
    &self,
    input: &TaskInput,
    cancel: CancellationToken,
  ) -> Result<TaskOutput, ExecutorError>;
}

#[async_trait]
impl<T: TaskExecutor + ?Sized> TaskExecutor for Arc<T> {
  async fn invoke(
    &self,
    input: &TaskInput,
    cancel: CancellationToken,
  ) -> Result<TaskOutput, ExecutorError> {
    (**self).invoke(input, cancel).await
  }
}
