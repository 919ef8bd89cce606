use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("duplicate task id: {0}")]
  DuplicateTask(String),

  #[error("task '{task}' depends on '{dependency}', which is not in the graph")]
  UnknownDependency { task: String, dependency: String },

  #[error("task '{task}' references output of '{referenced}' without depending on it")]
  UndeclaredReference { task: String, referenced: String },
}
