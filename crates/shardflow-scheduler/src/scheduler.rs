use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use shardflow_config::{DiskTiers, RunConfig, TaskKind};
use shardflow_graph::{Graph, TaskGraph, TaskId, TaskNode};
use shardflow_task_executor::{ExecutorError, TaskExecutor, TaskInput, TaskOutput};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::SchedulerError;
use crate::events::{EventNotifier, NoopNotifier, SchedulerEvent};
use crate::input::resolve_params;
use crate::report::{
  AttemptOutcome, CompletionRecord, DispatchRecord, NodeOutcome, NodeState, RunReport, RunStatus,
};

/// Scheduling limits for a run.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  /// Run-wide cap on attempts in flight.
  pub max_concurrency: usize,
  /// Optional per-kind caps, applied on top of `max_concurrency`.
  pub kind_limits: BTreeMap<TaskKind, usize>,
  /// Forwarded to executors as `disk_gb`.
  pub disk: DiskTiers,
  /// Stop dispatching after the first permanent failure.
  pub fail_fast: bool,
}

impl SchedulerConfig {
  pub fn new(max_concurrency: usize) -> Self {
    Self {
      max_concurrency,
      kind_limits: BTreeMap::new(),
      disk: DiskTiers::default(),
      fail_fast: false,
    }
  }

  pub fn from_run_config(config: &RunConfig) -> Self {
    Self {
      max_concurrency: config.max_concurrency,
      kind_limits: config.task_concurrency.clone(),
      disk: config.disk,
      fail_fast: config.fail_fast,
    }
  }

  pub fn with_kind_limit(mut self, kind: TaskKind, limit: usize) -> Self {
    self.kind_limits.insert(kind, limit);
    self
  }

  pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
    self.fail_fast = fail_fast;
    self
  }

  fn validate(&self) -> Result<(), SchedulerError> {
    if self.max_concurrency == 0 {
      return Err(SchedulerError::InvalidConcurrency);
    }
    if let Some((kind, _)) = self.kind_limits.iter().find(|(_, limit)| **limit == 0) {
      return Err(SchedulerError::InvalidKindLimit {
        kind: kind.to_string(),
      });
    }
    Ok(())
  }
}

/// Executes task graphs.
///
/// The scheduler knows nothing about branches or gathers: it dispatches
/// whatever nodes the graph contains once their dependencies succeed.
pub struct Scheduler<N = NoopNotifier> {
  config: SchedulerConfig,
  notifier: N,
}

impl Scheduler<NoopNotifier> {
  pub fn new(config: SchedulerConfig) -> Self {
    Self {
      config,
      notifier: NoopNotifier,
    }
  }
}

impl<N: EventNotifier> Scheduler<N> {
  /// Replace the event notifier.
  pub fn with_notifier<M: EventNotifier>(self, notifier: M) -> Scheduler<M> {
    Scheduler {
      config: self.config,
      notifier,
    }
  }

  pub fn config(&self) -> &SchedulerConfig {
    &self.config
  }

  /// Run `graph` to completion, failure or cancellation.
  ///
  /// Task failures do not make this return `Err`; they are reported per
  /// node in the [`RunReport`] and the run status is `Failed` once no
  /// further progress is possible. `Err` is reserved for invalid limits,
  /// panicking attempts and violated internal invariants.
  #[instrument(
    name = "scheduler_run",
    skip(self, graph, executor, cancel),
    fields(tasks = graph.len())
  )]
  pub async fn run(
    &self,
    graph: &TaskGraph,
    executor: Arc<dyn TaskExecutor>,
    cancel: CancellationToken,
  ) -> Result<RunReport, SchedulerError> {
    self.config.validate()?;
    let execution_id = uuid::Uuid::new_v4().to_string();
    Coordinator::new(self, graph, execution_id, executor, cancel)
      .execute()
      .await
  }
}

/// Per-node bookkeeping owned by the coordinator.
struct Entry {
  state: NodeState,
  attempts: u32,
  retries_left: u32,
  unmet: usize,
  error: Option<String>,
}

/// What a spawned attempt reports back.
struct AttemptResult {
  task_id: TaskId,
  attempt: u32,
  result: Result<TaskOutput, ExecutorError>,
}

/// State of one run. Only the coordinator mutates it.
struct Coordinator<'a, N> {
  config: &'a SchedulerConfig,
  notifier: &'a N,
  graph: &'a TaskGraph,
  view: Graph,
  execution_id: String,
  executor: Arc<dyn TaskExecutor>,
  cancel: CancellationToken,
  /// Handed to executors; cancelled on abort.
  attempts_cancel: CancellationToken,
  entries: HashMap<TaskId, Entry>,
  outputs: HashMap<TaskId, TaskOutput>,
  ready: VecDeque<TaskId>,
  run_permits: Arc<Semaphore>,
  kind_permits: HashMap<TaskKind, Arc<Semaphore>>,
  in_flight: JoinSet<AttemptResult>,
  halted: bool,
  sequence: u64,
  dispatch_log: Vec<DispatchRecord>,
  completion_log: Vec<CompletionRecord>,
}

impl<'a, N: EventNotifier> Coordinator<'a, N> {
  fn new(
    scheduler: &'a Scheduler<N>,
    graph: &'a TaskGraph,
    execution_id: String,
    executor: Arc<dyn TaskExecutor>,
    cancel: CancellationToken,
  ) -> Self {
    let entries = graph
      .nodes()
      .iter()
      .map(|node| {
        let entry = Entry {
          state: NodeState::Pending,
          attempts: 0,
          retries_left: node.retry_budget,
          unmet: node.dependencies.len(),
          error: None,
        };
        (node.id.clone(), entry)
      })
      .collect();

    let kind_permits = scheduler
      .config
      .kind_limits
      .iter()
      .map(|(kind, limit)| (*kind, Arc::new(Semaphore::new(*limit))))
      .collect();

    Self {
      config: &scheduler.config,
      notifier: &scheduler.notifier,
      graph,
      view: graph.graph(),
      execution_id,
      executor,
      attempts_cancel: cancel.child_token(),
      cancel,
      entries,
      outputs: HashMap::new(),
      ready: VecDeque::new(),
      run_permits: Arc::new(Semaphore::new(scheduler.config.max_concurrency)),
      kind_permits,
      in_flight: JoinSet::new(),
      halted: false,
      sequence: 0,
      dispatch_log: Vec::new(),
      completion_log: Vec::new(),
    }
  }

  async fn execute(mut self) -> Result<RunReport, SchedulerError> {
    info!(
      execution_id = %self.execution_id,
      tasks = self.graph.len(),
      max_concurrency = self.config.max_concurrency,
      "run_started"
    );
    self.notifier.notify(SchedulerEvent::RunStarted {
      execution_id: self.execution_id.clone(),
      tasks: self.graph.len(),
    });

    let entry_points: Vec<TaskId> = self.view.entry_points().to_vec();
    for task_id in entry_points {
      self.mark_ready(task_id);
    }

    let status = loop {
      if self.cancel.is_cancelled() {
        self.abort().await;
        break RunStatus::Cancelled;
      }
      if self.halted {
        self.abort().await;
        break RunStatus::Failed;
      }

      if let Err(e) = self.dispatch_ready() {
        self.abort().await;
        error!(execution_id = %self.execution_id, error = %e, "run_failed");
        return Err(e);
      }
      if self.halted {
        self.abort().await;
        break RunStatus::Failed;
      }

      if self.in_flight.is_empty() {
        break self.settled_status();
      }

      let joined = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => None,
        joined = self.in_flight.join_next() => joined,
      };

      if let Some(joined) = joined {
        if let Err(e) = self.apply(joined) {
          self.abort().await;
          error!(execution_id = %self.execution_id, error = %e, "run_failed");
          return Err(e);
        }
      }
    };

    Ok(self.finish(status))
  }

  /// Dispatch ready nodes until the queue is empty or the run is saturated.
  ///
  /// A node whose kind is at its limit is passed over, keeping its place,
  /// so other kinds can still use free run permits.
  fn dispatch_ready(&mut self) -> Result<(), SchedulerError> {
    let graph = self.graph;
    let mut deferred = VecDeque::new();

    while let Some(task_id) = self.ready.pop_front() {
      let Ok(run_permit) = self.run_permits.clone().try_acquire_owned() else {
        self.ready.push_front(task_id);
        break;
      };

      let node = graph
        .get(&task_id)
        .ok_or_else(|| SchedulerError::InvalidGraph {
          message: format!("ready task '{}' is not in the graph", task_id),
        })?;

      let kind_permit = match self.kind_permits.get(&node.kind) {
        Some(semaphore) => match semaphore.clone().try_acquire_owned() {
          Ok(permit) => Some(permit),
          Err(_) => {
            deferred.push_back(task_id);
            continue;
          }
        },
        None => None,
      };

      self.dispatch(node, run_permit, kind_permit)?;
      if self.halted {
        break;
      }
    }

    while let Some(task_id) = deferred.pop_back() {
      self.ready.push_front(task_id);
    }
    Ok(())
  }

  fn dispatch(
    &mut self,
    node: &TaskNode,
    run_permit: OwnedSemaphorePermit,
    kind_permit: Option<OwnedSemaphorePermit>,
  ) -> Result<(), SchedulerError> {
    let params = match resolve_params(node, &self.outputs) {
      Ok(params) => params,
      Err(message) => {
        let attempt = self.entry(&node.id)?.attempts;
        self.fail(&node.id, attempt, ExecutorError::permanent(message));
        return Ok(());
      }
    };

    let satisfied: Vec<TaskId> = node
      .dependencies
      .iter()
      .filter(|dependency| {
        self
          .entries
          .get(*dependency)
          .is_some_and(|entry| entry.state == NodeState::Succeeded)
      })
      .cloned()
      .collect();

    let entry = self.entry(&node.id)?;
    entry.attempts += 1;
    entry.state = NodeState::Running;
    let attempt = entry.attempts;

    let sequence = self.next_sequence();
    self.dispatch_log.push(DispatchRecord {
      sequence,
      task_id: node.id.clone(),
      attempt,
      satisfied,
    });

    let input = TaskInput {
      execution_id: self.execution_id.clone(),
      task_id: node.id.clone(),
      kind: node.kind,
      shard_index: node.shard_index,
      sub_index: node.sub_index,
      branch: node.branch,
      attempt,
      disk_gb: self.config.disk.size_for(node.kind.disk_tier()),
      timeout_ms: node.timeout_ms,
      params,
    };

    info!(
      execution_id = %self.execution_id,
      task_id = %node.id,
      shard_index = ?node.shard_index,
      attempt,
      "task_dispatched"
    );
    self.notifier.notify(SchedulerEvent::TaskDispatched {
      execution_id: self.execution_id.clone(),
      task_id: node.id.clone(),
      attempt,
    });

    let executor = self.executor.clone();
    let cancel = self.attempts_cancel.clone();
    let timeout_ms = node.timeout_ms;
    self.in_flight.spawn(async move {
      let _permits = (run_permit, kind_permit);
      let result = run_attempt(executor.as_ref(), &input, cancel, timeout_ms).await;
      AttemptResult {
        task_id: input.task_id,
        attempt,
        result,
      }
    });

    Ok(())
  }

  /// Apply one finished attempt to the node table.
  fn apply(
    &mut self,
    joined: Result<AttemptResult, JoinError>,
  ) -> Result<(), SchedulerError> {
    let AttemptResult {
      task_id,
      attempt,
      result,
    } = joined.map_err(|e| SchedulerError::Join {
      message: e.to_string(),
    })?;

    match result {
      Ok(output) => {
        let kind = self
          .graph
          .get(&task_id)
          .map(|node| node.kind)
          .ok_or_else(|| SchedulerError::InvalidGraph {
            message: format!("finished task '{}' is not in the graph", task_id),
          })?;
        let missing: Vec<&str> = kind
          .declared_outputs()
          .iter()
          .copied()
          .filter(|name| output.get(name).is_none())
          .collect();

        if missing.is_empty() {
          self.succeed(&task_id, attempt, output);
        } else {
          let message = format!("missing declared outputs {:?}", missing);
          self.fail(&task_id, attempt, ExecutorError::Permanent { message });
        }
      }
      Err(ExecutorError::Invariant { message }) => {
        return Err(SchedulerError::InvariantViolated { task_id, message });
      }
      Err(e) => {
        let retries_left = self.entry(&task_id)?.retries_left;
        if e.is_retryable() && retries_left > 0 {
          self.retry(&task_id, attempt, e);
        } else {
          self.fail(&task_id, attempt, e);
        }
      }
    }

    Ok(())
  }

  fn succeed(&mut self, task_id: &TaskId, attempt: u32, output: TaskOutput) {
    if let Some(entry) = self.entries.get_mut(task_id) {
      entry.state = NodeState::Succeeded;
    }
    self.record_completion(task_id, attempt, AttemptOutcome::Succeeded);
    self.outputs.insert(task_id.clone(), output);

    info!(
      execution_id = %self.execution_id,
      task_id = %task_id,
      attempt,
      "task_completed"
    );
    self.notifier.notify(SchedulerEvent::TaskSucceeded {
      execution_id: self.execution_id.clone(),
      task_id: task_id.clone(),
      attempt,
    });

    let downstream: Vec<TaskId> = self.view.downstream(task_id).to_vec();
    for next in downstream {
      let Some(entry) = self.entries.get_mut(&next) else {
        continue;
      };
      entry.unmet = entry.unmet.saturating_sub(1);
      if entry.unmet == 0 && entry.state == NodeState::Pending {
        self.mark_ready(next);
      }
    }
  }

  fn retry(&mut self, task_id: &TaskId, attempt: u32, error: ExecutorError) {
    if let Some(entry) = self.entries.get_mut(task_id) {
      entry.retries_left -= 1;
      entry.error = Some(error.to_string());
      warn!(
        execution_id = %self.execution_id,
        task_id = %task_id,
        attempt,
        retries_left = entry.retries_left,
        error = %error,
        "task_retrying"
      );
    }
    self.record_completion(task_id, attempt, AttemptOutcome::Retrying);
    self.notifier.notify(SchedulerEvent::TaskRetrying {
      execution_id: self.execution_id.clone(),
      task_id: task_id.clone(),
      attempt,
      error: error.to_string(),
    });
    self.mark_ready(task_id.clone());
  }

  /// Mark a node failed and skip everything downstream of it.
  fn fail(&mut self, task_id: &TaskId, attempt: u32, error: ExecutorError) {
    if let Some(entry) = self.entries.get_mut(task_id) {
      entry.state = NodeState::Failed;
      entry.error = Some(error.to_string());
    }
    self.record_completion(task_id, attempt, AttemptOutcome::Failed);

    error!(
      execution_id = %self.execution_id,
      task_id = %task_id,
      attempt,
      error = %error,
      "task_failed"
    );
    self.notifier.notify(SchedulerEvent::TaskFailed {
      execution_id: self.execution_id.clone(),
      task_id: task_id.clone(),
      attempt,
      error: error.to_string(),
    });

    for descendant in self.view.descendants(task_id) {
      let Some(entry) = self.entries.get_mut(&descendant) else {
        continue;
      };
      if entry.state != NodeState::Pending {
        continue;
      }
      entry.state = NodeState::Skipped;

      warn!(
        execution_id = %self.execution_id,
        task_id = %descendant,
        failed_upstream = %task_id,
        "task_skipped"
      );
      self.notifier.notify(SchedulerEvent::TaskSkipped {
        execution_id: self.execution_id.clone(),
        task_id: descendant,
        failed_upstream: task_id.clone(),
      });
    }

    if self.config.fail_fast {
      self.halted = true;
    }
  }

  fn mark_ready(&mut self, task_id: TaskId) {
    if let Some(entry) = self.entries.get_mut(&task_id) {
      entry.state = NodeState::Ready;
      debug!(task_id = %task_id, "task ready");
      self.ready.push_back(task_id);
    }
  }

  /// Cancel every attempt in flight and wait for them to wind down.
  ///
  /// Attempts that still finished successfully keep their outputs. Nodes
  /// that never reached a terminal state are reported `Cancelled`.
  async fn abort(&mut self) {
    self.attempts_cancel.cancel();
    self.in_flight.abort_all();

    while let Some(joined) = self.in_flight.join_next().await {
      if let Ok(AttemptResult {
        task_id,
        attempt,
        result: Ok(output),
      }) = joined
      {
        self.succeed(&task_id, attempt, output);
      }
    }

    let running: Vec<(TaskId, u32)> = self
      .entries
      .iter()
      .filter(|(_, entry)| entry.state == NodeState::Running)
      .map(|(task_id, entry)| (task_id.clone(), entry.attempts))
      .collect();
    for (task_id, attempt) in running {
      self.record_completion(&task_id, attempt, AttemptOutcome::Cancelled);
    }

    self.ready.clear();
    for entry in self.entries.values_mut() {
      if !entry.state.is_terminal() {
        entry.state = NodeState::Cancelled;
      }
    }
  }

  fn settled_status(&self) -> RunStatus {
    if self
      .entries
      .values()
      .all(|entry| entry.state == NodeState::Succeeded)
    {
      RunStatus::Succeeded
    } else {
      RunStatus::Failed
    }
  }

  fn finish(mut self, status: RunStatus) -> RunReport {
    let succeeded = self
      .entries
      .values()
      .filter(|entry| entry.state == NodeState::Succeeded)
      .count();

    match status {
      RunStatus::Succeeded => info!(
        execution_id = %self.execution_id,
        tasks = self.entries.len(),
        "run_completed"
      ),
      RunStatus::Failed => error!(
        execution_id = %self.execution_id,
        tasks = self.entries.len(),
        succeeded,
        "run_failed"
      ),
      RunStatus::Cancelled => warn!(
        execution_id = %self.execution_id,
        tasks = self.entries.len(),
        succeeded,
        "run_cancelled"
      ),
    }
    self.notifier.notify(SchedulerEvent::RunFinished {
      execution_id: self.execution_id.clone(),
      status,
    });

    let nodes = self
      .entries
      .drain()
      .map(|(task_id, entry)| {
        let outcome = NodeOutcome {
          state: entry.state,
          attempts: entry.attempts,
          output: self.outputs.remove(&task_id),
          error: entry.error,
        };
        (task_id, outcome)
      })
      .collect();

    RunReport {
      execution_id: self.execution_id,
      status,
      nodes,
      dispatch_log: self.dispatch_log,
      completion_log: self.completion_log,
    }
  }

  fn entry(&mut self, task_id: &TaskId) -> Result<&mut Entry, SchedulerError> {
    self
      .entries
      .get_mut(task_id)
      .ok_or_else(|| SchedulerError::InvalidGraph {
        message: format!("unknown task '{}'", task_id),
      })
  }

  fn next_sequence(&mut self) -> u64 {
    self.sequence += 1;
    self.sequence
  }

  fn record_completion(&mut self, task_id: &TaskId, attempt: u32, outcome: AttemptOutcome) {
    let sequence = self.next_sequence();
    self.completion_log.push(CompletionRecord {
      sequence,
      task_id: task_id.clone(),
      attempt,
      outcome,
    });
  }
}

/// Invoke the executor once, bounded by the node's timeout.
async fn run_attempt(
  executor: &dyn TaskExecutor,
  input: &TaskInput,
  cancel: CancellationToken,
  timeout_ms: Option<u64>,
) -> Result<TaskOutput, ExecutorError> {
  let invocation = executor.invoke(input, cancel);
  match timeout_ms {
    Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), invocation).await {
      Ok(result) => result,
      Err(_) => Err(ExecutorError::Timeout { timeout_ms: ms }),
    },
    None => invocation.await,
  }
}
