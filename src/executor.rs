//! Dependency-ordered step execution.
//!
//! The host build tool wires packaging tasks together with implicit
//! `dependsOn` edges; here that wiring is an explicit [`TaskGraph`] of
//! named steps with declared predecessors. The graph is validated up front
//! (unknown predecessors, duplicate names, cycles) and then executed with:
//! - Blocking jobs on `tokio::task::spawn_blocking`
//! - A `Semaphore` bound on parallelism (default 1: strictly sequential)
//! - An optional per-step timeout
//!
//! A step runs only after every one of its predecessors has completed
//! successfully; the first failure stops all further scheduling.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, warn};

/// Boxed blocking job body. Jobs report failure through a boxed error so
/// heterogeneous steps can share one graph.
pub type StepJob = Box<dyn FnOnce() -> Result<(), BoxedStepError> + Send + 'static>;

pub type BoxedStepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structural problems detected before any step runs.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Step '{0}' is registered twice")]
    DuplicateStep(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Task graph contains a dependency cycle involving '{0}'")]
    Cycle(String),
}

/// Failure of one step at execution time.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Step '{step}' failed: {source}")]
    Failed {
        step: String,
        source: BoxedStepError,
    },

    #[error("Step '{step}' timed out after {timeout_secs}s")]
    Timeout { step: String, timeout_secs: u64 },

    #[error("Step '{step}' panicked or was cancelled: {message}")]
    Join { step: String, message: String },
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Step(#[from] StepError),
}

/// One completed step, for reporting.
#[derive(Debug, Clone)]
pub struct CompletedStep {
    pub name: String,
    pub duration_ms: u64,
}

struct Step {
    name: String,
    deps: Vec<String>,
    job: StepJob,
}

/// A directed acyclic graph of named build steps.
pub struct TaskGraph {
    steps: Vec<Step>,
    concurrency: usize,
    step_timeout: Option<Duration>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    /// Creates an empty graph. Execution is sequential unless raised via
    /// [`TaskGraph::with_concurrency`].
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            concurrency: 1,
            step_timeout: None,
        }
    }

    /// Bounds how many steps may run at once. Steps are only eligible when
    /// all their predecessors completed, so a bound above 1 parallelizes
    /// independent steps only.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Applies a wall-clock timeout to every step.
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = Some(step_timeout);
        self
    }

    /// Registers a step that runs after every step named in `deps`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        deps: impl IntoIterator<Item = impl Into<String>>,
        job: StepJob,
    ) {
        self.steps.push(Step {
            name: name.into(),
            deps: deps.into_iter().map(Into::into).collect(),
            job,
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validates the graph and runs every step in dependency order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] without running anything when the graph is
    /// malformed; returns the first [`StepError`] otherwise. Steps whose
    /// predecessors failed are never started.
    pub async fn run(self) -> Result<Vec<CompletedStep>, ExecutionError> {
        let TaskGraph {
            steps,
            concurrency,
            step_timeout,
        } = self;

        validate(&steps)?;

        let total = steps.len();
        info!(steps = total, concurrency, "Executing task graph");

        let index_of: HashMap<String, usize> = steps
            .iter()
            .enumerate()
            .map(|(index, step)| (step.name.clone(), index))
            .collect();
        let dep_indices: Vec<Vec<usize>> = steps
            .iter()
            .map(|step| step.deps.iter().map(|dep| index_of[dep]).collect())
            .collect();

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut pending: Vec<Option<Step>> = steps.into_iter().map(Some).collect();
        let mut done: HashSet<usize> = HashSet::new();
        let mut running: HashSet<usize> = HashSet::new();
        let mut completed: Vec<CompletedStep> = Vec::with_capacity(total);
        let mut tasks: JoinSet<(String, u64, Result<(), StepError>)> = JoinSet::new();

        while done.len() < total {
            // Launch every step whose predecessors have all completed.
            for index in 0..total {
                if pending[index].is_none() || running.contains(&index) {
                    continue;
                }
                if !dep_indices[index].iter().all(|dep| done.contains(dep)) {
                    continue;
                }

                let step = pending[index].take().expect("step launched twice");
                running.insert(index);

                let semaphore = Arc::clone(&semaphore);
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore closed while graph is running");

                    let name = step.name;
                    let job = step.job;
                    let start = std::time::Instant::now();
                    info!(step = %name, "Step started");

                    let handle = tokio::task::spawn_blocking(job);
                    let joined = match step_timeout {
                        Some(limit) => match timeout(limit, handle).await {
                            Ok(joined) => joined,
                            Err(_) => {
                                let result = Err(StepError::Timeout {
                                    step: name.clone(),
                                    timeout_secs: limit.as_secs(),
                                });
                                return (name, start.elapsed().as_millis() as u64, result);
                            }
                        },
                        None => handle.await,
                    };

                    let result = match joined {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(source)) => Err(StepError::Failed {
                            step: name.clone(),
                            source,
                        }),
                        Err(join_error) => Err(StepError::Join {
                            step: name.clone(),
                            message: join_error.to_string(),
                        }),
                    };
                    (name, start.elapsed().as_millis() as u64, result)
                });
            }

            let (name, duration_ms, result) = tasks
                .join_next()
                .await
                .expect("graph has unfinished steps but no running tasks")
                .map_err(|join_error| StepError::Join {
                    step: "<unknown>".to_string(),
                    message: join_error.to_string(),
                })?;

            let index = index_of[&name];
            running.remove(&index);

            match result {
                Ok(()) => {
                    info!(step = %name, duration_ms, "Step completed");
                    done.insert(index);
                    completed.push(CompletedStep { name, duration_ms });
                }
                Err(error) => {
                    warn!(step = %name, "Step failed; aborting remaining steps");
                    tasks.shutdown().await;
                    return Err(error.into());
                }
            }
        }

        Ok(completed)
    }
}

fn validate(steps: &[Step]) -> Result<(), GraphError> {
    let mut names: HashSet<&str> = HashSet::new();
    for step in steps {
        if !names.insert(step.name.as_str()) {
            return Err(GraphError::DuplicateStep(step.name.clone()));
        }
    }

    for step in steps {
        for dep in &step.deps {
            if !names.contains(dep.as_str()) {
                return Err(GraphError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Kahn's algorithm; whatever cannot be ordered sits on a cycle.
    let index_of: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(index, step)| (step.name.as_str(), index))
        .collect();
    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (index, step) in steps.iter().enumerate() {
        for dep in &step.deps {
            in_degree[index] += 1;
            dependents[index_of[dep.as_str()]].push(index);
        }
    }

    let mut ready: Vec<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| index)
        .collect();
    let mut ordered = 0;
    while let Some(index) = ready.pop() {
        ordered += 1;
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if ordered < steps.len() {
        let stuck = in_degree
            .iter()
            .position(|degree| *degree > 0)
            .expect("unordered step must have remaining in-degree");
        return Err(GraphError::Cycle(steps[stuck].name.clone()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_job(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> StepJob {
        let log = Arc::clone(log);
        Box::new(move || {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_steps_run_in_dependency_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = TaskGraph::new();
        graph.register("merge", ["package:a", "package:b"], recording_job(&log, "merge"));
        graph.register("package:a", ["fetch"], recording_job(&log, "a"));
        graph.register("package:b", ["fetch"], recording_job(&log, "b"));
        graph.register("fetch", Vec::<String>::new(), recording_job(&log, "fetch"));

        let completed = graph.run().await.unwrap();
        assert_eq!(completed.len(), 4);

        let order = log.lock().unwrap().clone();
        assert_eq!(order[0], "fetch");
        assert_eq!(order[3], "merge");
    }

    #[tokio::test]
    async fn test_unknown_dependency_rejected() {
        let mut graph = TaskGraph::new();
        graph.register("merge", ["missing"], Box::new(|| Ok(())));

        let err = graph.run().await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Graph(GraphError::UnknownDependency { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_step_rejected() {
        let mut graph = TaskGraph::new();
        graph.register("fetch", Vec::<String>::new(), Box::new(|| Ok(())));
        graph.register("fetch", Vec::<String>::new(), Box::new(|| Ok(())));

        let err = graph.run().await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Graph(GraphError::DuplicateStep(_))
        ));
    }

    #[tokio::test]
    async fn test_cycle_rejected() {
        let mut graph = TaskGraph::new();
        graph.register("a", ["b"], Box::new(|| Ok(())));
        graph.register("b", ["a"], Box::new(|| Ok(())));

        let err = graph.run().await.unwrap_err();
        assert!(matches!(err, ExecutionError::Graph(GraphError::Cycle(_))));
    }

    #[tokio::test]
    async fn test_failure_skips_dependents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = TaskGraph::new();
        graph.register(
            "fetch",
            Vec::<String>::new(),
            Box::new(|| Err("boom".into())),
        );
        graph.register("package:a", ["fetch"], recording_job(&log, "a"));

        let err = graph.run().await.unwrap_err();
        match err {
            ExecutionError::Step(StepError::Failed { step, .. }) => assert_eq!(step, "fetch"),
            other => panic!("expected step failure, got {other}"),
        }
        assert!(log.lock().unwrap().is_empty(), "dependent must not run");
    }

    #[tokio::test]
    async fn test_bounded_parallel_execution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = TaskGraph::new().with_concurrency(4);
        for name in ["package:a", "package:b", "package:c"] {
            graph.register(name, Vec::<String>::new(), recording_job(&log, name));
        }
        graph.register(
            "merge",
            ["package:a", "package:b", "package:c"],
            recording_job(&log, "merge"),
        );

        let completed = graph.run().await.unwrap();
        assert_eq!(completed.len(), 4);
        assert_eq!(*log.lock().unwrap().last().unwrap(), "merge");
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let mut graph = TaskGraph::new().with_step_timeout(Duration::from_millis(50));
        graph.register(
            "slow",
            Vec::<String>::new(),
            Box::new(|| {
                std::thread::sleep(Duration::from_secs(5));
                Ok(())
            }),
        );

        let err = graph.run().await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Step(StepError::Timeout { step, .. }) if step == "slow"
        ));
    }
}
