//! The scenario model: actor descriptors and worker columns.
//!
//! A scenario is a fixed grid of operations: one column of actors per
//! worker, executed sequentially within the column while the scheduler
//! interleaves across columns. Actor bodies are instrumented closures that
//! report their shared accesses through the [`WorkerHandle`] they receive.
//!
//! [`WorkerHandle`]: crate::events::WorkerHandle

use crate::events::WorkerHandle;
use crate::types::outcome::ActorValue;
use std::fmt;
use std::sync::Arc;

/// The instrumented body of an actor.
pub type ActorOp = Arc<dyn Fn(&WorkerHandle) -> ActorValue + Send + Sync>;

/// Descriptor of one operation scheduled on one worker.
#[derive(Clone)]
pub struct Actor {
    /// Display name used in failure reports.
    pub name: String,
    /// This actor legitimately blocks (suppresses obstruction-freedom
    /// reports while it runs).
    pub blocking: bool,
    /// This actor may cause other workers to block.
    pub causes_blocking: bool,
    /// The instrumented operation.
    pub op: ActorOp,
}

impl Actor {
    /// Creates a non-blocking actor.
    pub fn new(
        name: impl Into<String>,
        op: impl Fn(&WorkerHandle) -> ActorValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            blocking: false,
            causes_blocking: false,
            op: Arc::new(op),
        }
    }

    /// Marks this actor as legitimately blocking.
    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Marks this actor as one that may cause other workers to block.
    #[must_use]
    pub fn causes_blocking(mut self) -> Self {
        self.causes_blocking = true;
        self
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("blocking", &self.blocking)
            .field("causes_blocking", &self.causes_blocking)
            .finish_non_exhaustive()
    }
}

/// The fixed set of actor columns driven through interleavings.
#[derive(Clone, Debug, Default)]
pub struct Scenario {
    /// One column of actors per worker.
    pub workers: Vec<Vec<Actor>>,
}

impl Scenario {
    /// Creates an empty scenario.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a worker column.
    #[must_use]
    pub fn worker(mut self, actors: Vec<Actor>) -> Self {
        self.workers.push(actors);
        self
    }

    /// Parallel width of the scenario.
    #[must_use]
    pub fn width(&self) -> usize {
        self.workers.len()
    }
}
