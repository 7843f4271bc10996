//! Correlation context and timestamp types.
//!
//! Every event a build tool emits is stamped with a tuple of integer IDs
//! identifying which project/target/task/evaluation it belongs to. The tuple
//! is used purely as a mapping key during tree construction and is never
//! persisted as object identity.

use std::time::Duration;

/// Sentinel meaning "no value" for correlation id fields.
pub const NO_ID: i32 = -1;

/// Correlation context stamped on build events.
///
/// `-1` (and `0` for evaluations) mean "not applicable". Two events with the
/// same ids belong to the same logical project/target/task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Correlation {
    /// Build node that emitted the event
    pub node_id: i32,
    /// Project context (unique per project build within a node)
    pub project_context_id: i32,
    /// Project instance (shared across contexts of the same instance)
    pub project_instance_id: i32,
    /// Target instance within the project context
    pub target_id: i32,
    /// Task instance within the target
    pub task_id: i32,
    /// Project evaluation that produced the instance
    pub evaluation_id: i64,
}

impl Correlation {
    /// Context with every field set to its sentinel.
    pub fn none() -> Self {
        Correlation {
            node_id: NO_ID,
            project_context_id: NO_ID,
            project_instance_id: NO_ID,
            target_id: NO_ID,
            task_id: NO_ID,
            evaluation_id: 0,
        }
    }

    /// Whether the event carries a usable project context id.
    pub fn has_project_context(&self) -> bool {
        self.project_context_id != NO_ID && self.project_context_id != 0
    }

    /// Whether the event carries a usable target id.
    pub fn has_target(&self) -> bool {
        self.target_id != NO_ID && self.target_id != 0
    }

    /// Whether the event carries a usable task id.
    pub fn has_task(&self) -> bool {
        self.task_id != NO_ID && self.task_id != 0
    }
}

impl Default for Correlation {
    fn default() -> Self {
        Correlation::none()
    }
}

/// Microsecond-precision timestamp.
///
/// Raw microseconds since the Unix epoch; the container stores these as
/// fixed 8-byte integers so round-trips are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Construct from raw microseconds since the epoch.
    pub fn from_micros(micros: i64) -> Self {
        Timestamp(micros)
    }

    /// Raw microseconds since the epoch.
    pub fn as_micros(&self) -> i64 {
        self.0
    }

    /// Duration from `earlier` to `self`, or `None` if `earlier` is later.
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        let delta = self.0.checked_sub(earlier.0)?;
        if delta < 0 {
            return None;
        }
        Some(Duration::from_micros(delta as u64))
    }
}
