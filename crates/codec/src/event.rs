//! Typed build-event payloads.
//!
//! One variant per record kind the container carries. Optional strings are
//! `None` when the writer emitted the null string index; round-trips
//! preserve the distinction between `None` and `Some("")`.

use girder_core::{Correlation, Timestamp};

/// An item spec with cloned metadata, as reported by the build tool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemPayload {
    /// Item specification (usually a file path)
    pub spec: String,
    /// Metadata name/value pairs, in reported order
    pub metadata: Vec<(String, String)>,
}

/// Relative importance of a message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageImportance {
    /// Always shown
    High,
    /// Default
    Normal,
    /// Diagnostic-level detail
    Low,
}

impl MessageImportance {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            MessageImportance::High => 0,
            MessageImportance::Normal => 1,
            MessageImportance::Low => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageImportance::High,
            2 => MessageImportance::Low,
            _ => MessageImportance::Normal,
        }
    }
}

/// Location and code shared by warning and error diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Correlation context of the originating node
    pub correlation: Correlation,
    /// Event time
    pub timestamp: Timestamp,
    /// Diagnostic code (e.g. `CS1002`), if any
    pub code: Option<String>,
    /// Source file, if any
    pub file: Option<String>,
    /// 1-based line, 0 when unknown
    pub line: u32,
    /// 1-based column, 0 when unknown
    pub column: u32,
    /// Diagnostic text
    pub text: String,
}

/// One decoded build event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// The build began
    BuildStarted {
        /// Event time
        timestamp: Timestamp,
    },
    /// The build completed
    BuildFinished {
        /// Event time
        timestamp: Timestamp,
        /// Overall build outcome
        succeeded: bool,
    },
    /// A project build began
    ProjectStarted {
        /// Correlation context (project context id identifies the instance)
        correlation: Correlation,
        /// Context id of the parent project, `-1` for top-level builds
        parent_project_context_id: i32,
        /// Event time
        timestamp: Timestamp,
        /// Full path of the project file
        project_file: String,
        /// Semicolon-separated entry target names, if any
        target_names: Option<String>,
        /// Global property snapshot taken at project start
        global_properties: Vec<(String, String)>,
        /// Property snapshot taken at project start
        properties: Vec<(String, String)>,
    },
    /// A project build completed
    ProjectFinished {
        /// Context id of the finished project
        project_context_id: i32,
        /// Event time
        timestamp: Timestamp,
        /// Project outcome
        succeeded: bool,
    },
    /// A target began
    TargetStarted {
        /// Correlation context (target id identifies the instance)
        correlation: Correlation,
        /// Event time
        timestamp: Timestamp,
        /// Target name
        target_name: String,
        /// Name of the target that caused this one to run, if determinable
        parent_target: Option<String>,
        /// File that declared the target, if known
        source_file: Option<String>,
    },
    /// A target completed
    TargetFinished {
        /// Correlation context
        correlation: Correlation,
        /// Event time
        timestamp: Timestamp,
        /// Target name
        target_name: String,
        /// Target outcome
        succeeded: bool,
        /// Output items reported by the target
        outputs: Vec<ItemPayload>,
    },
    /// A task began
    TaskStarted {
        /// Correlation context (task id identifies the instance)
        correlation: Correlation,
        /// Event time
        timestamp: Timestamp,
        /// Task name
        task_name: String,
        /// File that invoked the task, if known
        source_file: Option<String>,
        /// 1-based line of the invocation, 0 when unknown
        line: u32,
    },
    /// A task completed
    TaskFinished {
        /// Correlation context
        correlation: Correlation,
        /// Event time
        timestamp: Timestamp,
        /// Task name
        task_name: String,
        /// Task outcome
        succeeded: bool,
    },
    /// A free-form diagnostic message
    Message {
        /// Correlation context
        correlation: Correlation,
        /// Event time
        timestamp: Timestamp,
        /// Message importance
        importance: MessageImportance,
        /// Message text
        text: String,
    },
    /// A build warning
    Warning(Diagnostic),
    /// A build error
    Error(Diagnostic),
    /// Custom/extended event escape hatch
    Extended {
        /// Correlation context
        correlation: Correlation,
        /// Event time
        timestamp: Timestamp,
        /// Event type discriminator chosen by the emitter
        event_type: String,
        /// Arbitrary name/value fields
        fields: Vec<(String, String)>,
        /// Free-form text, if any
        text: Option<String>,
    },
    /// Embedded binary payload (e.g. a source file snapshot)
    Blob {
        /// Blob name (usually a path)
        name: String,
        /// Raw bytes
        bytes: Vec<u8>,
    },
}
