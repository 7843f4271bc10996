//! Heuristic message classification for Girder
//!
//! Build tools emit diagnostics as free-form text with well-known prefixes
//! and indentation conventions. This crate inspects a message and, when it
//! recognizes the shape, converts it into a structured fragment tree the
//! tree builder materializes instead of an opaque text node.
//!
//! Classification never fails: anything ambiguous or garbled falls back to
//! a plain message.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod conflict;
mod indent;

pub use indent::{parse_parameter_block, ParseState};

/// Context for task-specific sub-classifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageContext<'a> {
    /// Name of the task the message was emitted under, if any.
    pub task_name: Option<&'a str>,
}

/// Kind of one node in a classified fragment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// A named parameter/item group
    Parameter,
    /// An item spec (usually a path)
    Item,
    /// Metadata name/value under an item
    Metadata,
    /// Property name/value
    Property,
    /// A grouping folder
    Folder,
    /// Unstructured child text
    Message,
}

/// One node of a classified message, materialized into tree nodes by the
/// construction engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Node kind
    pub kind: FragmentKind,
    /// Node text (`name` or `name=value` already split by the parser:
    /// for Metadata and Property the text is the name and `value` holds
    /// the value)
    pub text: String,
    /// Value for Metadata/Property nodes, empty otherwise
    pub value: String,
    /// Child fragments in input order
    pub children: Vec<Fragment>,
}

impl Fragment {
    fn new(kind: FragmentKind, text: impl Into<String>) -> Self {
        Fragment {
            kind,
            text: text.into(),
            value: String::new(),
            children: Vec::new(),
        }
    }

    fn with_value(kind: FragmentKind, text: impl Into<String>, value: impl Into<String>) -> Self {
        Fragment {
            kind,
            text: text.into(),
            value: value.into(),
            children: Vec::new(),
        }
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// No recognized structure; keep the message as-is.
    Plain,
    /// `Using task "X" from assembly "Y"` — a task-to-assembly fact the
    /// builder records in its task-location map.
    UsingTask {
        /// Task name
        task_name: String,
        /// Assembly path or name the task was loaded from
        assembly: String,
    },
    /// A package-restore phase marker; consecutive restore messages fold
    /// into a folder named after the phase.
    RestorePhase {
        /// Phase title (first line of the message)
        phase: String,
    },
    /// A structured fragment tree.
    Fragment(Fragment),
}

/// Prefixes that introduce an indented item/parameter block.
const PARAMETER_PREFIXES: &[&str] = &[
    "Output Item(s):",
    "Task Parameter:",
    "Added Item(s):",
    "Removed Item(s):",
];

/// Prefixes that introduce a property block under a nested-build task.
const PROPERTY_BLOCK_PREFIXES: &[&str] = &[
    "Global Properties:",
    "Additional Properties:",
    "Overriding Global Properties:",
    "Removing Properties:",
];

/// Package-restore phase markers.
const RESTORE_PREFIXES: &[&str] = &["Restoring ", "Restored ", "Committing restore..."];

/// Classify one raw message.
///
/// Dispatch is prefix-based; each recognized prefix maps to a dedicated
/// parser that turns indentation into tree depth. Unrecognized text under a
/// recognized task stays plain.
pub fn classify(text: &str, ctx: &MessageContext) -> Classified {
    let first_line = text.lines().next().unwrap_or("");

    if let Some(rest) = first_line.strip_prefix("Using task \"") {
        if let Some(fact) = parse_using_task(rest) {
            return fact;
        }
        return Classified::Plain;
    }

    if first_line.starts_with("There was a conflict") {
        return Classified::Fragment(conflict::parse_conflict(text));
    }

    for prefix in PARAMETER_PREFIXES {
        if first_line.starts_with(prefix) {
            return Classified::Fragment(parse_parameter_block(text, prefix));
        }
    }

    if let Some(rest) = first_line.strip_prefix("Set Property:") {
        return Classified::Fragment(parse_single_property(rest));
    }
    if let Some(rest) = first_line.strip_prefix("Removed Property:") {
        return Classified::Fragment(Fragment::new(FragmentKind::Property, rest.trim()));
    }

    // Property blocks only occur under nested-build tasks; elsewhere the
    // same words are likely ordinary prose.
    if ctx.task_name.is_some() {
        for prefix in PROPERTY_BLOCK_PREFIXES {
            if first_line.trim_start().starts_with(prefix) {
                return Classified::Fragment(parse_property_block(text, prefix));
            }
        }
    }

    for prefix in RESTORE_PREFIXES {
        if first_line.starts_with(prefix) {
            return Classified::RestorePhase {
                phase: restore_phase_title(first_line),
            };
        }
    }

    Classified::Plain
}

/// Split a line at the first usable `=`.
///
/// Precedence: a `=` at position 0 (empty name) does not split; the first
/// remaining `=` does; values containing further `=` characters are kept
/// verbatim. Returns `None` when the line has no usable separator.
pub fn split_name_value(line: &str) -> Option<(&str, &str)> {
    let idx = line.find('=')?;
    if idx == 0 {
        return None;
    }
    Some((&line[..idx], &line[idx + 1..]))
}

fn parse_using_task(rest: &str) -> Option<Classified> {
    // rest is everything after `Using task "`.
    let quote = rest.find('"')?;
    let task_name = &rest[..quote];
    let tail = &rest[quote + 1..];
    let assembly_intro = tail.find("from assembly \"")?;
    let after = &tail[assembly_intro + "from assembly \"".len()..];
    let end = after.rfind('"')?;
    Some(Classified::UsingTask {
        task_name: task_name.to_string(),
        assembly: after[..end].to_string(),
    })
}

fn parse_single_property(rest: &str) -> Fragment {
    let trimmed = rest.trim();
    match split_name_value(trimmed) {
        Some((name, value)) => Fragment::with_value(FragmentKind::Property, name, value),
        None => Fragment::new(FragmentKind::Property, trimmed),
    }
}

fn parse_property_block(text: &str, prefix: &str) -> Fragment {
    let title = prefix.trim_end_matches(':');
    let mut root = Fragment::new(FragmentKind::Folder, title);
    for line in text.lines().skip(1) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match split_name_value(trimmed) {
            Some((name, value)) => root
                .children
                .push(Fragment::with_value(FragmentKind::Property, name, value)),
            None => root.children.push(Fragment::new(FragmentKind::Item, trimmed)),
        }
    }
    root
}

fn restore_phase_title(first_line: &str) -> String {
    first_line.trim_end_matches('.').trim().to_string()
}
