//! Indentation state machine for item/parameter blocks.
//!
//! The build tool renders item groups as text where leading-space count
//! encodes tree depth:
//!
//! ```text
//! Output Item(s):
//!     GroupName
//!         item/spec/path.cs
//!                 MetadataName=value
//!                 continuation of the previous value
//! ```
//!
//! Exactly 4 spaces is the group-name line, 8 spaces a new item (or a new
//! top-level property when the line contains `=`), 16 spaces a metadata
//! name/value pair under the current item — or, with no `=`, a continuation
//! appended verbatim to the previous metadata's value.

use crate::{split_name_value, Fragment, FragmentKind};

/// Parser states, keyed on (leading-space count, presence of `=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Next meaningful line should name the group (4 spaces).
    ExpectGroupName,
    /// Next line should be an item or property (8 spaces).
    ExpectItemOrProperty,
    /// Next line may be metadata or a value continuation (16 spaces).
    ExpectMetadataOrContinuation,
}

const GROUP_INDENT: usize = 4;
const ITEM_INDENT: usize = 8;
const METADATA_INDENT: usize = 16;

/// Parse an indented item/parameter block into a fragment tree.
///
/// `prefix` is the recognized marker the first line starts with; its
/// remainder, if any, doubles as the group name. Lines that fit no rule
/// become plain message children — the parser tolerates garbled input and
/// never fails.
pub fn parse_parameter_block(text: &str, prefix: &str) -> Fragment {
    let mut root = Fragment::new(FragmentKind::Parameter, prefix.trim_end_matches(':'));
    let mut state = ParseState::ExpectGroupName;

    let mut lines = text.lines();
    if let Some(first) = lines.next() {
        let remainder = first[prefix.len().min(first.len())..].trim();
        if !remainder.is_empty() {
            // Single-line form: the group name shares the prefix line.
            root.text = remainder.to_string();
            state = ParseState::ExpectItemOrProperty;
        }
    }

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let indent = leading_spaces(line);
        let content = &line[indent.min(line.len())..];

        match (state, indent) {
            (ParseState::ExpectGroupName, GROUP_INDENT) => {
                root.text = content.to_string();
                state = ParseState::ExpectItemOrProperty;
            }
            (_, ITEM_INDENT) => {
                match split_name_value(content) {
                    Some((name, value)) => root
                        .children
                        .push(Fragment::with_value(FragmentKind::Property, name, value)),
                    None => root.children.push(Fragment::new(FragmentKind::Item, content)),
                }
                state = ParseState::ExpectMetadataOrContinuation;
            }
            (ParseState::ExpectMetadataOrContinuation, METADATA_INDENT) => {
                let item = root
                    .children
                    .last_mut()
                    .expect("state requires a current item");
                match split_name_value(content) {
                    Some((name, value)) => item
                        .children
                        .push(Fragment::with_value(FragmentKind::Metadata, name, value)),
                    None if item.children.is_empty() => {
                        item.children.push(Fragment::new(FragmentKind::Item, content));
                    }
                    None => {
                        // Continuation: append without added whitespace.
                        let metadata = item
                            .children
                            .last_mut()
                            .expect("checked non-empty above");
                        metadata.value.push_str(content);
                    }
                }
            }
            _ => {
                // Unrecognized indentation; keep the text rather than drop it.
                root.children
                    .push(Fragment::new(FragmentKind::Message, content.trim_start()));
            }
        }
    }
    root
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}
