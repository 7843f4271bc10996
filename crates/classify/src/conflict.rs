//! Conflict-report parser.
//!
//! Assembly-reference resolution renders conflicts with its own indentation
//! table, distinct from the general 4/8/16 item table:
//!
//! ```text
//! There was a conflict between "A, Version=1.0" and "A, Version=2.0".
//!     References which depend on "A, Version=1.0":
//!       lib/net48/First.dll
//!         Project file item includes which caused reference "First.dll".
//! ```
//!
//! 0 spaces is the conflict headline, 4 a section, 6 a reference path
//! under the section, 8 detail text under the reference.

use crate::{Fragment, FragmentKind};

const SECTION_INDENT: usize = 4;
const REFERENCE_INDENT: usize = 6;
const DETAIL_INDENT: usize = 8;

/// Parse a "There was a conflict …" report into a fragment tree.
///
/// Tolerates garbled indentation by attaching stray lines to the nearest
/// open level; never fails.
pub fn parse_conflict(text: &str) -> Fragment {
    let mut lines = text.lines();
    let headline = lines.next().unwrap_or("There was a conflict");
    let mut root = Fragment::new(FragmentKind::Folder, headline.trim_end_matches('.'));

    // Cursors into the open section/reference, tracked by index so stray
    // lines can attach to the nearest open level.
    let mut section: Option<usize> = None;
    let mut reference: Option<usize> = None;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let indent = leading_spaces(line);
        let content = line.trim_start();

        match indent {
            SECTION_INDENT => {
                root.children
                    .push(Fragment::new(FragmentKind::Item, content.trim_end_matches(':')));
                section = Some(root.children.len() - 1);
                reference = None;
            }
            REFERENCE_INDENT => {
                let node = Fragment::new(FragmentKind::Item, content);
                match section {
                    Some(s) => {
                        root.children[s].children.push(node);
                        reference = Some(root.children[s].children.len() - 1);
                    }
                    None => {
                        root.children.push(node);
                        reference = None;
                    }
                }
            }
            DETAIL_INDENT => {
                let node = Fragment::new(FragmentKind::Message, content);
                match (section, reference) {
                    (Some(s), Some(r)) => root.children[s].children[r].children.push(node),
                    (Some(s), None) => root.children[s].children.push(node),
                    (None, _) => root.children.push(node),
                }
            }
            _ => {
                root.children
                    .push(Fragment::new(FragmentKind::Message, content));
                section = None;
                reference = None;
            }
        }
    }
    root
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}
