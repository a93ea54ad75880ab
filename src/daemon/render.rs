//! Boxed suggestion listing shown under the prompt.

use console::{measure_text_width, truncate_str};

use crate::storage::{SearchHit, SearchScope};

/// Columns reserved for the prompt and box edges.
pub const TERMINAL_MARGIN: usize = 10;
/// `│ ` + ` │`
pub const BOX_PADDING: usize = 4;
/// Entries never shrink below this, whatever the terminal claims.
const MIN_ENTRY_WIDTH: usize = 12;

const ELLIPSIS: &str = "…";
const LINE_BREAK: char = '⏎';

/// Box title, e.g. `branch main · success only`.
pub fn header(scope: SearchScope, label: Option<&str>, only_success: bool) -> String {
    let mut title = match (scope, label) {
        (SearchScope::Global, _) => "global".to_string(),
        (SearchScope::Directory, Some(dir)) if !dir.is_empty() => format!("dir {dir}"),
        (SearchScope::Directory, _) => "dir".to_string(),
        (SearchScope::Branch, Some(branch)) if !branch.is_empty() => format!("branch {branch}"),
        (SearchScope::Branch, _) => "branch".to_string(),
    };
    if only_success {
        title.push_str(" · success only");
    }
    title
}

/// Draw `hits` as a numbered list inside a rounded box.
///
/// Widths are display columns, so wide and multi-byte characters line up.
pub fn render_box(hits: &[SearchHit], title: &str, terminal_width: usize) -> String {
    let max_entry = terminal_width
        .saturating_sub(TERMINAL_MARGIN)
        .max(MIN_ENTRY_WIDTH);

    let entries: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let line = format!("{}. {}", i + 1, display_command(&hit.command));
            truncate_str(&line, max_entry, ELLIPSIS).into_owned()
        })
        .collect();
    let title = truncate_str(title, max_entry.saturating_sub(1), ELLIPSIS).into_owned();

    let title_width = measure_text_width(&title);
    let inner = entries
        .iter()
        .map(|e| measure_text_width(e))
        .max()
        .unwrap_or(0)
        .max(title_width + 1);
    let box_width = inner + BOX_PADDING;

    let mut out = String::new();
    // ╭─ title ───╮
    out.push_str("╭─ ");
    out.push_str(&title);
    out.push(' ');
    out.push_str(&"─".repeat(box_width - title_width - 5));
    out.push_str("╮\n");

    for entry in &entries {
        let pad = inner - measure_text_width(entry);
        out.push_str("│ ");
        out.push_str(entry);
        out.push_str(&" ".repeat(pad));
        out.push_str(" │\n");
    }

    out.push('╰');
    out.push_str(&"─".repeat(box_width - 2));
    out.push_str("╯\n");
    out
}

/// Control characters would break the box; show line breaks as `⏎`.
fn display_command(command: &str) -> String {
    command
        .chars()
        .filter(|c| *c != '\r')
        .map(|c| match c {
            '\n' => LINE_BREAK,
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}
