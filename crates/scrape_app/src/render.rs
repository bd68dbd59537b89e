//! Plain-text rendering of views for the terminal.
use std::fmt::Write as _;

use scrape_client::ProgressNotice;
use scrape_core::{
    Cell, ElementSummary, FieldProjection, HistoryView, ProjectionBody, ShapeKind, Task,
    TaskState, UpdateOutcome,
};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn element_summary(url: &str, summary: &ElementSummary) -> String {
    let mut out = format!("Elements found on {url}:\n");
    for (category, count) in summary.counts() {
        let marker = if *count > 0 { " " } else { "-" };
        let _ = writeln!(out, " {marker} {category:<20} {count:>6}");
    }
    if summary.is_empty() {
        out.push_str("Nothing selectable; try again with --dynamic.\n");
    }
    out
}

pub fn history(view: &HistoryView) -> String {
    if view.rows.is_empty() {
        return "No tasks recorded.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<38} {:<19} {:<10} {:>5}  URL",
        "ID", "CREATED", "STATUS", "%"
    );
    for row in &view.rows {
        let progress = row
            .progress
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        let _ = writeln!(
            out,
            "{:<38} {:<19} {:<10} {:>5}  {}",
            row.task_id,
            row.created_at.format(TIME_FORMAT),
            row.status_label,
            progress,
            row.url
        );
        if let Some(error) = &row.error {
            let _ = writeln!(out, "    error: {error}");
        }
    }
    let _ = writeln!(
        out,
        "{} of {} matching task(s)",
        view.rows.len(),
        view.total_matches
    );
    let counts = view.counts;
    let _ = writeln!(
        out,
        "History: {} completed, {} running, {} pending, {} failed",
        counts.completed, counts.running, counts.pending, counts.failed
    );
    out
}

pub fn task_header(task: &Task, download: Option<&str>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task     {}", task.id());
    let _ = writeln!(out, "URL      {}", task.url());
    let _ = writeln!(out, "Created  {}", task.created_at().format(TIME_FORMAT));
    let _ = writeln!(out, "Elements {}", task.request().elements.join(", "));
    let _ = writeln!(out, "Format   {}", task.request().output_format.wire_label());
    match task.state() {
        TaskState::Running { progress } => {
            let _ = writeln!(out, "Status   running ({progress}%)");
        }
        TaskState::Failed { error } => {
            let _ = writeln!(out, "Status   failed: {error}");
        }
        TaskState::Completed { result: None } => {
            let _ = writeln!(out, "Status   completed (result not fetched yet, try refresh)");
        }
        other => {
            let _ = writeln!(out, "Status   {}", other.status());
        }
    }
    if let Some(message) = task.message() {
        let _ = writeln!(out, "Message  {message}");
    }
    if let Some(link) = download {
        let _ = writeln!(out, "Download {link}");
    }
    out
}

/// Links are wrapped in angle brackets so they stand out from plain text.
fn cell(cell: &Cell) -> String {
    if cell.link {
        format!("<{}>", cell.text)
    } else {
        cell.text.clone()
    }
}

fn kind_label(kind: ShapeKind) -> &'static str {
    match kind {
        ShapeKind::Scalar => "value",
        ShapeKind::ScalarList => "list",
        ShapeKind::RecordList => "records",
        ShapeKind::Record => "record",
    }
}

pub fn structured(fields: &[FieldProjection]) -> String {
    if fields.is_empty() {
        return "No fields selected.\n".to_string();
    }

    let mut out = String::new();
    for field in fields {
        let count = match field.kind {
            ShapeKind::ScalarList | ShapeKind::RecordList => {
                format!(", {} of {}", field.shown(), field.total)
            }
            ShapeKind::Scalar | ShapeKind::Record => String::new(),
        };
        let _ = writeln!(out, "== {} ({}{count})", field.name, kind_label(field.kind));

        match &field.body {
            ProjectionBody::Scalar(value) => {
                let _ = writeln!(out, "{}", cell(value));
            }
            ProjectionBody::List(items) => {
                for item in items {
                    let _ = writeln!(out, "  - {}", cell(item));
                }
            }
            ProjectionBody::Table { columns, rows } => {
                let _ = writeln!(out, "  {}", columns.join(" | "));
                for row in rows {
                    let line: Vec<String> = row.iter().map(cell).collect();
                    let _ = writeln!(out, "  {}", line.join(" | "));
                }
            }
            ProjectionBody::Cards(cards) => {
                for (index, card) in cards.iter().enumerate() {
                    if index > 0 {
                        out.push_str("  --\n");
                    }
                    for (key, value) in card {
                        let _ = writeln!(out, "  {key}: {}", cell(value));
                    }
                }
            }
            ProjectionBody::Record(pairs) => {
                for (key, value) in pairs {
                    let _ = writeln!(out, "  {key}: {}", cell(value));
                }
            }
        }
    }
    out
}

pub fn notice(notice: &ProgressNotice) -> String {
    match notice {
        ProgressNotice::Opened { task_id } => format!("[{task_id}] following progress"),
        ProgressNotice::Updated {
            task_id,
            status,
            progress,
            outcome,
        } => {
            let progress = progress.map(|p| format!(" {p}%")).unwrap_or_default();
            format!("[{task_id}] {status}{progress}{}", outcome_suffix(outcome))
        }
        ProgressNotice::Finished {
            task_id,
            status,
            outcome,
        } => format!("[{task_id}] finished: {status}{}", outcome_suffix(outcome)),
        ProgressNotice::StreamLost { task_id, error } => {
            format!("[{task_id}] {error}")
        }
    }
}

fn outcome_suffix(outcome: &UpdateOutcome) -> String {
    match outcome {
        UpdateOutcome::Applied => String::new(),
        UpdateOutcome::UnknownTask => " (not in history)".to_string(),
        UpdateOutcome::Rejected(reason) => format!(" (ignored: {reason})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scrape_core::{ListMode, ResultView};
    use serde_json::json;

    fn view(value: serde_json::Value) -> ResultView {
        ResultView::new(value.as_object().unwrap())
    }

    #[test]
    fn structured_marks_links_and_counts_items() {
        let mut view = view(json!({
            "Titres": ["Alpha", "Beta", "Gamma"],
            "Liens": [{"texte": "Doc", "href": "https://example.com/doc"}],
        }));
        view.set_filter("ET");

        assert_eq!(
            structured(&view.structured()),
            "== Titres (list, 1 of 3)\n  - Beta\n\
             == Liens (records, 0 of 1)\n  texte | href\n"
        );

        view.set_filter("");
        view.set_list_mode(ListMode::Cards);
        view.select_fields(["Liens"]);
        assert_eq!(
            structured(&view.structured()),
            "== Liens (records, 1 of 1)\n  texte: Doc\n  href: <https://example.com/doc>\n"
        );
    }

    #[test]
    fn probe_summary_hints_dynamic_rendering_when_empty() {
        let summary = ElementSummary::from_counts([("Images".to_string(), 0)]);
        let text = element_summary("https://example.com", &summary);
        assert!(text.contains("- Images"));
        assert!(text.contains("--dynamic"));
    }

    #[test]
    fn header_hints_refresh_when_result_is_missing() {
        use scrape_core::{RequestConfig, StatusPatch, StoreSettings, TaskStatus, TaskStore};

        let mut store = TaskStore::in_memory(StoreSettings::default());
        store.upsert(Task::submitted(
            "t-1",
            url::Url::parse("https://example.com").unwrap(),
            RequestConfig::default(),
        ));
        store.update_status("t-1", TaskStatus::Completed, StatusPatch::default());

        let header = task_header(store.get("t-1").unwrap(), None);
        assert!(header.contains("completed (result not fetched yet, try refresh)"));
    }

    #[test]
    fn empty_history_says_so() {
        assert_eq!(history(&HistoryView::default()), "No tasks recorded.\n");
    }
}
