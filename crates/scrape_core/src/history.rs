use chrono::{DateTime, Utc};

use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Timestamp,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Case-insensitive term matched against id, url and requested elements.
    pub search: String,
    pub sort: SortField,
    pub direction: SortDirection,
    pub page: usize,
    pub rows_per_page: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            sort: SortField::default(),
            direction: SortDirection::default(),
            page: 0,
            rows_per_page: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryView {
    pub rows: Vec<TaskRowView>,
    /// Matching tasks before paging.
    pub total_matches: usize,
    /// Tally over the whole history, regardless of search and paging.
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn tally(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut counts, task| {
            match task.status() {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRowView {
    pub task_id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub status_label: &'static str,
    pub progress: Option<u8>,
    pub elements: Vec<String>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub downloadable: bool,
}

impl TaskRowView {
    fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id().to_string(),
            url: task.url().to_string(),
            created_at: task.created_at(),
            status: task.status(),
            status_label: status_label(task.status()),
            progress: task.progress(),
            elements: task.request().elements.clone(),
            message: task.message().map(ToOwned::to_owned),
            error: task.error().map(ToOwned::to_owned),
            downloadable: task.output_file().is_some(),
        }
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "Pending",
        TaskStatus::Running => "Running",
        TaskStatus::Completed => "Completed",
        TaskStatus::Failed => "Failed",
    }
}

/// Filters, sorts and pages the task history.
pub fn history_view(tasks: &[Task], query: &HistoryQuery) -> HistoryView {
    let term = query.search.trim().to_lowercase();
    let mut matches: Vec<&Task> = tasks
        .iter()
        .filter(|task| term.is_empty() || task_matches(task, &term))
        .collect();

    matches.sort_by(|a, b| {
        let ordering = match query.sort {
            SortField::Timestamp => a.created_at().cmp(&b.created_at()),
            SortField::Url => a.url().as_str().cmp(b.url().as_str()),
        };
        match query.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });

    let total_matches = matches.len();
    let rows = matches
        .into_iter()
        .skip(query.page.saturating_mul(query.rows_per_page))
        .take(query.rows_per_page)
        .map(TaskRowView::from_task)
        .collect();

    HistoryView {
        rows,
        total_matches,
        counts: StatusCounts::tally(tasks),
    }
}

fn task_matches(task: &Task, term: &str) -> bool {
    task.id().to_lowercase().contains(term)
        || task.url().as_str().to_lowercase().contains(term)
        || task
            .request()
            .elements
            .iter()
            .any(|element| element.to_lowercase().contains(term))
}
