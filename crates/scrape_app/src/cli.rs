use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use scrape_core::{OutputFormat, SortField, DEFAULT_MAX_PAGES};

#[derive(Parser, Debug)]
#[command(name = "scrape", version, about = "Submit and follow web extraction jobs")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Config file (default: ./scrape.ron when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the extraction API.
    #[arg(long, global = true)]
    pub api: Option<String>,

    /// Base URL of the status streams.
    #[arg(long, global = true)]
    pub ws: Option<String>,

    /// Directory holding the task history and the log file.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Keep pending and running tasks when the history is full.
    #[arg(long, global = true)]
    pub pin_active: bool,

    /// Also log to the terminal, at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the element categories found on a page.
    Probe { url: String },
    /// Start an extraction job.
    Submit(SubmitArgs),
    /// Follow a running task until it finishes.
    Watch { task_id: String },
    /// Ask the service to abort a running task and wait for its answer.
    Cancel { task_id: String },
    /// List recorded tasks.
    History(HistoryArgs),
    /// Show one task and its result.
    Show(ShowArgs),
    /// Fetch the current status of a task from the service.
    Refresh { task_id: String },
    /// Forget one task.
    Remove { task_id: String },
    /// Forget every task.
    Clear,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    pub url: String,

    /// Element category to extract; repeat for several.
    #[arg(short, long = "element", required = true)]
    pub elements: Vec<String>,

    /// Render the page in a browser before extracting.
    #[arg(long)]
    pub dynamic: bool,

    /// Follow "next page" links.
    #[arg(long)]
    pub paginate: bool,

    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,

    /// json, csv, excel or text.
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// Stay attached and print progress until the task finishes.
    #[arg(long)]
    pub follow: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    Timestamp,
    Url,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Timestamp => SortField::Timestamp,
            SortArg::Url => SortField::Url,
        }
    }
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(long, default_value = "")]
    pub search: String,

    #[arg(long, value_enum, default_value_t = SortArg::Timestamp)]
    pub sort: SortArg,

    /// Oldest (or A to Z) first.
    #[arg(long)]
    pub asc: bool,

    /// Zero-based page.
    #[arg(long, default_value_t = 0)]
    pub page: usize,

    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub task_id: String,

    /// Print the full result as JSON.
    #[arg(long)]
    pub raw: bool,

    /// Keep only list items containing this text.
    #[arg(long)]
    pub filter: Option<String>,

    /// Field to show; repeat for several. Defaults to all.
    #[arg(long = "field")]
    pub fields: Vec<String>,

    /// Print record lists as key/value cards instead of tables.
    #[arg(long)]
    pub cards: bool,
}
