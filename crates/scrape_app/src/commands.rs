use std::sync::Arc;

use anyhow::{bail, Context};
use scrape_client::{
    refresh_task, ExtractionWorkflow, HttpScrapeApi, ProgressNotice, RonFileStorage, SubmitError,
    SubmissionClient, WsConnector,
};
use scrape_core::{
    history_view, HistoryQuery, JobRequest, ListMode, ResultView, SortDirection, TaskStore,
    UpdateOutcome,
};
use scrape_logging::{scrape_info, scrape_warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::{Command, HistoryArgs, ShowArgs, SubmitArgs};
use crate::config::AppConfig;
use crate::render;

pub async fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let storage = RonFileStorage::open(config.state_dir.clone())
        .with_context(|| format!("opening task history in {}", config.state_dir.display()))?;
    let mut store = TaskStore::hydrate(Box::new(storage), config.store);

    match command {
        Command::Probe { url } => probe(config, &url).await,
        Command::Submit(args) => submit(config, &mut store, args).await,
        Command::Watch { task_id } => watch(config, &mut store, &task_id).await,
        Command::Cancel { task_id } => cancel(config, &mut store, &task_id).await,
        Command::History(args) => {
            print!("{}", render::history(&history_view(store.list(), &query(args))));
            Ok(())
        }
        Command::Show(args) => show(config, &store, &args),
        Command::Refresh { task_id } => refresh(config, &mut store, &task_id).await,
        Command::Remove { task_id } => {
            if store.remove(&task_id).is_none() {
                bail!("no task {task_id} in history");
            }
            println!("Removed {task_id}");
            Ok(())
        }
        Command::Clear => {
            let count = store.len();
            store.clear();
            println!("Removed {count} task(s)");
            Ok(())
        }
    }
}

fn workflow(config: &AppConfig) -> anyhow::Result<ExtractionWorkflow> {
    let api = HttpScrapeApi::new(config.client.clone())?;
    let connector = WsConnector::new(&config.client);
    Ok(ExtractionWorkflow::new(Arc::new(api), Arc::new(connector)))
}

async fn probe(config: &AppConfig, url: &str) -> anyhow::Result<()> {
    let api = HttpScrapeApi::new(config.client.clone())?;
    let summary = SubmissionClient::new(Arc::new(api))
        .probe(url, &CancellationToken::new())
        .await?;
    print!("{}", render::element_summary(url, &summary));
    Ok(())
}

async fn submit(config: &AppConfig, store: &mut TaskStore, args: SubmitArgs) -> anyhow::Result<()> {
    let mut request = JobRequest::new(args.url, args.elements);
    request.use_dynamic_rendering = args.dynamic;
    request.paginate = args.paginate;
    request.max_pages = args.max_pages;
    request.output_format = args.format;

    let mut workflow = workflow(config)?;
    let task_id = match workflow.submit(store, &request).await {
        Ok(task_id) => task_id,
        Err(SubmitError::Submission(err)) => {
            bail!("the service refused the job: {}", err.upstream_message())
        }
        Err(err) => return Err(err.into()),
    };
    println!("Submitted task {task_id}");

    if args.follow {
        follow(&mut workflow, store).await;
    }
    workflow.shutdown().await;
    Ok(())
}

async fn watch(config: &AppConfig, store: &mut TaskStore, task_id: &str) -> anyhow::Result<()> {
    if already_finished(store, task_id)? {
        return Ok(());
    }

    let mut workflow = workflow(config)?;
    workflow.resubscribe(store, task_id);
    follow(&mut workflow, store).await;
    workflow.shutdown().await;
    Ok(())
}

async fn cancel(config: &AppConfig, store: &mut TaskStore, task_id: &str) -> anyhow::Result<()> {
    if already_finished(store, task_id)? {
        return Ok(());
    }

    let mut workflow = workflow(config)?;
    workflow.resubscribe(store, task_id);
    if !workflow.cancel(task_id) {
        bail!("could not reach the status stream of {task_id}");
    }
    println!("Cancellation of {task_id} requested");
    follow(&mut workflow, store).await;
    workflow.shutdown().await;
    Ok(())
}

fn already_finished(store: &TaskStore, task_id: &str) -> anyhow::Result<bool> {
    let task = store
        .get(task_id)
        .with_context(|| format!("no task {task_id} in history"))?;
    if task.status().is_terminal() {
        println!("Task {task_id} already {}", task.status());
        return Ok(true);
    }
    Ok(false)
}

/// Prints progress until every followed stream has ended or ctrl-c is hit.
/// A lost stream falls back to one status lookup.
async fn follow(workflow: &mut ExtractionWorkflow, store: &mut TaskStore) {
    let interrupt = interrupt_on_ctrl_c(workflow.hub().cancel_handle());

    while let Some(notice) = workflow.next_notice(store).await {
        println!("{}", render::notice(&notice));
        if let ProgressNotice::StreamLost { task_id, .. } = &notice {
            match workflow.refresh(store, task_id).await {
                Ok(_) => {
                    if let Some(task) = store.get(task_id) {
                        println!("[{task_id}] last known status: {}", task.status());
                    }
                }
                Err(err) => scrape_warn!("Status lookup for {} failed: {}", task_id, err),
            }
        }
    }

    interrupt.abort();
    if workflow.hub().liveness().is_cancelled() {
        scrape_info!("Stopped following on interrupt");
        println!("Stopped following; the task keeps running on the service.");
    }
}

fn interrupt_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    })
}

fn query(args: HistoryArgs) -> HistoryQuery {
    HistoryQuery {
        search: args.search,
        sort: args.sort.into(),
        direction: if args.asc {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        },
        page: args.page,
        rows_per_page: args.rows.max(1),
    }
}

fn show(config: &AppConfig, store: &TaskStore, args: &ShowArgs) -> anyhow::Result<()> {
    let task = store
        .get(&args.task_id)
        .with_context(|| format!("no task {} in history", args.task_id))?;

    let download = match task.output_file() {
        Some(file) => Some(
            HttpScrapeApi::new(config.client.clone())?
                .download_url(file)?
                .to_string(),
        ),
        None => None,
    };
    print!("{}", render::task_header(task, download.as_deref()));

    let Some(result) = task.result() else {
        return Ok(());
    };
    let mut view = ResultView::new(result);
    if args.raw {
        println!("{}", view.raw_json());
        return Ok(());
    }

    if !args.fields.is_empty() {
        let unknown: Vec<&str> = args
            .fields
            .iter()
            .map(String::as_str)
            .filter(|name| view.shape(name).is_none())
            .collect();
        if !unknown.is_empty() {
            let known: Vec<&str> = view.field_names().collect();
            println!(
                "Ignoring unknown field(s) {}; available: {}",
                unknown.join(", "),
                known.join(", ")
            );
        }
        view.select_fields(&args.fields);
    }
    if let Some(term) = &args.filter {
        view.set_filter(term.as_str());
    }
    if args.cards {
        view.set_list_mode(ListMode::Cards);
    }
    println!();
    print!("{}", render::structured(&view.structured()));
    Ok(())
}

async fn refresh(config: &AppConfig, store: &mut TaskStore, task_id: &str) -> anyhow::Result<()> {
    if store.get(task_id).is_none() {
        bail!("no task {task_id} in history");
    }
    let api = HttpScrapeApi::new(config.client.clone())?;
    match refresh_task(&api, store, task_id).await? {
        UpdateOutcome::Applied | UpdateOutcome::UnknownTask => {}
        UpdateOutcome::Rejected(reason) => println!("Service status ignored: {reason}"),
    }
    if let Some(task) = store.get(task_id) {
        print!("{}", render::task_header(task, None));
    }
    Ok(())
}
