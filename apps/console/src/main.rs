use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{
    rest::{RestCollection, RestConfig},
    ListViewController, PageSize,
};
use shared::domain::TaskSummary;
use shared::protocol::{Filter, FilterValue};
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: Url,
    /// Bearer token the backend expects; obtained out of band.
    #[arg(long)]
    token: Option<String>,
    #[arg(long, default_value = "/api/tasks")]
    collection: String,
    /// Restrict the view to rows whose name matches.
    #[arg(long)]
    name_filter: Option<String>,
    /// Scope the whole view to pending rows.
    #[arg(long)]
    only_pending: bool,
    #[arg(long, default_value_t = 25)]
    page_size: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut config = RestConfig::new(args.server_url);
    if let Some(token) = args.token {
        config = config.with_bearer_token(token);
    }

    let defaults = if args.only_pending {
        vec![Filter::new("completed", false)]
    } else {
        Vec::new()
    };

    let fetcher = Arc::new(RestCollection::<TaskSummary>::new(config, args.collection));
    let view = ListViewController::with_default_filters(fetcher, defaults);

    view.set_page_size(PageSize::new(args.page_size)?).await;
    if let Some(name) = args.name_filter {
        view.set_filter("name", Some(FilterValue::Text(name))).await;
    }
    view.sync().await?;

    let Some(page) = view.page().await else {
        println!("no rows loaded");
        return Ok(());
    };
    info!(
        rows = page.items.len(),
        total = page.total_count,
        "page loaded"
    );
    println!("{} of {} rows", page.items.len(), page.total_count);
    for task in &page.items {
        let done = if task.completed { "x" } else { " " };
        println!("[{done}] #{} {} ({})", task.id.0, task.title, task.assignee_name);
    }

    Ok(())
}
