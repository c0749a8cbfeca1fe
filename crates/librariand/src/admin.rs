//! Offline admin commands: config scaffolding, searches and standing orders.
//!
//! These open the state database directly. redb allows one process at a
//! time, so they fail while the daemon is running.

use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Subcommand, ValueEnum};
use librarian_core::LibrarianConfig;
use librarian_orders::StandingOrder;
use librarian_search::{QueryType, SearchCatalog, SearchHits, compile_search};
use librarian_state::StateStore;

use crate::serve::STATE_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One row per hit with its main attributes.
    Human,
    /// One name per line.
    Names,
    /// One full instance path per line.
    Paths,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchType {
    /// Matching file records.
    Files,
    /// Names of matching files.
    Names,
    /// Matching observations.
    #[value(name = "obs", alias = "observations")]
    Obs,
}

impl From<SearchType> for QueryType {
    fn from(kind: SearchType) -> Self {
        match kind {
            SearchType::Files => QueryType::Files,
            SearchType::Names => QueryType::Names,
            SearchType::Obs => QueryType::Observations,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum OrderAction {
    /// List standing orders.
    List,
    /// Show one order and the files it would copy now.
    Show { name: String },
    /// Create an order. Defaults to a template search and no usable connection.
    Create {
        name: String,
        #[arg(long, conflicts_with = "search_file")]
        search: Option<String>,
        #[arg(long)]
        search_file: Option<PathBuf>,
        #[arg(long)]
        conn: Option<String>,
    },
    /// Change an order's name, search or connection.
    Update {
        name: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long, conflicts_with = "search_file")]
        search: Option<String>,
        #[arg(long)]
        search_file: Option<PathBuf>,
        #[arg(long)]
        conn: Option<String>,
    },
    /// Delete an order.
    Delete { name: String },
}

pub fn init(config_path: &Path, data_dir: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
    }
    let config = LibrarianConfig::scaffold(data_dir);
    std::fs::write(config_path, config.to_toml_string()?)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("Generated {}", config_path.display());
    Ok(())
}

pub fn open_state(config_path: &Path) -> anyhow::Result<StateStore> {
    let config = LibrarianConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join(STATE_FILE);
    StateStore::open(&db_path)
        .with_context(|| format!("failed to open {} (is the daemon running?)", db_path.display()))
}

/// The search text itself, or stdin when given `-`.
pub fn read_search_arg(arg: &str) -> anyhow::Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

fn search_text(inline: Option<String>, file: Option<PathBuf>) -> anyhow::Result<Option<String>> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => Ok(Some(
            std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        )),
        (None, None) => Ok(None),
    }
}

pub fn search(
    state: &StateStore,
    text: &str,
    kind: SearchType,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let compiled = compile_search(text, kind.into())?;
    let catalog = SearchCatalog::load(state)?;
    let hits = compiled.run(&catalog);
    let mut out = match format {
        OutputFormat::Names => hits.name_list(),
        OutputFormat::Paths => hits.full_path_list(&catalog)?,
        OutputFormat::Human => human_rows(&hits, &catalog),
    };
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(out)
}

fn human_rows(hits: &SearchHits<'_>, catalog: &SearchCatalog) -> String {
    let mut out = String::new();
    match hits {
        SearchHits::Files(files) => {
            for file in files {
                let obsid = file.obsid.map_or_else(|| "-".to_string(), |o| o.to_string());
                let _ = writeln!(
                    out,
                    "{}\t{}\t{} bytes\tobsid {}\t{} instance(s)",
                    file.name,
                    file.file_type,
                    file.size,
                    obsid,
                    catalog.instance_count(&file.name)
                );
            }
        }
        SearchHits::Names(names) => {
            for name in names {
                let _ = writeln!(out, "{name}");
            }
        }
        SearchHits::Observations(observations) => {
            for obs in observations {
                let duration = obs
                    .duration()
                    .map_or_else(|| "-".to_string(), |d| format!("{d:.4} d"));
                let _ = writeln!(out, "{}\tJD {}\t{}", obs.obsid, obs.start_time_jd, duration);
            }
        }
    }
    let _ = write!(out, "{} result(s)", hits.len());
    out
}

pub fn orders(state: &StateStore, action: OrderAction) -> anyhow::Result<String> {
    let mut out = String::new();
    match action {
        OrderAction::List => {
            for order in StandingOrder::list(state)? {
                writeln!(out, "{}\t-> {}", order.name, order.conn_name)?;
            }
        }
        OrderAction::Show { name } => {
            let order = StandingOrder::load(state, &name)?;
            let catalog = SearchCatalog::load(state)?;
            writeln!(out, "name: {}", order.name)?;
            writeln!(out, "connection: {}", order.conn_name)?;
            writeln!(out, "search:\n{}", order.search)?;
            writeln!(out, "files to copy:")?;
            // Offline, so no copy task of this process can be in flight.
            for file in order.get_files_to_copy(&catalog, state, Default::default())? {
                writeln!(out, "  {}", file?.name)?;
            }
        }
        OrderAction::Create {
            name,
            search,
            search_file,
            conn,
        } => {
            let search = search_text(search, search_file)?;
            let order = StandingOrder::create(state, &name, search.as_deref(), conn.as_deref())?;
            writeln!(out, "created standing order \"{}\"", order.name)?;
        }
        OrderAction::Update {
            name,
            rename,
            search,
            search_file,
            conn,
        } => {
            let search = search_text(search, search_file)?;
            let order = StandingOrder::update(
                state,
                &name,
                rename.as_deref(),
                search.as_deref(),
                conn.as_deref(),
            )?;
            writeln!(out, "updated standing order \"{}\"", order.name)?;
        }
        OrderAction::Delete { name } => {
            StandingOrder::delete(state, &name)?;
            writeln!(out, "deleted standing order \"{name}\"")?;
        }
    }
    Ok(out)
}
