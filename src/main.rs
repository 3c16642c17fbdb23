//! `relay` — the CLI shell over the `relay` library. Parses the command
//! surface with `clap`'s derive API, wires
//! the parsed flags into a `backend::registry::BackendRegistry` lookup and a
//! `core::sync::SyncPlan`, and translates the run outcome into a process
//! exit code. `anyhow` is used here, and only here — every error that
//! crosses into the library boundary is a `RelayError`/`BackendError`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;

use relay::backend::config::{parse_remote_ref, RemoteTable};
use relay::backend::registry::global_registry;
use relay::backend::types::{ListEntry, ListOptions};
use relay::backend::Backend;
use relay::config::{DeleteMode, SyncConfig};
use relay::core::sync::{self, SyncMode, SyncPlan};
use relay::error::RelayError;
use relay::filter::{self, FilterAction, FilterList};
use relay::hash::HashKind;
use relay::logging;

#[derive(Parser)]
#[command(
    name = "relay",
    version,
    about = "Synchronize files between local disk and remote storage"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy new and changed files from source into destination.
    Copy(TwoPathArgs),
    /// Make destination identical to source, deleting destination-only files.
    Sync(TwoPathArgs),
    /// Move files from source into destination.
    Move(TwoPathArgs),
    /// Check source and destination for equality without transferring.
    Check(TwoPathArgs),
    /// List objects under a remote.
    Ls(OnePathArgs),
    /// List directories under a remote.
    Lsd(OnePathArgs),
    /// List objects with size and modification time.
    Lsl(OnePathArgs),
    /// Print MD5 hashes of objects under a remote.
    Md5sum(OnePathArgs),
    /// Print SHA1 hashes of objects under a remote.
    Sha1sum(OnePathArgs),
    /// Print the total size and object count under a remote.
    Size(OnePathArgs),
    /// Create the root container if it does not already exist.
    Mkdir(OnePathArgs),
    /// Remove the root container if it is empty.
    Rmdir(OnePathArgs),
    /// Recursively remove the root container and everything under it.
    Purge(OnePathArgs),
    /// Remove every object under a remote, leaving the container itself.
    Delete(OnePathArgs),
    /// Find and resolve duplicate objects (not implemented in this build).
    Dedupe(OnePathArgs),
    /// Manage the persisted remote table (not implemented in this build).
    Config,
    /// Run an OAuth authorization flow for a remote (not implemented in this build).
    Authorize { backend_type: Option<String> },
    /// Print version information.
    Version,
}

#[derive(Args)]
struct TwoPathArgs {
    source: String,
    destination: String,
    #[command(flatten)]
    sync: SyncArgs,
}

#[derive(Args)]
struct OnePathArgs {
    path: String,
    #[command(flatten)]
    common: CommonArgs,
    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Path to the remote-table TOML file (default: $XDG_CONFIG_HOME/relay/relay.toml).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(short = 'v', long)]
    verbose: bool,
    #[arg(short = 'q', long)]
    quiet: bool,
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
    #[arg(long)]
    no_check_certificate: bool,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,
    #[arg(long = "exclude-from", value_name = "FILE")]
    exclude_from: Vec<PathBuf>,
    #[arg(long = "include", value_name = "PATTERN")]
    include: Vec<String>,
    #[arg(long = "include-from", value_name = "FILE")]
    include_from: Vec<PathBuf>,
    /// A rule of the form `+ PATTERN`, `- PATTERN`, or `!` to clear every
    /// rule accumulated so far.
    #[arg(long = "filter", value_name = "RULE")]
    filter: Vec<String>,
    #[arg(long = "filter-from", value_name = "FILE")]
    filter_from: Vec<PathBuf>,
    #[arg(long = "files-from", value_name = "FILE")]
    files_from: Vec<PathBuf>,
    #[arg(long = "min-size", value_name = "SIZE")]
    min_size: Option<String>,
    #[arg(long = "max-size", value_name = "SIZE")]
    max_size: Option<String>,
    #[arg(long = "min-age", value_name = "DURATION")]
    min_age: Option<String>,
    #[arg(long = "max-age", value_name = "DURATION")]
    max_age: Option<String>,
    /// Print the compiled rule list instead of running.
    #[arg(long = "dump-filters")]
    dump_filters: bool,
}

#[derive(Args, Clone)]
struct SyncArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[command(flatten)]
    filters: FilterArgs,

    #[arg(long, value_name = "SIZE")]
    bwlimit: Option<String>,
    #[arg(long, default_value_t = 8)]
    checkers: usize,
    #[arg(long, default_value_t = 4)]
    transfers: usize,
    #[arg(short = 'c', long)]
    checksum: bool,
    #[arg(long = "size-only")]
    size_only: bool,
    #[arg(long = "ignore-existing")]
    ignore_existing: bool,
    #[arg(long, default_value = "1m")]
    contimeout: String,
    #[arg(long, default_value = "5m")]
    timeout: String,
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,
    #[arg(long = "modify-window", default_value = "0s")]
    modify_window: String,
    #[arg(long, default_value_t = 3)]
    retries: u32,
    /// Periodic progress-report interval; `0s` disables it.
    #[arg(long, default_value = "1m")]
    stats: String,
    #[arg(long = "delete-before")]
    delete_before: bool,
    #[arg(long = "delete-during")]
    delete_during: bool,
    #[arg(long = "delete-after")]
    delete_after: bool,
    #[arg(long = "delete-excluded")]
    delete_excluded: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building the tokio runtime")?;

    let exit_code = runtime.block_on(dispatch(cli.command))?;
    std::process::exit(exit_code);
}

async fn dispatch(command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Copy(args) => run_sync(SyncMode::Copy, args).await,
        Command::Sync(args) => run_sync(SyncMode::Sync, args).await,
        Command::Move(args) => run_sync(SyncMode::Move, args).await,
        Command::Check(args) => run_sync(SyncMode::Check, args).await,

        Command::Ls(args) => run_ls(args, ListStyle::Plain).await,
        Command::Lsd(args) => run_ls(args, ListStyle::Directories).await,
        Command::Lsl(args) => run_ls(args, ListStyle::Long).await,

        Command::Md5sum(args) => run_hashsum(args, HashKind::Md5).await,
        Command::Sha1sum(args) => run_hashsum(args, HashKind::Sha1).await,
        Command::Size(args) => run_size(args).await,

        Command::Mkdir(args) => run_container_op(args, ContainerOp::Mkdir).await,
        Command::Rmdir(args) => run_container_op(args, ContainerOp::Rmdir).await,
        Command::Purge(args) => run_container_op(args, ContainerOp::Purge).await,
        Command::Delete(args) => run_container_op(args, ContainerOp::Delete).await,

        Command::Dedupe(_) => unimplemented_subcommand("dedupe"),
        Command::Config => unimplemented_subcommand("config"),
        Command::Authorize { .. } => unimplemented_subcommand("authorize"),

        Command::Version => {
            println!("relay {}", relay::VERSION);
            Ok(0)
        }
    }
}

fn unimplemented_subcommand(name: &str) -> anyhow::Result<i32> {
    eprintln!("relay {}: not implemented in this build", name);
    Ok(1)
}

async fn run_sync(mode: SyncMode, args: TwoPathArgs) -> anyhow::Result<i32> {
    let config = build_sync_config(&args.sync)?;
    logging::init_logging(&config).context("initializing logging")?;

    let (filters, dump) = build_filter_list(&args.sync.filters)?;
    if args.sync.filters.dump_filters {
        for line in &dump {
            println!("{}", line);
        }
        return Ok(0);
    }

    let table = load_remote_table(&config.config_path)?;
    let src = resolve_backend(&args.source, &table).await?;
    let dst = resolve_backend(&args.destination, &table).await?;

    let plan = SyncPlan { src, dst, mode, filters, config };
    let report = sync::run(&plan).await.context("running sync")?;

    print_report(&report, mode);

    Ok(exit_code_for(&report, mode))
}

fn exit_code_for(report: &relay::RunReport, mode: SyncMode) -> i32 {
    let failed = report.errors > 0 || (matches!(mode, SyncMode::Check) && report.mismatches > 0);
    if failed {
        1
    } else {
        0
    }
}

fn print_report(report: &relay::RunReport, mode: SyncMode) {
    if matches!(mode, SyncMode::Check) {
        println!("{} mismatch(es), {} object(s) checked", report.mismatches, report.checks);
    } else {
        println!(
            "Transferred: {} bytes, {} file(s); Deleted: {} file(s); Checked: {}; Errors: {}",
            report.bytes_transferred, report.transfers, report.deletes, report.checks, report.errors
        );
    }
}

enum ListStyle {
    Plain,
    Directories,
    Long,
}

async fn run_ls(args: OnePathArgs, style: ListStyle) -> anyhow::Result<i32> {
    let table = load_remote_table(&args.common.config)?;
    let backend = resolve_backend(&args.path, &table).await?;
    let (filters, _) = build_filter_list(&args.filters)?;

    let opts = match style {
        ListStyle::Directories => ListOptions::default().recursive(true).with_directories(true),
        _ => ListOptions::default(),
    };

    let mut stream = backend.list(opts).await.map_err(RelayError::from)?;
    while let Some(entry) = stream.next().await {
        match entry.map_err(RelayError::from)? {
            ListEntry::Object(obj) if obj.storable => {
                if filters.decide(&obj.remote, obj.size, None) != relay::filter::FilterDecision::Include {
                    continue;
                }
                match style {
                    ListStyle::Long => {
                        let when = match obj.mod_time {
                            relay::backend::types::ModTime::Known(t) => t.to_rfc3339(),
                            relay::backend::types::ModTime::Unknown => "-".to_string(),
                        };
                        println!("{:>12} {} {}", obj.size, when, obj.remote);
                    }
                    _ => println!("{:>12} {}", obj.size, obj.remote),
                }
            }
            ListEntry::Object(_) => {}
            ListEntry::Directory(dir) => {
                if matches!(style, ListStyle::Directories) {
                    println!("{}", dir.name);
                }
            }
        }
    }

    Ok(0)
}

async fn run_hashsum(args: OnePathArgs, kind: HashKind) -> anyhow::Result<i32> {
    let table = load_remote_table(&args.common.config)?;
    let backend = resolve_backend(&args.path, &table).await?;
    let (filters, _) = build_filter_list(&args.filters)?;

    let mut stream = backend.list(ListOptions::default()).await.map_err(RelayError::from)?;
    let mut errors = 0u64;
    while let Some(entry) = stream.next().await {
        let ListEntry::Object(obj) = entry.map_err(RelayError::from)? else {
            continue;
        };
        if !obj.storable {
            continue;
        }
        if filters.decide(&obj.remote, obj.size, None) != relay::filter::FilterDecision::Include {
            continue;
        }

        if let Some(existing) = obj.hash(kind) {
            println!("{}  {}", existing, obj.remote);
            continue;
        }

        match backend.open(&obj.remote).await {
            Ok(reader) => match relay::hash::hash_async_stream(kind, reader).await {
                Ok(digest) => println!("{}  {}", digest, obj.remote),
                Err(e) => {
                    eprintln!("relay: {}: {}", obj.remote, e);
                    errors += 1;
                }
            },
            Err(e) => {
                eprintln!("relay: {}: {}", obj.remote, e);
                errors += 1;
            }
        }
    }

    Ok(if errors > 0 { 1 } else { 0 })
}

async fn run_size(args: OnePathArgs) -> anyhow::Result<i32> {
    let table = load_remote_table(&args.common.config)?;
    let backend = resolve_backend(&args.path, &table).await?;
    let (filters, _) = build_filter_list(&args.filters)?;

    let mut stream = backend.list(ListOptions::default()).await.map_err(RelayError::from)?;
    let mut count = 0u64;
    let mut total = 0u64;
    while let Some(entry) = stream.next().await {
        if let ListEntry::Object(obj) = entry.map_err(RelayError::from)? {
            if !obj.storable {
                continue;
            }
            if filters.decide(&obj.remote, obj.size, None) != relay::filter::FilterDecision::Include {
                continue;
            }
            count += 1;
            if obj.size > 0 {
                total += obj.size as u64;
            }
        }
    }

    println!("Total objects: {}", count);
    println!("Total size: {} ({} bytes)", relay::stats::format_bytes(total), total);
    Ok(0)
}

enum ContainerOp {
    Mkdir,
    Rmdir,
    Purge,
    Delete,
}

async fn run_container_op(args: OnePathArgs, op: ContainerOp) -> anyhow::Result<i32> {
    let table = load_remote_table(&args.common.config)?;
    let backend = resolve_backend(&args.path, &table).await?;

    match op {
        ContainerOp::Mkdir => backend.mkdir().await.map_err(RelayError::from)?,
        ContainerOp::Rmdir => backend.rmdir().await.map_err(RelayError::from)?,
        ContainerOp::Purge => backend.purge().await.map_err(RelayError::from)?,
        ContainerOp::Delete => {
            let (filters, _) = build_filter_list(&args.filters)?;
            let mut stream = backend.list(ListOptions::default()).await.map_err(RelayError::from)?;
            let mut errors = 0u64;
            while let Some(entry) = stream.next().await {
                if let ListEntry::Object(obj) = entry.map_err(RelayError::from)? {
                    if !obj.storable {
                        continue;
                    }
                    if filters.decide(&obj.remote, obj.size, None) != relay::filter::FilterDecision::Include {
                        continue;
                    }
                    if let Err(e) = backend.remove(&obj.remote).await {
                        eprintln!("relay: {}: {}", obj.remote, e);
                        errors += 1;
                    }
                }
            }
            return Ok(if errors > 0 { 1 } else { 0 });
        }
    }

    Ok(0)
}

async fn resolve_backend(raw: &str, table: &RemoteTable) -> anyhow::Result<Arc<dyn Backend>> {
    let parsed = parse_remote_ref(raw);
    let backend = global_registry()
        .resolve(&parsed, table)
        .await
        .with_context(|| format!("resolving {:?}", raw))?;
    Ok(Arc::from(backend))
}

fn load_remote_table(explicit: &Option<PathBuf>) -> anyhow::Result<RemoteTable> {
    let path = explicit.clone().unwrap_or_else(RemoteTable::default_path);
    RemoteTable::load(&path).with_context(|| format!("loading {}", path.display()))
}

fn build_sync_config(args: &SyncArgs) -> anyhow::Result<SyncConfig> {
    let delete_count = [args.delete_before, args.delete_during, args.delete_after]
        .iter()
        .filter(|b| **b)
        .count();
    if delete_count > 1 {
        bail!("only one of --delete-before, --delete-during, --delete-after may be given");
    }
    let delete_mode = if args.delete_before {
        DeleteMode::Before
    } else if args.delete_after {
        DeleteMode::After
    } else {
        DeleteMode::During
    };

    Ok(SyncConfig {
        bwlimit: args.bwlimit.as_deref().map(filter::parse_size).transpose()?,
        checkers: args.checkers,
        transfers: args.transfers,
        checksum: args.checksum,
        size_only: args.size_only,
        ignore_existing: args.ignore_existing,
        config_path: args.common.config.clone(),
        contimeout: parse_duration(&args.contimeout)?,
        timeout: parse_duration(&args.timeout)?,
        dry_run: args.dry_run,
        modify_window: parse_duration(&args.modify_window)?,
        retries: args.retries,
        stats_interval: parse_duration(&args.stats)?,
        delete_mode,
        delete_excluded: args.delete_excluded,
        verbose: args.common.verbose,
        quiet: args.common.quiet,
        log_file: args.common.log_file.clone(),
        no_check_certificate: args.common.no_check_certificate,
    })
}

/// Parse a generic duration: signed decimal with
/// suffix `ns,us,µs,ms,s,m,h`. Unlike `filter::parse_age`, this table has no
/// `d,w,M,y` members — those only apply to `--min-age`/`--max-age`.
fn parse_duration(text: &str) -> Result<Duration, RelayError> {
    let text = text.trim();
    if let Some(digits) = text.strip_suffix("ns") {
        return digits
            .trim()
            .parse::<u64>()
            .map(Duration::from_nanos)
            .map_err(|e| RelayError::Config(format!("invalid duration {:?}: {}", text, e)));
    }
    if let Some(digits) = text.strip_suffix("µs").or_else(|| text.strip_suffix("us")) {
        return digits
            .trim()
            .parse::<u64>()
            .map(Duration::from_micros)
            .map_err(|e| RelayError::Config(format!("invalid duration {:?}: {}", text, e)));
    }
    if let Some(digits) = text.strip_suffix("ms") {
        return digits
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| RelayError::Config(format!("invalid duration {:?}: {}", text, e)));
    }

    let (digits, secs_per_unit) = match text.chars().last() {
        Some('s') => (&text[..text.len() - 1], 1u64),
        Some('m') => (&text[..text.len() - 1], 60),
        Some('h') => (&text[..text.len() - 1], 3600),
        _ => (text, 1),
    };

    digits
        .trim()
        .parse::<u64>()
        .map(|n| Duration::from_secs(n * secs_per_unit))
        .map_err(|e| RelayError::Config(format!("invalid duration {:?}: {}", text, e)))
}

/// Build a `FilterList` from every rule source, applied in a fixed,
/// documented order: `--filter-from` files, then
/// `--filter` rules, then `--include-from`/`--include`, then
/// `--exclude-from`/`--exclude`. Clap does not preserve the relative
/// command-line order between distinct flag names, so rules from different
/// flags are grouped rather than interleaved by position (see DESIGN.md).
fn build_filter_list(args: &FilterArgs) -> anyhow::Result<(FilterList, Vec<String>)> {
    let mut list = FilterList::new();
    let mut dump = Vec::new();

    for path in &args.filter_from {
        for line in read_lines(path)? {
            apply_filter_rule(&mut list, &line, &mut dump)?;
        }
    }
    for rule in &args.filter {
        apply_filter_rule(&mut list, rule, &mut dump)?;
    }
    for path in &args.include_from {
        for line in read_lines(path)? {
            list.add_rule(FilterAction::Include, &line)?;
            dump.push(format!("+ {}", line));
        }
    }
    for pattern in &args.include {
        list.add_rule(FilterAction::Include, pattern)?;
        dump.push(format!("+ {}", pattern));
    }
    for path in &args.exclude_from {
        for line in read_lines(path)? {
            list.add_rule(FilterAction::Exclude, &line)?;
            dump.push(format!("- {}", line));
        }
    }
    for pattern in &args.exclude {
        list.add_rule(FilterAction::Exclude, pattern)?;
        dump.push(format!("- {}", pattern));
    }

    if !args.files_from.is_empty() {
        let mut paths = Vec::new();
        for path in &args.files_from {
            paths.extend(read_lines(path)?);
        }
        dump.push(format!("files-from: {} entries", paths.len()));
        list.set_files_from(paths);
    }

    if let Some(s) = &args.min_size {
        list.set_min_size(filter::parse_size(s)?);
    }
    if let Some(s) = &args.max_size {
        list.set_max_size(filter::parse_size(s)?);
    }
    if let Some(s) = &args.min_age {
        list.set_min_age(filter::parse_age(s)?);
    }
    if let Some(s) = &args.max_age {
        list.set_max_age(filter::parse_age(s)?);
    }

    Ok((list, dump))
}

fn apply_filter_rule(list: &mut FilterList, line: &str, dump: &mut Vec<String>) -> anyhow::Result<()> {
    let line = line.trim();
    if line == "!" {
        list.clear_rules();
        dump.push("!".to_string());
        return Ok(());
    }

    let mut chars = line.chars();
    let tag = chars
        .next()
        .ok_or_else(|| RelayError::Filter("empty filter rule".to_string()))?;
    let pattern = chars.as_str().trim_start();

    match tag {
        '+' => {
            list.add_rule(FilterAction::Include, pattern)?;
            dump.push(format!("+ {}", pattern));
        }
        '-' => {
            list.add_rule(FilterAction::Exclude, pattern)?;
            dump.push(format!("- {}", pattern));
        }
        _ => bail!("filter rule must start with '+', '-', or be '!': {:?}", line),
    }
    Ok(())
}

fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with(';'))
        .map(str::to_string)
        .collect())
}
