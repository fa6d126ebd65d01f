// Command handlers
//
// Each handler takes the shared context and a writer for its normal output.
// Errors bubble up as anyhow errors and are printed once by main.

use crate::channel::Listener;
use crate::cli::{ClientCommand, Commands, ListArgs, QueueCommand, ServiceCommand};
use crate::config::Config;
use crate::context::AppContext;
use crate::events::SessionEvent;
use crate::list_view::ListView;
use crate::models::{Gender, NewClient, NewQueue, NewService, Queue, QueueService, Service};
use crate::resources::{
    report, QueueFilters, Resource, ResourceStore, ServiceFilters, SortDirection, SortField,
    Sorting,
};
use crate::util::{fit, truncate_utf8_safe};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Longest server acknowledgement echoed back to the terminal
const MAX_ECHO_BYTES: usize = 200;

/// How often `watch --join` checks whether the socket has opened
const JOIN_RETRY: Duration = Duration::from_millis(250);

// ─────────────────────────────────────────────────────────────────────────────
// Config (runs without a context)
// ─────────────────────────────────────────────────────────────────────────────

/// `source` is the `--config` file when one was given
pub fn handle_config(
    config: &Config,
    source: Option<&Path>,
    show: bool,
    reset: bool,
    path: bool,
) -> Result<()> {
    if path {
        println!("{}", config_file(source)?.display());
    } else if show {
        config_show(config, source);
    } else if reset {
        config_reset(&config_file(source)?)?;
    } else {
        println!("Usage: qdesk config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
    }
    Ok(())
}

fn config_file(source: Option<&Path>) -> Result<PathBuf> {
    match source {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::config_path().context("Could not determine config path"),
    }
}

fn config_show(config: &Config, source: Option<&Path>) {
    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Ok(path) = config_file(source) {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn config_reset(path: &Path) -> Result<()> {
    if path.exists() {
        let answer = prompt(&format!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        ))?;
        if !answer.eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    Config::default().write_to(path)?;
    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

/// Ask on stderr, read one trimmed line from stdin
fn prompt(question: &str) -> Result<String> {
    eprint!("{}", question);
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;
    Ok(input.trim().to_string())
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(p) => Ok(p),
        None => prompt("Password: "),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

pub async fn run<W: Write>(ctx: &AppContext, command: Commands, out: &mut W) -> Result<()> {
    match command {
        Commands::Config { show, reset, path } => {
            handle_config(&ctx.config, None, show, reset, path)
        }
        Commands::Login {
            email,
            password,
            remember,
        } => {
            let password = password_or_prompt(password)?;
            let user = ctx.session.login(&email, &password, remember).await?;
            writeln!(out, "Logged in as {}", user.display_name())?;
            Ok(())
        }
        Commands::Logout => {
            if ctx.session.is_authenticated() {
                ctx.session.logout();
                writeln!(out, "Logged out")?;
            } else {
                writeln!(out, "Not logged in")?;
            }
            Ok(())
        }
        Commands::Whoami => whoami(ctx, out).await,
        Commands::Signup { email, password } => {
            let password = password_or_prompt(password)?;
            let user = ctx.session.signup(&email, &password).await?;
            writeln!(out, "Account created for {} (id {})", user.email, user.id)?;
            Ok(())
        }
        Commands::Queues(cmd) => queues(ctx, cmd, out).await,
        Commands::Services(cmd) => services(ctx, cmd, out).await,
        Commands::Clients(ClientCommand::Add {
            firstname,
            surname,
            middlename,
            gender,
        }) => {
            let client = NewClient {
                firstname,
                surename: surname,
                middlename,
                gender: parse_gender(&gender)?,
            };
            let created = ctx.session.add_client(&client).await?;
            writeln!(out, "Client {} registered", created.id)?;
            Ok(())
        }
        Commands::Report { year } => {
            let months = report::fetch_yearly(&ctx.gateway, year).await?;
            writeln!(out, "Tickets in {}", year)?;
            for m in months {
                writeln!(out, "  {}  {:>6}", m.month, m.tickets)?;
            }
            Ok(())
        }
        Commands::Avatar { path } => avatar(ctx, &path, out).await,
        Commands::Watch { join } => watch(ctx, join_message(join.as_deref())?, out).await,
    }
}

async fn whoami<W: Write>(ctx: &AppContext, out: &mut W) -> Result<()> {
    if !ctx.session.is_authenticated() {
        writeln!(out, "Not logged in")?;
        return Ok(());
    }

    match ctx.session.fetch_current_user().await {
        Ok(user) => {
            writeln!(out, "{} <{}> ({})", user.display_name(), user.email, user.role.as_str())?;
            Ok(())
        }
        // 401 has already logged us out
        Err(e) if e.is_auth() => Err(anyhow!(e).context("Session expired, log in again")),
        Err(e) => {
            tracing::warn!("Identity refresh failed: {}", e);
            match ctx.session.current_user() {
                Some(user) => {
                    writeln!(out, "{} <{}> (cached)", user.display_name(), user.email)?;
                    Ok(())
                }
                None => Err(e.into()),
            }
        }
    }
}

fn parse_gender(s: &str) -> Result<Gender> {
    serde_json::from_value(Value::String(s.to_lowercase()))
        .map_err(|_| anyhow!("Unknown gender '{}' (expected male or female)", s))
}

// ─────────────────────────────────────────────────────────────────────────────
// Lists
// ─────────────────────────────────────────────────────────────────────────────

/// Turn `--sort`/`--desc` into a view sorting. `--desc` alone reverses the
/// resource's default field.
pub fn sorting_from_args<R: Resource>(args: &ListArgs) -> Result<Sorting<R::SortField>> {
    let direction = if args.desc {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    };

    match &args.sort {
        Some(name) => {
            let field = <R::SortField as SortField<R>>::parse(name)
                .ok_or_else(|| anyhow!("Unknown sort field '{}' for {}", name, R::NAME))?;
            Ok(Sorting::new(field, direction))
        }
        None if args.desc => {
            let mut sorting = R::default_sorting();
            sorting.direction = Some(direction);
            Ok(sorting)
        }
        None => Ok(R::default_sorting()),
    }
}

/// Open a lazy view, apply the command-line paging and sorting, then fetch
async fn list_view<R: Resource>(
    ctx: &AppContext,
    store: Arc<ResourceStore<R>>,
    filters: R::Filters,
    args: &ListArgs,
) -> Result<ListView<R>> {
    let sorting = sorting_from_args::<R>(args)?;

    let mut options = ctx.list_options::<R>();
    options.filters = filters;
    options.lazy = true;
    let view = ListView::open(store, options).await;

    if let Some(per_page) = args.per_page {
        view.set_per_page(per_page);
    }
    view.set_page(args.page);
    view.set_sorting(sorting);
    view.fetch().await?;
    Ok(view)
}

/// View used for a single add/update/remove; nothing is fetched
async fn mutation_view<R: Resource>(
    ctx: &AppContext,
    store: Arc<ResourceStore<R>>,
) -> ListView<R> {
    let mut options = ctx.list_options::<R>();
    options.lazy = true;
    ListView::open(store, options).await
}

/// Unwrap a view mutation, turning a captured error into the command's error
fn settled<T, R: Resource>(view: &ListView<R>, result: Option<T>) -> Result<T> {
    match result {
        Some(value) => Ok(value),
        None => Err(match view.take_error() {
            Some(e) => e.into(),
            None => anyhow!("{} request failed", R::NAME),
        }),
    }
}

fn write_footer<W: Write, R: Resource>(out: &mut W, view: &ListView<R>) -> Result<()> {
    let p = view.pagination();
    let pages = p.total.div_ceil(u64::from(p.per_page)).max(1);
    writeln!(out, "page {} of {} ({} total)", p.page, pages, p.total)?;
    Ok(())
}

pub fn write_queue_table<W: Write>(out: &mut W, rows: &[Queue]) -> Result<()> {
    writeln!(
        out,
        "{} {} {} {} {} {}",
        fit("ID", 6),
        fit("NO", 5),
        fit("TIME", 6),
        fit("STEP", 4),
        fit("CLIENT", 20),
        "SERVICE"
    )?;
    for q in rows {
        writeln!(
            out,
            "{} {} {} {} {} {}",
            fit(&q.id.to_string(), 6),
            fit(&q.number.to_string(), 5),
            fit(&q.time, 6),
            fit(&q.step.to_string(), 4),
            fit(q.client_name(), 20),
            q.service_name()
        )?;
    }
    Ok(())
}

pub fn write_service_table<W: Write>(out: &mut W, rows: &[Service]) -> Result<()> {
    writeln!(
        out,
        "{} {} {} {} {}",
        fit("ID", 6),
        fit("NAME", 24),
        fit("ROOM", 6),
        fit("HOURS", 12),
        "AVG MIN"
    )?;
    for s in rows {
        writeln!(
            out,
            "{} {} {} {} {}",
            fit(&s.id.to_string(), 6),
            fit(&s.name, 24),
            fit(&s.room, 6),
            fit(&format!("{}-{}", s.from_time, s.to_time), 12),
            s.avg_minute
        )?;
    }
    Ok(())
}

/// Short one-line rendering of a server acknowledgement
fn echo(body: &Value) -> String {
    let text = match body {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let cut = truncate_utf8_safe(&text, MAX_ECHO_BYTES);
    if cut.len() < text.len() {
        format!("{}…", cut)
    } else {
        text
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queues
// ─────────────────────────────────────────────────────────────────────────────

async fn queues<W: Write>(ctx: &AppContext, cmd: QueueCommand, out: &mut W) -> Result<()> {
    match cmd {
        QueueCommand::List { inactive, list } => {
            let filters = QueueFilters {
                is_active: !inactive,
                search: list.search.clone(),
            };
            let view = list_view(ctx, ctx.queues.clone(), filters, &list).await?;

            write_queue_table(out, &view.visible())?;
            write_footer(out, &view)
        }
        QueueCommand::Add {
            date,
            service,
            client,
            number,
            time,
            comment,
        } => {
            let ticket = NewQueue {
                date,
                comment,
                number,
                time,
                step: 0,
                client_id: client,
                service_id: Some(service),
            };
            let view = mutation_view(ctx, ctx.queues.clone()).await;
            let created = settled(&view, view.add(&ticket).await)?;
            writeln!(out, "Ticket {} reserved (number {})", created.id, created.number)?;
            Ok(())
        }
        QueueCommand::Update {
            id,
            step,
            number,
            time,
            service,
        } => {
            let mut ticket = ctx.queues.fetch_one(id).await?;
            if let Some(step) = step {
                ticket.step = step;
            }
            if let Some(number) = number {
                ticket.number = number;
            }
            if let Some(time) = time {
                ticket.time = time;
            }
            if let Some(service_id) = service {
                // Only the id goes over the wire
                ticket.service = Some(QueueService {
                    id: service_id,
                    name: String::new(),
                    room: Value::Null,
                });
            }

            let view = mutation_view(ctx, ctx.queues.clone()).await;
            let updated = settled(&view, view.update(&ticket).await)?;
            writeln!(
                out,
                "Ticket {} updated (number {}, step {}, {})",
                updated.id,
                updated.number,
                updated.step,
                updated.service_name()
            )?;
            Ok(())
        }
        QueueCommand::Remove { id } => {
            let record = ctx.queues.fetch_one(id).await?;
            let view = mutation_view(ctx, ctx.queues.clone()).await;
            if settled(&view, view.remove(&record).await)? {
                writeln!(out, "Ticket {} removed", id)?;
            } else {
                writeln!(out, "Server did not confirm removal of ticket {}", id)?;
            }
            Ok(())
        }
        QueueCommand::Call { id } => {
            let ack = ctx.queues.call_ticket(id).await?;
            writeln!(out, "Called ticket {}: {}", id, echo(&ack))?;
            Ok(())
        }
        QueueCommand::Finish { id } => {
            let ack = ctx.queues.finish_ticket(id).await?;
            writeln!(out, "Finished ticket {}: {}", id, echo(&ack))?;
            Ok(())
        }
        QueueCommand::Waitlist => {
            let waitlist = ctx.queues.waitlist().await?;
            writeln!(out, "Meeting:")?;
            for t in &waitlist.meeting {
                writeln!(out, "  {:>5}  {}  {}", t.number, fit(&t.time, 5), t.service)?;
            }
            writeln!(out, "Waiting:")?;
            for t in &waitlist.waiting {
                writeln!(out, "  {:>5}  {}  {}", t.number, fit(&t.time, 5), t.service)?;
            }
            Ok(())
        }
        QueueCommand::Numbers { date, service } => {
            let numbers = ctx.queues.available_numbers(&date, service).await?;
            for n in numbers.iter().filter(|n| n.possible) {
                writeln!(out, "{:>5}  {}", n.queue_number, n.time)?;
            }
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Services
// ─────────────────────────────────────────────────────────────────────────────

async fn services<W: Write>(ctx: &AppContext, cmd: ServiceCommand, out: &mut W) -> Result<()> {
    match cmd {
        ServiceCommand::List { list } => {
            let filters = ServiceFilters {
                search: list.search.clone(),
            };
            let view = list_view(ctx, ctx.services.clone(), filters, &list).await?;

            write_service_table(out, &view.visible())?;
            write_footer(out, &view)
        }
        ServiceCommand::Add {
            name,
            description,
            room,
            days,
            from,
            to,
            avg_minute,
        } => {
            let service = NewService {
                name,
                description,
                available_days: days,
                room,
                from_time: from,
                to_time: to,
                avg_minute,
            };
            let view = mutation_view(ctx, ctx.services.clone()).await;
            let created = settled(&view, view.add(&service).await)?;
            writeln!(out, "Service {} created: {}", created.id, created.name)?;
            Ok(())
        }
        ServiceCommand::Update {
            id,
            name,
            description,
            room,
            days,
            from,
            to,
            avg_minute,
        } => {
            let mut service = ctx.services.fetch_one(id).await?;
            if let Some(name) = name {
                service.name = name;
            }
            if let Some(description) = description {
                service.description = description;
            }
            if let Some(room) = room {
                service.room = room;
            }
            if let Some(days) = days {
                service.available_days = days;
            }
            if let Some(from) = from {
                service.from_time = from;
            }
            if let Some(to) = to {
                service.to_time = to;
            }
            if let Some(avg_minute) = avg_minute {
                service.avg_minute = avg_minute;
            }

            let view = mutation_view(ctx, ctx.services.clone()).await;
            let updated = settled(&view, view.update(&service).await)?;
            writeln!(out, "Service {} updated: {}", updated.id, updated.name)?;
            Ok(())
        }
        ServiceCommand::Remove { id } => {
            let record = ctx.services.fetch_one(id).await?;
            let view = mutation_view(ctx, ctx.services.clone()).await;
            if settled(&view, view.remove(&record).await)? {
                writeln!(out, "Service {} removed", id)?;
            } else {
                writeln!(out, "Server did not confirm removal of service {}", id)?;
            }
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Avatar and live notifications
// ─────────────────────────────────────────────────────────────────────────────

async fn avatar<W: Write>(ctx: &AppContext, path: &Path, out: &mut W) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());

    let body = ctx.gateway.upload_avatar(&file_name, bytes).await?;

    let stored = match &body {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["path", "url", "file"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str)),
        _ => None,
    };
    match stored.and_then(|p| ctx.gateway.endpoints().image_url(p)) {
        Some(url) => writeln!(out, "Uploaded: {}", url)?,
        None => writeln!(out, "Uploaded: {}", echo(&body))?,
    }
    Ok(())
}

/// Parse `watch --join`
fn join_message(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|raw| {
        serde_json::from_str(raw).with_context(|| format!("--join is not valid JSON: {}", raw))
    })
    .transpose()
}

async fn watch<W: Write>(ctx: &AppContext, join: Option<Value>, out: &mut W) -> Result<()> {
    let channel = ctx.connect_channel();
    let printer: Listener = Arc::new(|message: &Value| println!("{}", message));
    channel.add_listener(printer.clone());

    let mut events = ctx.events.subscribe();
    writeln!(out, "Watching {} (Ctrl+C to stop)", ctx.config.ws_url)?;

    // Sends are dropped while the socket is down, so the join waits for an open channel
    let mut pending = join;
    let mut ticker = tokio::time::interval(JOIN_RETRY);

    loop {
        tokio::select! {
            _ = ticker.tick(), if pending.is_some() => {
                if channel.is_open() {
                    if let Some(message) = pending.take() {
                        if channel.send(&message) {
                            writeln!(out, "Sent {}", echo(&message))?;
                        } else {
                            pending = Some(message);
                        }
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!("Ctrl+C handler failed: {}", e);
                }
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(SessionEvent::Unauthorized { url, .. }) => {
                        tracing::warn!(url, "Session expired while watching");
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(skipped = n, "Session events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    channel.remove_listener(&printer);
    channel.close().await;
    writeln!(
        out,
        "Stopped ({} reconnects scheduled)",
        channel.reconnects_scheduled()
    )?;
    Ok(())
}
