mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, RouteCommand, TicketCommand};
use nexus::config::NexusConfig;
use nexus::ids::{RouteId, SectorId, TicketId, UserId};
use nexus::service::TicketService;
use nexus::stats::DateRange;
use nexus::store::{MemoryStore, load_snapshot, save_snapshot};
use nexus::visibility::Actor;
use ui::Printer;

type Service = TicketService<Arc<MemoryStore>, Arc<MemoryStore>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let printer = Printer::new();
    if let Err(error) = run(cli, &printer).await {
        printer.failure(&error);
        std::process::exit(1);
    }
}

/// Filtro usado quando `RUST_LOG` não está definido.
fn default_filter(verbose: bool) -> &'static str {
    if verbose { "nexus=debug" } else { "nexus=info" }
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli, printer: &Printer) -> Result<()> {
    let mut config = NexusConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(data) = cli.data.clone() {
        config.data_file = data;
    }
    let data_file = config.data_file.clone();

    let snapshot = load_snapshot(&data_file)
        .with_context(|| format!("reading {}", data_file.display()))?;
    let store = Arc::new(MemoryStore::from_snapshot(snapshot));
    let service = TicketService::with_memory_store(Arc::clone(&store), config);

    let actor = cli.actor.map(|id| Actor {
        id: UserId(id),
        sector_id: cli.sector.map(SectorId),
        privilege_level: cli.level,
    });

    let mutated = dispatch(cli.command, actor, &service, printer).await?;
    if mutated {
        persist(&store, &data_file).await?;
    }
    Ok(())
}

/// Executa o comando; devolve `true` quando algo foi alterado.
async fn dispatch(
    command: Command,
    actor: Option<Actor>,
    service: &Service,
    printer: &Printer,
) -> Result<bool> {
    let require_actor = || actor.context("this command needs --actor");

    match command {
        Command::Ticket { action } => {
            let actor = require_actor()?;
            match action {
                TicketCommand::Create(args) => {
                    let ticket = service.create_ticket(&actor, args.into_new_ticket()).await?;
                    printer.success(&format!("ticket {} created ({})", ticket.id, ticket.number));
                    printer.json("Ticket", &ticket);
                    Ok(true)
                }
                TicketCommand::Patch(args) => {
                    let id = TicketId(args.id);
                    let ticket = service.patch_ticket(&actor, id, args.into_patch()).await?;
                    printer.success(&format!("ticket {id} updated, transfer {}", ticket.transfer));
                    printer.json("Ticket", &ticket);
                    Ok(true)
                }
                TicketCommand::Accept { id } => {
                    let ticket = service.accept_transfer(&actor, TicketId(id)).await?;
                    printer.success(&format!("transfer of ticket {} accepted", ticket.id));
                    Ok(true)
                }
                TicketCommand::Return { id } => {
                    let ticket = service.return_transfer(&actor, TicketId(id)).await?;
                    printer.success(&format!("transfer of ticket {} returned", ticket.id));
                    Ok(true)
                }
                TicketCommand::Delete { id } => {
                    service.delete_ticket(&actor, TicketId(id)).await?;
                    printer.success(&format!("ticket {id} deleted"));
                    Ok(true)
                }
                TicketCommand::Show { id } => {
                    let ticket = service.get_ticket(&actor, TicketId(id)).await?;
                    printer.json("Ticket", &ticket);
                    Ok(false)
                }
                TicketCommand::List { user, of_sector } => {
                    let tickets = match of_sector {
                        Some(sector) => service.list_by_sector(&actor, SectorId(sector)).await?,
                        None => service.list_visible(&actor, user.map(UserId)).await?,
                    };
                    printer.ticket_list(&tickets);
                    Ok(false)
                }
                TicketCommand::Next { id } => {
                    match service.next_targets(&actor, TicketId(id)).await? {
                        Some(targets) => printer.json("Next targets", &targets),
                        None => printer.success(&format!("ticket {id} is not bound to a route")),
                    }
                    Ok(false)
                }
            }
        }
        Command::Route { action } => match action {
            RouteCommand::Create(args) => {
                let route = service.create_route(&require_actor()?, args.into_new_route()).await?;
                printer.success(&format!("route {} created", route.id));
                printer.json("Route", &route);
                Ok(true)
            }
            RouteCommand::Update { id, route } => {
                let route = service
                    .update_route(&require_actor()?, RouteId(id), route.into_new_route())
                    .await?;
                printer.success(&format!("route {} updated", route.id));
                printer.json("Route", &route);
                Ok(true)
            }
            RouteCommand::Show { id } => {
                let route = service.get_route(RouteId(id)).await?;
                printer.json("Route", &route);
                Ok(false)
            }
            RouteCommand::List { active_only } => {
                let routes = service.list_routes(active_only).await?;
                printer.json("Routes", &routes);
                Ok(false)
            }
            RouteCommand::Delete { id } => {
                service.delete_route(&require_actor()?, RouteId(id)).await?;
                printer.success(&format!("route {id} deleted"));
                Ok(true)
            }
        },
        Command::Stats { from, to } => {
            let actor = require_actor()?;
            let range = (from.is_some() || to.is_some()).then(|| DateRange::new(from, to));
            let stats = service.get_statistics(&actor, range).await?;
            printer.json("Statistics", &stats);
            Ok(false)
        }
    }
}

async fn persist(store: &MemoryStore, path: &Path) -> Result<()> {
    let snapshot = store.snapshot().await;
    save_snapshot(path, &snapshot).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(file = %path.display(), tickets = snapshot.tickets.len(), "snapshot saved");
    Ok(())
}
