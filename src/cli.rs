//! Interface de linha de comando do NEXUS baseada em clap.
//!
//! Define a struct [`Cli`] com os grupos de subcomandos `ticket`, `route` e
//! `stats`, e as flags globais que identificam o ator (--actor, --sector,
//! --level), além de --data, --config e --verbose.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use nexus::ids::{RouteId, SectorId, UserId};
use nexus::route::{NewRoute, StepDraft};
use nexus::transfer::{FieldEdit, NewTicket, TicketPatch};

/// NEXUS: pendências roteadas entre setores e usuários.
#[derive(Debug, Parser)]
#[command(name = "nexus", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Id do usuário que executa o comando.
    #[arg(long, global = true)]
    pub actor: Option<i64>,

    /// Setor do ator.
    #[arg(long, global = true)]
    pub sector: Option<i64>,

    /// Nível de privilégio do ator.
    #[arg(long, global = true, default_value_t = 0)]
    pub level: u8,

    /// Arquivo de dados (sobrepõe `data_file` do nexus.toml).
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = "nexus.toml")]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Operações sobre pendências.
    Ticket {
        #[command(subcommand)]
        action: TicketCommand,
    },

    /// Operações sobre roteiros.
    Route {
        #[command(subcommand)]
        action: RouteCommand,
    },

    /// Estatísticas das pendências visíveis ao ator.
    Stats {
        /// Data inicial de criação (AAAA-MM-DD), inclusiva.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Data final de criação (AAAA-MM-DD), inclusiva.
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[derive(Debug, Subcommand)]
pub enum TicketCommand {
    /// Cria uma pendência.
    Create(CreateTicketArgs),

    /// Atualiza campos; mudar setor/usuário propõe uma transferência.
    Patch(PatchTicketArgs),

    /// Aceita a transferência pendente.
    Accept { id: i64 },

    /// Devolve a transferência pendente ao responsável anterior.
    Return { id: i64 },

    /// Remove uma pendência (requer privilégio).
    Delete { id: i64 },

    /// Mostra uma pendência com seu histórico.
    Show { id: i64 },

    /// Lista pendências visíveis ao ator.
    List {
        /// Lista as pendências de outro usuário (requer privilégio).
        #[arg(long, conflicts_with = "of_sector")]
        user: Option<i64>,

        /// Lista as pendências de um setor.
        #[arg(long)]
        of_sector: Option<i64>,
    },

    /// Próximos destinos válidos no roteiro da pendência.
    Next { id: i64 },
}

/// Campos livres comuns a criação e atualização.
#[derive(Debug, Clone, Default, Args)]
pub struct TicketFields {
    #[arg(long)]
    pub equipment: Option<String>,
    #[arg(long)]
    pub situation: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    /// Prazo de resposta em dias.
    #[arg(long)]
    pub deadline: Option<u32>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long = "ticket-version")]
    pub version: Option<String>,
    /// Dados do cliente em JSON.
    #[arg(long, value_parser = parse_json)]
    pub client: Option<serde_json::Value>,
    /// Propostas vinculadas em JSON.
    #[arg(long, value_parser = parse_json)]
    pub linked_proposals: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Args)]
pub struct CreateTicketArgs {
    /// Número da pendência; gerado se omitido.
    #[arg(long)]
    pub number: Option<String>,
    #[arg(long)]
    pub origin: Option<String>,
    #[arg(long = "to-sector")]
    pub to_sector: Option<i64>,
    #[arg(long = "to-user")]
    pub to_user: Option<i64>,
    #[arg(long)]
    pub route: Option<i64>,
    #[command(flatten)]
    pub fields: TicketFields,
}

#[derive(Debug, Clone, Args)]
pub struct PatchTicketArgs {
    pub id: i64,
    /// Setor de destino da transferência.
    #[arg(long = "to-sector")]
    pub to_sector: Option<i64>,
    /// Usuário de destino da transferência.
    #[arg(long = "to-user", conflicts_with = "clear_user")]
    pub to_user: Option<i64>,
    /// Remove o usuário atribuído.
    #[arg(long, default_value_t = false)]
    pub clear_user: bool,
    /// Vincula a pendência a outro roteiro.
    #[arg(long)]
    pub route: Option<i64>,
    #[command(flatten)]
    pub fields: TicketFields,
}

#[derive(Debug, Subcommand)]
pub enum RouteCommand {
    /// Cria um roteiro.
    Create(RouteArgs),

    /// Substitui nome, descrição e passos de um roteiro.
    Update {
        id: i64,
        #[command(flatten)]
        route: RouteArgs,
    },

    Show { id: i64 },

    List {
        /// Somente roteiros ativos.
        #[arg(long, default_value_t = false)]
        active_only: bool,
    },

    Delete { id: i64 },
}

#[derive(Debug, Clone, Args)]
pub struct RouteArgs {
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
    /// Ativa ou desativa o roteiro.
    #[arg(long)]
    pub active: Option<bool>,
    /// Passo no formato `sector:<id>` ou `user:<id>`, opcionalmente `<ordem>@...`.
    #[arg(long = "step", value_parser = parse_step)]
    pub steps: Vec<StepDraft>,
}

impl CreateTicketArgs {
    pub fn into_new_ticket(self) -> NewTicket {
        let f = self.fields;
        NewTicket {
            number: self.number,
            equipment: f.equipment,
            situation: f.situation,
            status: f.status,
            priority: f.priority,
            response_deadline_days: f.deadline,
            origin: self.origin,
            notes: f.notes,
            version: f.version,
            sector_id: self.to_sector.map(SectorId),
            user_id: self.to_user.map(UserId),
            route_id: self.route.map(RouteId),
            client: f.client,
            linked_proposals: f.linked_proposals,
        }
    }
}

impl PatchTicketArgs {
    pub fn into_patch(self) -> TicketPatch {
        let user_id = match (self.to_user, self.clear_user) {
            (_, true) => FieldEdit::Clear,
            (Some(user), false) => FieldEdit::Set(UserId(user)),
            (None, false) => FieldEdit::Keep,
        };
        let f = self.fields;
        TicketPatch {
            equipment: f.equipment,
            situation: f.situation,
            status: f.status,
            priority: f.priority,
            response_deadline_days: f.deadline,
            notes: f.notes,
            version: f.version,
            sector_id: self.to_sector.map(SectorId),
            user_id,
            route_id: self.route.map(RouteId),
            client: f.client,
            linked_proposals: f.linked_proposals,
        }
    }
}

impl RouteArgs {
    pub fn into_new_route(self) -> NewRoute {
        NewRoute {
            name: self.name,
            description: self.description,
            active: self.active,
            steps: self.steps,
        }
    }
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

fn parse_step(raw: &str) -> Result<StepDraft, String> {
    let (ordinal, target) = match raw.split_once('@') {
        Some((ord, rest)) => {
            let ord = ord
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid step order `{ord}`"))?;
            (Some(ord), rest)
        }
        None => (None, raw),
    };
    let (kind, id) = target
        .split_once(':')
        .ok_or_else(|| format!("expected `sector:<id>` or `user:<id>`, got `{raw}`"))?;
    let id = id
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid id `{id}`"))?;
    let draft = match kind.trim().to_ascii_lowercase().as_str() {
        "sector" => StepDraft::sector(SectorId(id)),
        "user" => StepDraft::user(UserId(id)),
        other => return Err(format!("unknown step kind `{other}`")),
    };
    Ok(match ordinal {
        Some(ord) => draft.at(ord),
        None => draft,
    })
}
