//! Operações expostas à camada de controle.
//!
//! [`TicketService`] é o único ponto que combina armazenamento, roteiros,
//! máquina de transferência e política de acesso. Toda mutação de uma
//! pendência acontece sob o lock daquela pendência:
//!
//! ```text
//! lock(id) → get → clone → validar/mutar/auditar → save → unlock
//! ```
//!
//! A mutação é feita numa cópia; em caso de erro nada é gravado.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rand::Rng;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, EntryDraft, FieldChanges, HistoryAction};
use crate::config::NexusConfig;
use crate::error::NexusError;
use crate::ids::{RouteId, SectorId, TicketId, UserId};
use crate::route::{NewRoute, Route};
use crate::router::{NextTargets, RouteResolver};
use crate::stats::{DateRange, StatisticsAggregator, TicketStatistics};
use crate::store::{MemoryStore, RouteStore, TicketFilter, TicketStore};
use crate::transfer::{FieldEdit, NewTicket, Ticket, TicketPatch, TransferRequest, TransferStateMachine};
use crate::visibility::{AccessPolicy, Actor, VisibilityPolicy};

type LockTable = Mutex<HashMap<TicketId, Arc<tokio::sync::Mutex<()>>>>;

pub struct TicketService<T, R> {
    tickets: T,
    routes: R,
    config: NexusConfig,
    access: AccessPolicy,
    locks: LockTable,
}

impl TicketService<Arc<MemoryStore>, Arc<MemoryStore>> {
    /// Service over a single in-memory store holding tickets and routes.
    pub fn with_memory_store(store: Arc<MemoryStore>, config: NexusConfig) -> Self {
        Self::new(Arc::clone(&store), store, config)
    }
}

impl<T: TicketStore, R: RouteStore> TicketService<T, R> {
    pub fn new(tickets: T, routes: R, config: NexusConfig) -> Self {
        let access = AccessPolicy::new(config.privileges);
        Self {
            tickets,
            routes,
            config,
            access,
            locks: Mutex::new(HashMap::new()),
        }
    }

    // --- tickets ---

    /// Cria uma pendência com entrada de histórico "Creation".
    pub async fn create_ticket(&self, actor: &Actor, new: NewTicket) -> Result<Ticket, NexusError> {
        if let Some(route_id) = new.route_id {
            self.require_route(route_id).await?;
        }

        let id = self.tickets.next_id().await?;
        let now = Utc::now();
        let number = match new.number.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => random_ticket_number(),
        };

        let mut ticket = Ticket::new(id, number, now);
        ticket.equipment = new.equipment;
        ticket.situation = new
            .situation
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(self.config.default_situation.clone()));
        ticket.status = new.status;
        ticket.priority = new.priority;
        ticket.response_deadline_days = new.response_deadline_days;
        ticket.origin = new.origin;
        ticket.notes = new.notes.clone();
        ticket.version = new.version;
        ticket.route_id = new.route_id;
        ticket.sector_id = new.sector_id;
        ticket.user_id = new.user_id;
        ticket.client = new.client;
        ticket.linked_proposals = new.linked_proposals;
        ticket.modified_by = Some(actor.id);

        let changes = FieldChanges {
            sector: (None, ticket.sector_id),
            user: (None, ticket.user_id),
            situation: (None, ticket.situation.clone()),
            status: (None, ticket.status.clone()),
        };
        let draft = EntryDraft::new(HistoryAction::Creation, changes)
            .with_notes(new.notes)
            .with_description(format!("Ticket {} created", ticket.number))
            .by(Some(actor.id));
        ticket.history = AuditLog::append(std::mem::take(&mut ticket.history), draft, now);

        self.tickets.save(ticket.clone()).await?;
        info!(ticket = %ticket.id, number = %ticket.number, actor = %actor.id, "ticket created");
        Ok(ticket)
    }

    /// Aplica uma atualização parcial, gravando uma única entrada de histórico.
    ///
    /// Mudança de setor, ou de usuário para outro usuário, vira proposta de
    /// transferência validada contra o roteiro atual. Limpar só o usuário é
    /// uma desatribuição direta.
    pub async fn patch_ticket(
        &self,
        actor: &Actor,
        id: TicketId,
        patch: TicketPatch,
    ) -> Result<Ticket, NexusError> {
        let (_guard, current) = self.load_locked(id).await?;
        if !self.access.can_edit(&current, actor) {
            warn!(ticket = %id, actor = %actor.id, "patch denied");
            return Err(NexusError::Unauthorized(format!(
                "user {} cannot edit ticket {id}",
                actor.id
            )));
        }
        if let Some(route_id) = patch.route_id
            && current.route_id != Some(route_id)
        {
            self.require_route(route_id).await?;
        }
        let route = self.route_for(&current).await?;

        let mut ticket = current.clone();
        let before = ticket.tracked();
        patch.apply_fields(&mut ticket);

        let request = TransferRequest {
            sector_id: patch.sector_id,
            user_id: patch.user_id,
        };
        let from = current.assignment();
        let sector_changes = request.sector_id.is_some_and(|s| Some(s) != from.sector_id);
        if !sector_changes && patch.user_id == FieldEdit::Clear {
            if from.user_id.is_some() {
                debug!(ticket = %id, "unassigning user directly");
                ticket.user_id = None;
            }
        } else if request.changes(from) {
            TransferStateMachine::apply_proposal(&mut ticket, route.as_ref(), &request)?;
        }

        if let Some(route_id) = patch.route_id {
            ticket.route_id = Some(route_id);
        }

        let now = Utc::now();
        let changes = before.changes_to(ticket.tracked());
        let draft = EntryDraft::from_changes(changes)
            .with_notes(patch.notes)
            .by(Some(actor.id));
        ticket.history = AuditLog::append(std::mem::take(&mut ticket.history), draft, now);
        ticket.updated_at = now;
        ticket.modified_by = Some(actor.id);

        self.tickets.save(ticket.clone()).await?;
        info!(ticket = %id, actor = %actor.id, transfer = %ticket.transfer, "ticket patched");
        Ok(ticket)
    }

    pub async fn accept_transfer(&self, actor: &Actor, id: TicketId) -> Result<Ticket, NexusError> {
        let (_guard, mut ticket) = self.load_locked(id).await?;
        TransferStateMachine::accept(&mut ticket, actor, Utc::now())?;
        self.tickets.save(ticket.clone()).await?;
        Ok(ticket)
    }

    pub async fn return_transfer(&self, actor: &Actor, id: TicketId) -> Result<Ticket, NexusError> {
        let (_guard, mut ticket) = self.load_locked(id).await?;
        TransferStateMachine::return_transfer(&mut ticket, actor, Utc::now())?;
        self.tickets.save(ticket.clone()).await?;
        Ok(ticket)
    }

    pub async fn delete_ticket(&self, actor: &Actor, id: TicketId) -> Result<(), NexusError> {
        if !self.access.can_delete_ticket(actor) {
            warn!(ticket = %id, actor = %actor.id, "delete denied");
            return Err(NexusError::Unauthorized(format!(
                "user {} may not delete tickets",
                actor.id
            )));
        }
        let removed = {
            let _guard = self.lock_ticket(id).await;
            self.tickets.delete(id).await
        };
        self.release_lock(id);
        if !removed? {
            return Err(NexusError::TicketNotFound(id));
        }
        info!(ticket = %id, actor = %actor.id, "ticket deleted");
        Ok(())
    }

    pub async fn get_ticket(&self, actor: &Actor, id: TicketId) -> Result<Ticket, NexusError> {
        let ticket = self.load_ticket(id).await?;
        if !self.access.can_read(&ticket, actor) {
            return Err(NexusError::Unauthorized(format!(
                "ticket {id} is not visible to user {}",
                actor.id
            )));
        }
        Ok(ticket)
    }

    /// Pendências visíveis ao ator, ou as de `target_user` com privilégio.
    pub async fn list_visible(
        &self,
        actor: &Actor,
        target_user: Option<UserId>,
    ) -> Result<Vec<Ticket>, NexusError> {
        let mut tickets = match target_user {
            Some(user) if user != actor.id => {
                if !self.access.can_override_visibility(actor) {
                    warn!(actor = %actor.id, target = %user, "visibility override denied");
                    return Err(NexusError::Unauthorized(format!(
                        "user {} may not list tickets of user {user}",
                        actor.id
                    )));
                }
                self.tickets.find_filtered(TicketFilter::by_user(user)).await?
            }
            _ => {
                let all = self.tickets.find_all().await?;
                all.into_iter()
                    .filter(|t| VisibilityPolicy::visible(t, actor))
                    .collect()
            }
        };
        tickets.sort_by_key(|t| t.id);
        Ok(tickets)
    }

    /// Every ticket of a sector for privileged actors; otherwise the
    /// actor's own sector, restricted to what the actor can see.
    pub async fn list_by_sector(
        &self,
        actor: &Actor,
        sector: SectorId,
    ) -> Result<Vec<Ticket>, NexusError> {
        let privileged = self.access.can_override_visibility(actor);
        if !privileged && actor.sector_id != Some(sector) {
            return Err(NexusError::Unauthorized(format!(
                "user {} may not list sector {sector}",
                actor.id
            )));
        }
        let mut tickets = self.tickets.find_filtered(TicketFilter::by_sector(sector)).await?;
        if !privileged {
            tickets.retain(|t| VisibilityPolicy::visible(t, actor));
        }
        tickets.sort_by_key(|t| t.id);
        Ok(tickets)
    }

    pub async fn get_statistics(
        &self,
        actor: &Actor,
        range: Option<DateRange>,
    ) -> Result<TicketStatistics, NexusError> {
        let tickets = self.tickets.find_all().await?;
        Ok(StatisticsAggregator::aggregate(tickets.iter(), actor, range, Utc::now()))
    }

    /// Próximos destinos válidos; `None` se a pendência não tem roteiro.
    pub async fn next_targets(
        &self,
        actor: &Actor,
        id: TicketId,
    ) -> Result<Option<NextTargets>, NexusError> {
        let ticket = self.get_ticket(actor, id).await?;
        let route = self.route_for(&ticket).await?;
        Ok(route.map(|r| RouteResolver::next_targets(&r, ticket.sector_id, ticket.user_id)))
    }

    // --- routes ---

    pub async fn create_route(&self, actor: &Actor, new: NewRoute) -> Result<Route, NexusError> {
        self.require_route_manager(actor)?;
        let definition = new.into_definition()?;
        let id = self.routes.next_id().await?;
        let route = Route::from_definition(id, definition, Utc::now());

        self.routes.save_route(route.clone()).await?;
        self.routes.replace_steps(id, route.steps.clone()).await?;
        info!(route = %id, steps = route.steps.len(), "route created");
        Ok(route)
    }

    /// Replaces metadata and steps; `active` is kept when not supplied.
    pub async fn update_route(
        &self,
        actor: &Actor,
        id: RouteId,
        new: NewRoute,
    ) -> Result<Route, NexusError> {
        self.require_route_manager(actor)?;
        let existing = self.require_route(id).await?;
        let definition = new.into_definition()?;
        let route = Route {
            id,
            name: definition.name,
            description: definition.description,
            active: definition.active.unwrap_or(existing.active),
            created_at: existing.created_at,
            steps: definition.steps,
        };

        self.routes.save_route(route.clone()).await?;
        self.routes.replace_steps(id, route.steps.clone()).await?;
        info!(route = %id, steps = route.steps.len(), "route updated");
        Ok(route)
    }

    pub async fn delete_route(&self, actor: &Actor, id: RouteId) -> Result<(), NexusError> {
        self.require_route_manager(actor)?;
        if !self.routes.delete(id).await? {
            return Err(NexusError::RouteNotFound(id));
        }
        info!(route = %id, "route deleted");
        Ok(())
    }

    pub async fn get_route(&self, id: RouteId) -> Result<Route, NexusError> {
        self.require_route(id).await
    }

    pub async fn list_routes(&self, active_only: bool) -> Result<Vec<Route>, NexusError> {
        self.routes.list(active_only).await
    }

    // --- helpers ---

    async fn lock_ticket(&self, id: TicketId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    /// Locks the ticket and loads it; a missing ticket leaves no lock entry behind.
    async fn load_locked(&self, id: TicketId) -> Result<(OwnedMutexGuard<()>, Ticket), NexusError> {
        let guard = self.lock_ticket(id).await;
        match self.tickets.get(id).await {
            Ok(Some(ticket)) => Ok((guard, ticket)),
            Ok(None) => {
                drop(guard);
                self.release_lock(id);
                Err(NexusError::TicketNotFound(id))
            }
            Err(error) => {
                drop(guard);
                self.release_lock(id);
                Err(error)
            }
        }
    }

    // Só remove a entrada se ninguém mais a segura ou espera por ela.
    fn release_lock(&self, id: TicketId) {
        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if table.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            table.remove(&id);
        }
    }

    async fn load_ticket(&self, id: TicketId) -> Result<Ticket, NexusError> {
        self.tickets
            .get(id)
            .await?
            .ok_or(NexusError::TicketNotFound(id))
    }

    async fn require_route(&self, id: RouteId) -> Result<Route, NexusError> {
        self.routes.get(id).await?.ok_or(NexusError::RouteNotFound(id))
    }

    /// Roteiro da pendência; um roteiro apagado vale como roteiro sem passos.
    async fn route_for(&self, ticket: &Ticket) -> Result<Option<Route>, NexusError> {
        let Some(route_id) = ticket.route_id else {
            return Ok(None);
        };
        match self.routes.get(route_id).await? {
            Some(route) => Ok(Some(route)),
            None => {
                warn!(ticket = %ticket.id, route = %route_id, "ticket is bound to a missing route");
                Ok(Some(Route {
                    id: route_id,
                    name: String::new(),
                    description: None,
                    active: false,
                    created_at: ticket.created_at,
                    steps: Vec::new(),
                }))
            }
        }
    }

    fn require_route_manager(&self, actor: &Actor) -> Result<(), NexusError> {
        if self.access.can_manage_routes(actor) {
            Ok(())
        } else {
            Err(NexusError::Unauthorized(format!(
                "user {} may not manage routes",
                actor.id
            )))
        }
    }
}

fn random_ticket_number() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}
