//! Armazenamento de pendências e roteiros.
//!
//! O núcleo só conhece os traits [`TicketStore`] e [`RouteStore`]; o
//! [`MemoryStore`] é a implementação em memória usada pela CLI e pelos
//! testes, com persistência opcional num snapshot JSON.
//!
//! ```text
//! snapshot JSON (disco)
//!     ↕  load_snapshot / save_snapshot
//! MemoryStore (RwLock, clones por leitura)
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::future::Future;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::NexusError;
use crate::ids::{RouteId, SectorId, TicketId, UserId};
use crate::route::{Route, Step};
use crate::stats::DateRange;
use crate::transfer::Ticket;

/// Filtro de consulta; campos ausentes não restringem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub user_id: Option<UserId>,
    pub sector_id: Option<SectorId>,
    pub created: Option<DateRange>,
}

impl TicketFilter {
    pub fn by_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn by_sector(sector_id: SectorId) -> Self {
        Self {
            sector_id: Some(sector_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.user_id.is_none_or(|u| ticket.user_id == Some(u))
            && self.sector_id.is_none_or(|s| ticket.sector_id == Some(s))
            && self.created.is_none_or(|r| r.contains(ticket.created_at))
    }
}

/// Ticket persistence as seen by the workflow core.
pub trait TicketStore: Send + Sync {
    fn get(&self, id: TicketId) -> impl Future<Output = Result<Option<Ticket>, NexusError>> + Send;

    fn find_all(&self) -> impl Future<Output = Result<Vec<Ticket>, NexusError>> + Send;

    fn find_filtered(
        &self,
        filter: TicketFilter,
    ) -> impl Future<Output = Result<Vec<Ticket>, NexusError>> + Send;

    /// Full-row upsert; saving the same ticket twice is a no-op.
    fn save(&self, ticket: Ticket) -> impl Future<Output = Result<(), NexusError>> + Send;

    /// Returns whether a row was removed.
    fn delete(&self, id: TicketId) -> impl Future<Output = Result<bool, NexusError>> + Send;

    fn exists(&self, id: TicketId) -> impl Future<Output = Result<bool, NexusError>> + Send;

    fn next_id(&self) -> impl Future<Output = Result<TicketId, NexusError>> + Send;
}

/// Route persistence. Steps are always returned ordered by ordinal.
pub trait RouteStore: Send + Sync {
    fn get(&self, id: RouteId) -> impl Future<Output = Result<Option<Route>, NexusError>> + Send;

    fn list(&self, active_only: bool) -> impl Future<Output = Result<Vec<Route>, NexusError>> + Send;

    fn list_steps(&self, id: RouteId) -> impl Future<Output = Result<Vec<Step>, NexusError>> + Send;

    /// Upserts name, description and active flag; steps are left alone.
    fn save_route(&self, route: Route) -> impl Future<Output = Result<(), NexusError>> + Send;

    fn replace_steps(
        &self,
        id: RouteId,
        steps: Vec<Step>,
    ) -> impl Future<Output = Result<(), NexusError>> + Send;

    fn delete(&self, id: RouteId) -> impl Future<Output = Result<bool, NexusError>> + Send;

    fn next_id(&self) -> impl Future<Output = Result<RouteId, NexusError>> + Send;
}

/// Conteúdo serializável de um [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub last_ticket_id: i64,
    #[serde(default)]
    pub last_route_id: i64,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_ticket_id: i64,
    last_route_id: i64,
    tickets: BTreeMap<TicketId, Ticket>,
    routes: BTreeMap<RouteId, Route>,
}

/// In-memory store; every read hands out a clone of committed data.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrates a store; id counters never go below the highest stored id.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let max_ticket = snapshot.tickets.iter().map(|t| t.id.0).max().unwrap_or(0);
        let max_route = snapshot.routes.iter().map(|r| r.id.0).max().unwrap_or(0);
        let state = MemoryState {
            last_ticket_id: snapshot.last_ticket_id.max(max_ticket),
            last_route_id: snapshot.last_route_id.max(max_route),
            tickets: snapshot.tickets.into_iter().map(|t| (t.id, t)).collect(),
            routes: snapshot
                .routes
                .into_iter()
                .map(|mut r| {
                    r.steps.sort_by_key(|s| s.ordinal);
                    (r.id, r)
                })
                .collect(),
        };
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        Snapshot {
            last_ticket_id: state.last_ticket_id,
            last_route_id: state.last_route_id,
            tickets: state.tickets.values().cloned().collect(),
            routes: state.routes.values().cloned().collect(),
        }
    }
}

impl TicketStore for MemoryStore {
    async fn get(&self, id: TicketId) -> Result<Option<Ticket>, NexusError> {
        Ok(self.state.read().await.tickets.get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Ticket>, NexusError> {
        Ok(self.state.read().await.tickets.values().cloned().collect())
    }

    async fn find_filtered(&self, filter: TicketFilter) -> Result<Vec<Ticket>, NexusError> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn save(&self, ticket: Ticket) -> Result<(), NexusError> {
        let mut state = self.state.write().await;
        state.last_ticket_id = state.last_ticket_id.max(ticket.id.0);
        state.tickets.insert(ticket.id, ticket);
        Ok(())
    }

    async fn delete(&self, id: TicketId) -> Result<bool, NexusError> {
        Ok(self.state.write().await.tickets.remove(&id).is_some())
    }

    async fn exists(&self, id: TicketId) -> Result<bool, NexusError> {
        Ok(self.state.read().await.tickets.contains_key(&id))
    }

    async fn next_id(&self) -> Result<TicketId, NexusError> {
        let mut state = self.state.write().await;
        state.last_ticket_id += 1;
        Ok(TicketId(state.last_ticket_id))
    }
}

impl RouteStore for MemoryStore {
    async fn get(&self, id: RouteId) -> Result<Option<Route>, NexusError> {
        Ok(self.state.read().await.routes.get(&id).cloned())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Route>, NexusError> {
        let state = self.state.read().await;
        Ok(state
            .routes
            .values()
            .filter(|r| !active_only || r.active)
            .cloned()
            .collect())
    }

    async fn list_steps(&self, id: RouteId) -> Result<Vec<Step>, NexusError> {
        let state = self.state.read().await;
        state
            .routes
            .get(&id)
            .map(|r| r.steps.clone())
            .ok_or(NexusError::RouteNotFound(id))
    }

    async fn save_route(&self, route: Route) -> Result<(), NexusError> {
        let mut state = self.state.write().await;
        state.last_route_id = state.last_route_id.max(route.id.0);
        match state.routes.get_mut(&route.id) {
            Some(existing) => {
                existing.name = route.name;
                existing.description = route.description;
                existing.active = route.active;
            }
            None => {
                state.routes.insert(
                    route.id,
                    Route {
                        steps: Vec::new(),
                        ..route
                    },
                );
            }
        }
        Ok(())
    }

    async fn replace_steps(&self, id: RouteId, mut steps: Vec<Step>) -> Result<(), NexusError> {
        let mut state = self.state.write().await;
        let route = state.routes.get_mut(&id).ok_or(NexusError::RouteNotFound(id))?;
        steps.sort_by_key(|s| s.ordinal);
        route.steps = steps;
        Ok(())
    }

    async fn delete(&self, id: RouteId) -> Result<bool, NexusError> {
        Ok(self.state.write().await.routes.remove(&id).is_some())
    }

    async fn next_id(&self) -> Result<RouteId, NexusError> {
        let mut state = self.state.write().await;
        state.last_route_id += 1;
        Ok(RouteId(state.last_route_id))
    }
}

impl<S: TicketStore> TicketStore for Arc<S> {
    fn get(&self, id: TicketId) -> impl Future<Output = Result<Option<Ticket>, NexusError>> + Send {
        (**self).get(id)
    }

    fn find_all(&self) -> impl Future<Output = Result<Vec<Ticket>, NexusError>> + Send {
        (**self).find_all()
    }

    fn find_filtered(
        &self,
        filter: TicketFilter,
    ) -> impl Future<Output = Result<Vec<Ticket>, NexusError>> + Send {
        (**self).find_filtered(filter)
    }

    fn save(&self, ticket: Ticket) -> impl Future<Output = Result<(), NexusError>> + Send {
        (**self).save(ticket)
    }

    fn delete(&self, id: TicketId) -> impl Future<Output = Result<bool, NexusError>> + Send {
        TicketStore::delete(&**self, id)
    }

    fn exists(&self, id: TicketId) -> impl Future<Output = Result<bool, NexusError>> + Send {
        (**self).exists(id)
    }

    fn next_id(&self) -> impl Future<Output = Result<TicketId, NexusError>> + Send {
        TicketStore::next_id(&**self)
    }
}

impl<S: RouteStore> RouteStore for Arc<S> {
    fn get(&self, id: RouteId) -> impl Future<Output = Result<Option<Route>, NexusError>> + Send {
        RouteStore::get(&**self, id)
    }

    fn list(&self, active_only: bool) -> impl Future<Output = Result<Vec<Route>, NexusError>> + Send {
        (**self).list(active_only)
    }

    fn list_steps(&self, id: RouteId) -> impl Future<Output = Result<Vec<Step>, NexusError>> + Send {
        (**self).list_steps(id)
    }

    fn save_route(&self, route: Route) -> impl Future<Output = Result<(), NexusError>> + Send {
        (**self).save_route(route)
    }

    fn replace_steps(
        &self,
        id: RouteId,
        steps: Vec<Step>,
    ) -> impl Future<Output = Result<(), NexusError>> + Send {
        (**self).replace_steps(id, steps)
    }

    fn delete(&self, id: RouteId) -> impl Future<Output = Result<bool, NexusError>> + Send {
        RouteStore::delete(&**self, id)
    }

    fn next_id(&self) -> impl Future<Output = Result<RouteId, NexusError>> + Send {
        RouteStore::next_id(&**self)
    }
}

/// Lê um snapshot; arquivo inexistente equivale a um snapshot vazio.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, NexusError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Snapshot::default());
    }
    let bytes = fs::read(path)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Snapshot::default());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Grava o snapshot num arquivo temporário e o renomeia por cima do destino.
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<(), NexusError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), NexusError> {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}
