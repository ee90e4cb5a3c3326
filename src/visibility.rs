//! Quem pode ver e quem pode fazer o quê.
//!
//! [`VisibilityPolicy`] decide se uma pendência aparece para um ator.
//! [`AccessPolicy`] concentra as checagens de nível de privilégio por
//! capacidade.

use serde::{Deserialize, Serialize};

use crate::config::PrivilegeThresholds;
use crate::ids::{SectorId, UserId};
use crate::transfer::Ticket;

/// Identidade já autenticada pela camada externa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    #[serde(default)]
    pub sector_id: Option<SectorId>,
    #[serde(default)]
    pub privilege_level: u8,
}

pub struct VisibilityPolicy;

impl VisibilityPolicy {
    /// Usuário atribuído vê sozinho; sem usuário, o setor inteiro vê; sem nenhum, ninguém.
    pub fn visible(ticket: &Ticket, actor: &Actor) -> bool {
        match (ticket.user_id, ticket.sector_id) {
            (Some(user), _) => user == actor.id,
            (None, Some(sector)) => actor.sector_id == Some(sector),
            (None, None) => false,
        }
    }
}

/// Capability checks by privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    thresholds: PrivilegeThresholds,
}

impl AccessPolicy {
    pub fn new(thresholds: PrivilegeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn can_delete_ticket(&self, actor: &Actor) -> bool {
        actor.privilege_level >= self.thresholds.delete_ticket
    }

    /// Listing another user's (or a whole sector's) tickets directly.
    pub fn can_override_visibility(&self, actor: &Actor) -> bool {
        actor.privilege_level >= self.thresholds.override_visibility
    }

    pub fn can_edit_any_ticket(&self, actor: &Actor) -> bool {
        actor.privilege_level >= self.thresholds.edit_any_ticket
    }

    pub fn can_manage_routes(&self, actor: &Actor) -> bool {
        actor.privilege_level >= self.thresholds.manage_routes
    }

    /// Visible to the actor, or reachable through the override privilege.
    pub fn can_read(&self, ticket: &Ticket, actor: &Actor) -> bool {
        VisibilityPolicy::visible(ticket, actor) || self.can_override_visibility(actor)
    }

    pub fn can_edit(&self, ticket: &Ticket, actor: &Actor) -> bool {
        VisibilityPolicy::visible(ticket, actor) || self.can_edit_any_ticket(actor)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(PrivilegeThresholds::default())
    }
}
