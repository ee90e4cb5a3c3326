//! Resolução de posição e próximo passo dentro de um roteiro.
//!
//! Todas as funções são puras: recebem o roteiro e a atribuição atual da
//! pendência e nunca consultam armazenamento.

use serde::Serialize;
use tracing::debug;

use crate::ids::{SectorId, UserId};
use crate::route::{Route, Step, StepKind};

/// Destinos válidos a partir da posição atual de uma pendência.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextTargets {
    /// Índice do passo atual, se a pendência estiver em algum passo.
    pub position: Option<usize>,
    /// Passo imediatamente seguinte (setor ou usuário).
    pub next_step: Option<Step>,
    /// Primeiro setor adiante, pulando passos de usuário.
    pub next_sector: Option<SectorId>,
}

/// Computes where a ticket stands inside a route and where it may go next.
pub struct RouteResolver;

impl RouteResolver {
    /// Índice do passo em que a pendência está.
    ///
    /// Um passo USER que case com `user` tem prioridade sobre qualquer passo
    /// SECTOR que case com `sector`, mesmo que o setor apareça antes.
    pub fn current_position(
        route: &Route,
        sector: Option<SectorId>,
        user: Option<UserId>,
    ) -> Option<usize> {
        let by_user = user.and_then(|u| {
            route
                .steps
                .iter()
                .position(|s| s.user_id() == Some(u))
        });
        by_user.or_else(|| {
            sector.and_then(|sec| {
                route
                    .steps
                    .iter()
                    .position(|s| s.sector_id() == Some(sec))
            })
        })
    }

    /// The step right after `index`, or `None` at the end or when unresolved.
    pub fn next_hop(route: &Route, index: Option<usize>) -> Option<&Step> {
        index.and_then(|i| route.steps.get(i + 1))
    }

    /// Próximo setor válido: o primeiro passo SECTOR depois da posição atual.
    pub fn next_valid_sector(
        route: &Route,
        sector: Option<SectorId>,
        user: Option<UserId>,
    ) -> Option<SectorId> {
        let index = Self::current_position(route, sector, user)?;
        route.steps[index + 1..].iter().find_map(Step::sector_id)
    }

    /// Sector transfers may pass through intermediate user steps.
    pub fn is_valid_sector_target(
        route: Option<&Route>,
        sector: Option<SectorId>,
        user: Option<UserId>,
        destination: SectorId,
    ) -> bool {
        let Some(route) = route else {
            return true;
        };
        let next = Self::next_valid_sector(route, sector, user);
        debug!(route = %route.id, ?sector, ?user, %destination, ?next, "checking sector target");
        next == Some(destination)
    }

    /// User transfers must be the literal next step; nothing is skipped.
    pub fn is_valid_user_target(
        route: Option<&Route>,
        sector: Option<SectorId>,
        user: Option<UserId>,
        destination: UserId,
    ) -> bool {
        let Some(route) = route else {
            return true;
        };
        let position = Self::current_position(route, sector, user);
        let next = Self::next_hop(route, position);
        debug!(route = %route.id, ?sector, ?user, %destination, ?next, "checking user target");
        matches!(next, Some(step) if step.kind() == StepKind::User && step.user_id() == Some(destination))
    }

    pub fn next_targets(route: &Route, sector: Option<SectorId>, user: Option<UserId>) -> NextTargets {
        let position = Self::current_position(route, sector, user);
        NextTargets {
            position,
            next_step: Self::next_hop(route, position).copied(),
            next_sector: Self::next_valid_sector(route, sector, user),
        }
    }
}
