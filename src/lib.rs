//! NEXUS: pendências que percorrem roteiros de setores e usuários.
//!
//! O núcleo é formado por [`router::RouteResolver`],
//! [`transfer::TransferStateMachine`], [`audit::AuditLog`],
//! [`visibility::VisibilityPolicy`] e [`stats::StatisticsAggregator`].
//! [`service::TicketService`] amarra tudo sobre os traits de [`store`].

pub mod audit;
pub mod config;
pub mod error;
pub mod ids;
pub mod route;
pub mod router;
pub mod service;
pub mod stats;
pub mod store;
pub mod transfer;
pub mod visibility;

pub use error::{ErrorKind, NexusError};
