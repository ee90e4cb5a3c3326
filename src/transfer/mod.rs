mod state;
mod ticket;

pub use state::{TransferRequest, TransferState, TransferStateMachine, Transition};
pub use ticket::{Assignment, FieldEdit, NewTicket, Ticket, TicketPatch, TrackedFields};
