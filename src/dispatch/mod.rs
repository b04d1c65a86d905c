//! Ticket dispatch
//!
//! [`StageRegistry`] maps stage ids to handlers; [`Dispatcher`] walks each
//! envelope's route through them and reports a [`TicketOutcome`].

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{Dispatcher, HopRecord, TicketOutcome, check_contract, check_payload};
pub use registry::{StageHandler, StageRegistry};
