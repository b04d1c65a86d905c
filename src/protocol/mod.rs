//! Wire types shared by every stage
//!
//! [`StageId`] is the closed stage vocabulary; [`Envelope`] carries one
//! ticket's payload and route between stages.

pub mod messages;
pub mod stages;

pub use messages::*;
pub use stages::{StageId, UnknownStage};
