//! Domain model: escrow ledger, negotiation lifecycle, webhook events and
//! the ports the application layer depends on.

pub mod escrow;
pub mod events;
pub mod money;
pub mod negotiation;
pub mod ports;
pub mod webhook;
