//! Real-time event distribution: queue dispatcher, per-chat brokers,
//! online-user registry, and the per-connection pump.

pub mod broker;
pub mod dispatcher;
pub mod online;
pub mod registry;
pub mod server;
