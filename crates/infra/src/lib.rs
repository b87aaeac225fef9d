//! Infrastructure layer: persistence, configuration, notifications and the
//! application services that orchestrate domain rules over the store.

pub mod config;
pub mod notifications;
pub mod services;
pub mod settings;
pub mod store;
