//! Alert sources.

pub mod alertmanager;

pub use alertmanager::{generate_fingerprint, AlertManagerWebhook, AlertRecord};
