//! Document package management for surplus-funds recovery claims.
//!
//! Intake questionnaires are classified into a case type, the matching document bundle is
//! created with prefilled fields, and each document is driven through signing, notarization,
//! and mailing. Provider webhooks feed the same state machine as direct user actions.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
