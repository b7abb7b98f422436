//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into issuance, scan and ledger use-cases.
//! - Keep CLI and transport layers decoupled from storage details.
//!
//! # Invariants
//! - Every service reads "now" from the injected shared clock only.

pub mod attendance_recorder;
pub mod scan_verifier;
pub mod token_issuer;
