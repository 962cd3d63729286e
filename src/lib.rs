//! Assessor.AI — conversational personal-finance/agenda assistant
//!
//! A coordinator classifies each free-text utterance into a route, forwards
//! a structured handoff message to a domain specialist (finance, agenda or
//! FAQ), collects a constrained JSON contract back and renders it into a
//! fixed user-facing format.
//!
//! DISPATCH FLOW:
//! INPUT → ROUTE → (PLAIN REPLY) | (HANDOFF → SPECIALIST → CONTRACT → RENDER)

pub mod api;
pub mod contract;
pub mod error;
pub mod faq;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod router;
pub mod session;
pub mod specialist;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use orchestrator::{render, Orchestrator};
