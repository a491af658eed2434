//! Roundtable - scripted multi-role LLM conversations.
//!
//! A flow template lists steps; each step has one role speak to the
//! conversation so far. The [`application::FlowEngine`] advances a session
//! one step per call, recording every provider interaction for audit.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;
