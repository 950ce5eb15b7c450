//! Use-case services.
//!
//! # Responsibility
//! - Translate user actions into single-shot store writes.
//! - Keep presentation layers decoupled from store details.

pub mod todo_service;
