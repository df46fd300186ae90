//! Dojo Core
//!
//! Core types shared by the Dojo judge client and CLI.
//!
//! This crate contains:
//! - Domain types: Jobs as reported by the judge service
//! - DTOs: Request/response bodies for the judge HTTP contract

pub mod domain;
pub mod dto;
