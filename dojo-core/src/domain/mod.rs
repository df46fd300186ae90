//! Core domain types
//!
//! These types mirror what the judge service reports. The client never
//! mutates them; it only observes successive snapshots.

pub mod job;
