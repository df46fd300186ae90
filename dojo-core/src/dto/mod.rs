//! Data Transfer Objects for the judge HTTP contract

pub mod job;
