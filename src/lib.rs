//! Applicant Sync: job-application notifications from chat into spreadsheets.

pub mod channels;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod sheets;
