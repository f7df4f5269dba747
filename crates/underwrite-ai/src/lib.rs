//! Property underwriting pipeline.
//!
//! A request (address + postcode) runs through a fixed five-stage plan of risk tasks, a
//! deterministic scoring engine and two synthesis stages, producing an ordered stream of
//! progress events that ends in a single [`AssessmentResult`] or a typed failure.
//!
//! [`AssessmentResult`]: workflows::underwriting::AssessmentResult

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
