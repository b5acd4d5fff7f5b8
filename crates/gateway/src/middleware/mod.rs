//! Request middleware

pub mod deadline;
pub mod metrics;
pub mod rate_limit;
