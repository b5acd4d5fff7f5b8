//! Service layer used by the HTTP gateway

mod qa;

pub use qa::{QaAnswer, QaService};
