pub mod store;
pub mod types;

pub use store::TraceStore;
pub use types::{trace_text, NewTrace, ThoughtTrace};
