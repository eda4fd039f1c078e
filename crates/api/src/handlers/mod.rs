pub mod runs;
pub mod triggers;
pub mod workflows;
