//! SQL operations grouped by table. Each takes the pool and returns
//! `Result<_, DbError>`.

pub mod outcomes;
pub mod runs;
pub mod workflows;
