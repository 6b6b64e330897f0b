//! Check-then-mutate helpers for kernel records.
//!
//! The existence predicate is always evaluated against live kernel state
//! immediately before the mutation; nothing is remembered across calls.

use std::future::Future;

/// How a record reached its desired state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Converged {
    /// The record was already in the desired state; nothing was mutated.
    Unchanged,
    /// The mutation was performed.
    Applied,
}

/// Runs `apply` only when `exists` reports the record is missing.
pub async fn ensure_present<E>(
    exists: impl Future<Output = bool>,
    apply: impl Future<Output = Result<(), E>>,
) -> Result<Converged, E> {
    if exists.await {
        return Ok(Converged::Unchanged);
    }
    apply.await?;
    Ok(Converged::Applied)
}

/// Runs `remove` only when `exists` reports the record is present.
pub async fn ensure_absent<E>(
    exists: impl Future<Output = bool>,
    remove: impl Future<Output = Result<(), E>>,
) -> Result<Converged, E> {
    if !exists.await {
        return Ok(Converged::Unchanged);
    }
    remove.await?;
    Ok(Converged::Applied)
}
