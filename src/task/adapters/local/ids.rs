//! Task id allocation.

use crate::task::{
    domain::{TaskDomainError, TaskId},
    ports::{IdRequest, TaskBackendError, TaskBackendResult},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

const SUFFIX_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RADIX: u128 = 36;
const DIGITS_PER_UUID: usize = 12;

/// Returns `length` random upper-case alphanumeric characters.
#[must_use]
pub fn random_suffix(length: usize) -> String {
    let mut suffix = String::with_capacity(length);
    while suffix.len() < length {
        let mut entropy = Uuid::new_v4().as_u128();
        for _ in 0..DIGITS_PER_UUID.min(length - suffix.len()) {
            let digit = entropy.checked_rem(RADIX).unwrap_or_default();
            entropy = entropy.checked_div(RADIX).unwrap_or_default();
            let index = usize::try_from(digit).unwrap_or_default();
            if let Some(&symbol) = SUFFIX_ALPHABET.get(index) {
                suffix.push(char::from(symbol));
            }
        }
    }
    suffix
}

/// Allocates a task id stamped with `allocated_at`.
///
/// Candidates come from `next_suffix`; any candidate for which `exists`
/// returns `true` is discarded.
///
/// # Errors
///
/// Returns [`TaskBackendError::IdAllocation`] when every candidate within
/// `request.attempts` already exists, and
/// [`TaskBackendError::InvalidTask`] for an unusable suffix length.
pub fn allocate_task_id<S, E>(
    allocated_at: DateTime<Utc>,
    request: IdRequest,
    mut next_suffix: S,
    mut exists: E,
) -> TaskBackendResult<TaskId>
where
    S: FnMut(usize) -> String,
    E: FnMut(&TaskId) -> bool,
{
    if request.suffix_length == 0 || request.suffix_length > TaskId::MAX_SUFFIX_LEN {
        return Err(TaskDomainError::InvalidSuffixLength(request.suffix_length).into());
    }

    for _ in 0..request.attempts {
        let candidate = TaskId::from_parts(allocated_at, &next_suffix(request.suffix_length))?;
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }
    Err(TaskBackendError::IdAllocation {
        attempts: request.attempts,
    })
}
