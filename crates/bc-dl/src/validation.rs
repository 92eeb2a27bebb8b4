//! Accumulating validation.
//!
//! Independent checks are all run and every failure is kept, so a caller sees
//! everything wrong with a page or a file listing in one pass.

use std::fmt;

/// Non-empty, ordered list of human-readable diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    messages: Vec<String>,
}

/// Result of a check that reports failures as accumulated diagnostics.
pub type Validation<T> = Result<T, ValidationError>;

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    /// Build from a list of messages; `None` when the list is empty.
    pub fn from_messages(messages: Vec<String>) -> Option<Self> {
        if messages.is_empty() {
            None
        } else {
            Some(Self { messages })
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Append every diagnostic of `other` after ours.
    pub fn combine(mut self, other: ValidationError) -> Self {
        self.messages.extend(other.messages);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages.join("\n"))
    }
}

impl std::error::Error for ValidationError {}

/// Attach the logical field name to a single-message failure.
pub fn lift<T>(field: &str, result: Result<T, String>) -> Validation<T> {
    result.map_err(|err| ValidationError::new(format!("Failed to decode {field}: {err}")))
}

/// Pair two independent results, keeping the errors of both sides.
pub fn zip<A, B>(a: Validation<A>, b: Validation<B>) -> Validation<(A, B)> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(left), Err(right)) => Err(left.combine(right)),
        (Err(err), Ok(_)) | (Ok(_), Err(err)) => Err(err),
    }
}

/// Collect every item, failing with all item errors if any failed.
pub fn collect_all<T, I>(results: I) -> Validation<Vec<T>>
where
    I: IntoIterator<Item = Validation<T>>,
{
    let mut values = Vec::new();
    let mut errors: Option<ValidationError> = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) => {
                errors = Some(match errors {
                    Some(acc) => acc.combine(err),
                    None => err,
                });
            }
        }
    }
    match errors {
        Some(err) => Err(err),
        None => Ok(values),
    }
}
