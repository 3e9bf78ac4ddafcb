//! Echo verification.
//!
//! After a round trip, the requested values are compared against the fields
//! the reply type is documented to echo. A mismatch is a result, not an
//! error: the link worked, the device just did something else.

use crate::protocol::{CommandDescriptor, FieldValue, Message};

/// Outcome of comparing one requested field against the reply.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCheck {
    /// Name of the field in the command.
    pub name: &'static str,
    /// Value that was sent.
    pub requested: FieldValue,
    /// Value the device reported, if the reply carried it.
    pub observed: Option<FieldValue>,
    /// Whether the two agree.
    pub passed: bool,
}

/// Per-field checks plus the overall verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    /// One entry per echoed field.
    pub checks: Vec<FieldCheck>,
    /// True only if every check passed.
    pub overall: bool,
}

impl VerificationResult {
    /// Returns the checks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &FieldCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.overall {
            return write!(f, "verified {} field(s)", self.checks.len());
        }
        write!(f, "mismatch:")?;
        for check in self.failures() {
            match &check.observed {
                Some(observed) => write!(
                    f,
                    " {} requested {} observed {}",
                    check.name, check.requested, observed
                )?,
                None => write!(f, " {} requested {} not reported", check.name, check.requested)?,
            }
        }
        Ok(())
    }
}

/// Integer kinds compare by value so a `u16` echo of a `u32` request still
/// matches.
fn same_value(requested: &FieldValue, observed: &FieldValue) -> bool {
    match (requested.as_i64(), observed.as_i64()) {
        (Some(a), Some(b)) => a == b,
        _ => requested == observed,
    }
}

/// Compares the requested fields of `command` against `reply`.
///
/// Only fields the reply type echoes are checked; the rest are skipped. A
/// reply of a different type than expected fails every echoed field.
#[must_use]
pub fn verify(command: &CommandDescriptor, reply: &Message) -> VerificationResult {
    let matching_type = reply.id() == command.reply_id();
    let mut checks = Vec::with_capacity(command.echoes().len());

    for &(request_field, reply_field) in command.echoes() {
        let Some(requested) = command.field(request_field) else {
            continue;
        };
        let observed = if matching_type {
            reply.field(reply_field).cloned()
        } else {
            None
        };
        let passed = observed
            .as_ref()
            .is_some_and(|observed| same_value(requested, observed));

        if !passed {
            tracing::warn!(
                "{} verification failed for {}: requested {}, observed {:?}",
                command.id().name(),
                request_field,
                requested,
                observed
            );
        }

        checks.push(FieldCheck {
            name: request_field,
            requested: requested.clone(),
            observed,
            passed,
        });
    }

    let overall = checks.iter().all(|c| c.passed);
    VerificationResult { checks, overall }
}
