//! Shared error machinery for the workspace.

/// A trait for assigning a stable, machine-readable string code to an error.
///
/// The codes are part of the operational surface (log fields, metric labels)
/// and must never change once shipped, even if the display text does.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}
