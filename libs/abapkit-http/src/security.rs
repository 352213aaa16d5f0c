//! HTTP security utilities.

/// Maximum body preview size kept in error values (8KB).
///
/// Non-2xx responses carry a preview of their body for diagnostics; ABAP
/// error pages can be large HTML documents, so the preview is capped.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;
