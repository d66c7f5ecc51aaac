//! Bound-value substitution for fan-out children.

/// Literal marker replaced with a child's bound value at send time.
pub const INPUT_MARKER: &str = "<input>INPUT</input>";

/// Replace every input marker in `content` with `value`.
///
/// Returns the substituted text and whether a marker was present. A missing
/// marker is not an error; callers log it.
pub fn substitute_input(content: &str, value: &str) -> (String, bool) {
    if content.contains(INPUT_MARKER) {
        (content.replace(INPUT_MARKER, value), true)
    } else {
        (content.to_string(), false)
    }
}
