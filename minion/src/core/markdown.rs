//! Removal of code fences that wrap an entire model reply.

use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```.*$").expect("code fence regex should be valid"));

/// Strip markdown code fences that wrap the whole of `content`.
///
/// Models often fence their replies even when told not to. A leading fence
/// line is removed, and the trailing fence line is removed when the reply
/// opened with a fence or the fence count is odd. Fences inside otherwise
/// plain text are left alone; if nothing is stripped the input is returned
/// unchanged.
pub fn strip_wrapping_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    let fence_count = CODE_FENCE_RE.find_iter(trimmed).count();
    if fence_count == 0 {
        return content.to_string();
    }

    let mut start = 0;
    if let Some(first) = trimmed.lines().next()
        && CODE_FENCE_RE.is_match(first)
    {
        start = (first.len() + 1).min(trimmed.len());
    }

    let mut end = trimmed.len();
    if (fence_count % 2 == 1 || start != 0)
        && let Some(last) = trimmed.lines().last()
        && CODE_FENCE_RE.is_match(last)
    {
        end -= last.len();
    }
    let end = end.max(start);

    if start == 0 && end == trimmed.len() {
        return content.to_string();
    }
    trimmed[start..end].to_string()
}
