// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The three agent variants.

mod code;
mod requirements;
mod test_gen;

pub use code::CodeGenerator;
pub use requirements::RequirementsAnalyzer;
pub use test_gen::TestGenerator;

use once_cell::sync::Lazy;
use regex::Regex;

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n?```").unwrap());

/// Pull a JSON object out of a model reply.
///
/// Prefers a fenced code block; otherwise takes the outermost braces.
pub(crate) fn extract_json(reply: &str) -> Option<&str> {
    if let Some(body) = JSON_FENCE.captures(reply).and_then(|c| c.get(1)) {
        let body = body.as_str().trim();
        if body.starts_with('{') {
            return Some(body);
        }
    }
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

pub(crate) fn is_python(path: &str) -> bool {
    path.ends_with(".py")
}

/// Pytest naming: `test_*.py` or `*_test.py`.
pub(crate) fn is_test_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    is_python(name) && (name.starts_with("test_") || name.ends_with("_test.py"))
}
