use std::sync::OnceLock;

use regex::Regex;

fn context_overflow_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)(context|token|prompt|request).*(limit|length|size|large|long|exceed|overflow)")
            .expect("context overflow regex must compile")
    })
}

/// Heuristic for stderr or spawn errors caused by an oversized prompt.
pub fn is_context_overflow(text: &str) -> bool {
    context_overflow_regex().is_match(text) || text.to_ascii_lowercase().contains("e2big")
}
