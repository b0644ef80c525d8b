//! Small text-shaping helpers shared by several stage handlers.

/// Strips a single surrounding fenced code block (with an optional
/// language tag on the opening fence) from a model response, per stage 8's
/// "strips any surrounding fenced code block" note.
pub fn strip_code_fence(content: &str) -> String {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim_end().to_string()
}

/// Extracts the first markdown section (a `#`-heading line plus its body,
/// up to the next heading of the same or higher level) whose heading text
/// contains `keyword`, case-insensitively; falls back to the document's
/// first `cap` characters if no heading matches. Always capped at `cap`
/// characters, per stage 7's "capped at 2,000 characters" note.
pub fn docs_excerpt(documentation: &str, keyword: &str, cap: usize) -> String {
    let keyword = keyword.to_lowercase();
    let lines: Vec<&str> = documentation.lines().collect();
    let mut start = None;
    for (i, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with('#') && line.to_lowercase().contains(&keyword) {
            start = Some(i);
            break;
        }
    }

    let excerpt = match start {
        Some(i) => {
            let mut end = lines.len();
            for (j, line) in lines.iter().enumerate().skip(i + 1) {
                if line.trim_start().starts_with('#') {
                    end = j;
                    break;
                }
            }
            lines[i..end].join("\n")
        }
        None => documentation.to_string(),
    };

    truncate_chars(&excerpt, cap)
}

fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}

/// Sanitises a repository name per stage 9: lowercase, every non-alphanumeric
/// run collapses to a single `-`, leading/trailing `-` trimmed, truncated to
/// 100 characters.
pub fn sanitize_repo_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_dash = false;
    for ch in raw.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    out.trim_matches('-').chars().take(100).collect()
}
