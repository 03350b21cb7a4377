//! Sanitizing peer-supplied strings before they reach a terminal or a path.

/// Neutralize terminal control sequences. `ESC` becomes a visible `[ESC]`
/// tag; other control characters except newline and tab become `?`.
pub fn for_terminal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\x1b' => out.push_str("[ESC]"),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => out.push('?'),
            c => out.push(c),
        }
    }
    out
}

/// Reduce a peer-supplied filename to a single safe path component.
///
/// Directory parts are dropped, control characters removed, and names that
/// would resolve outside the target directory fall back to `"unnamed"`.
pub fn file_name(input: &str) -> String {
    let last = input.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
