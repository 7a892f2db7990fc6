/// Sanitize extracted text before passing downstream.
/// Strips control and replacement characters, collapses runs of spaces,
/// trims every line and drops blank lines.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            line.chars()
                .filter(|c| !c.is_control() || *c == '\t')
                .filter(|c| *c != '\u{FFFD}' && *c != '\u{FEFF}')
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
