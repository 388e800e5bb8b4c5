/// Escapes the characters that are significant in HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8);
    push_escaped(&mut out, input);
    out
}

/// Appends `input` to `out`, HTML-escaped.
pub fn push_escaped(out: &mut String, input: &str) {
    let mut last = 0;
    for (i, b) in input.bytes().enumerate() {
        let replacement = match b {
            b'&' => "&amp;",
            b'<' => "&lt;",
            b'>' => "&gt;",
            b'"' => "&quot;",
            b'\'' => "&apos;",
            _ => continue,
        };
        out.push_str(&input[last..i]);
        out.push_str(replacement);
        last = i + 1;
    }
    out.push_str(&input[last..]);
}
