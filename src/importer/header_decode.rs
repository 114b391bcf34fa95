// ==========================================
// Precast tracking backend - header label decoding
// ==========================================
// Spreadsheet tools that round-trip through form posts leave header
// labels in a modified UTF-7 transport form (`+ACY-` → `&`,
// `+AF8-` → `_`, `+ACo-` → `*`), sometimes HTML-escaped on top.
//
// decode = repeat { utf7 runs → '+' to space → HTML entities → trim }
//          until the label stops changing
//
// Each pass either shortens the label or removes a '+', so the loop
// terminates, and its result is a fixed point: decode is idempotent.
// ==========================================

/// Decode a header label or cell identifier.
pub fn decode_header(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = decode_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn decode_once(input: &str) -> String {
    let transport = decode_transport(input);
    let unescaped = unescape_html(&transport);
    unescaped.trim().to_string()
}

// ==========================================
// Modified UTF-7 runs
// ==========================================

/// Replace every `+<base64>-` run with the UTF-16BE text it encodes;
/// any other `+` becomes a space. Scans strictly left to right.
fn decode_transport(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '+' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let run_start = i + 1;
        let mut run_end = run_start;
        while run_end < chars.len() && base64_value(chars[run_end]).is_some() {
            run_end += 1;
        }

        let terminated = run_end < chars.len() && chars[run_end] == '-';
        if terminated && run_end > run_start {
            if let Some(decoded) = decode_utf7_run(&chars[run_start..run_end]) {
                out.push_str(&decoded);
                i = run_end + 1; // consume the '-'
                continue;
            }
        }

        out.push(' ');
        i += 1;
    }

    out
}

fn base64_value(c: char) -> Option<u32> {
    match c {
        'A'..='Z' => Some(c as u32 - 'A' as u32),
        'a'..='z' => Some(c as u32 - 'a' as u32 + 26),
        '0'..='9' => Some(c as u32 - '0' as u32 + 52),
        '+' => Some(62),
        '/' => Some(63),
        _ => None,
    }
}

/// Base64 run → UTF-16BE code units → String. Returns None when the run
/// holds no complete unit, leaves non-zero padding bits, or contains
/// unpaired surrogates.
fn decode_utf7_run(run: &[char]) -> Option<String> {
    let mut units: Vec<u16> = Vec::new();
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &c in run {
        buffer = (buffer << 6) | base64_value(c)?;
        bits += 6;
        if bits >= 16 {
            bits -= 16;
            units.push(((buffer >> bits) & 0xFFFF) as u16);
            buffer &= (1 << bits) - 1;
        }
    }

    if units.is_empty() || bits >= 6 || buffer != 0 {
        return None;
    }

    String::from_utf16(&units).ok()
}

// ==========================================
// HTML entities
// ==========================================

fn unescape_html(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        // Entities are short; do not scan arbitrarily far for ';'
        let semi = tail
            .char_indices()
            .take(12)
            .find(|&(_, c)| c == ';')
            .map(|(idx, _)| idx);

        match semi.and_then(|end| entity_char(&tail[1..end]).map(|c| (c, end))) {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn entity_char(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix('x').or_else(|| numeric.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_sequences() {
        assert_eq!(decode_header("R+ACY-D"), "R&D");
        assert_eq!(decode_header("Cement+AF8-OPC"), "Cement_OPC");
        assert_eq!(decode_header("Plan+ACo-"), "Plan*");
    }

    #[test]
    fn test_plus_without_escape_becomes_space() {
        assert_eq!(decode_header("Shop+Drawing"), "Shop Drawing");
        assert_eq!(decode_header("A+B"), "A B");
        assert_eq!(decode_header("trailing+"), "trailing");
    }

    #[test]
    fn test_html_entities_and_trim() {
        assert_eq!(decode_header("  T1&#47;F1 "), "T1/F1");
        assert_eq!(decode_header("Steel &amp; Mesh"), "Steel & Mesh");
        assert_eq!(decode_header("a &unknown; b"), "a &unknown; b");
        assert_eq!(decode_header("&#x41;BC"), "ABC");
    }

    #[test]
    fn test_plain_labels_untouched() {
        for label in ["Cast", "T1/F1", "Steel_Fe500", "Beam-A", "Section 2-2"] {
            assert_eq!(decode_header(label), label);
        }
    }

    #[test]
    fn test_decode_is_idempotent() {
        let samples = [
            "R+ACY-D",
            "&amp;lt;x&amp;gt;",
            "+ACs-ACY-",
            "&#43;AF8-",
            " +ACY-amp; ",
            "a+b+c",
            "&&&;;",
            "+/v8-",
            "Plan &#x2B; Section",
            "",
        ];
        for s in samples {
            let once = decode_header(s);
            assert_eq!(decode_header(&once), once, "input: {:?}", s);
        }
    }
}
