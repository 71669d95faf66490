//! Minimal end-of-line translation, standing in for the "magic
//! property" keyword/EOL expansion that `copy-and-translate` and
//! `copy-and-detranslate` log commands apply.
//!
//! This is the smallest concrete behavior that lets an installed file
//! actually exercise the *detranslate-then-retranslate* install step.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolStyle {
    Lf,
    Crlf,
    Cr,
    /// Leave line endings untouched — no EOL-style property is set.
    Native,
}

/// Normalizes `data` to bare `\n` line endings (the "detranslated",
/// canonical form stored in the pristine).
pub fn detranslate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\r' => {
                out.push(b'\n');
                if i + 1 < data.len() && data[i + 1] == b'\n' {
                    i += 1;
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// Expands bare `\n` line endings in `data` (already detranslated) to
/// the working file's configured EOL style.
pub fn translate(data: &[u8], style: EolStyle) -> Vec<u8> {
    match style {
        EolStyle::Lf | EolStyle::Native => data.to_vec(),
        EolStyle::Crlf => {
            let mut out = Vec::with_capacity(data.len());
            for &b in data {
                if b == b'\n' {
                    out.push(b'\r');
                }
                out.push(b);
            }
            out
        }
        EolStyle::Cr => data.iter().map(|&b| if b == b'\n' { b'\r' } else { b }).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn round_trips_crlf() {
        let original = b"a\r\nb\r\nc";
        let canonical = detranslate(original);
        assert_eq!(canonical, b"a\nb\nc");
        assert_eq!(translate(&canonical, EolStyle::Crlf), original);
    }

    #[test]
    fn native_is_identity() {
        let data = b"a\nb\n";
        assert_eq!(translate(data, EolStyle::Native), data);
        assert_eq!(detranslate(data), data);
    }

    /// `detranslate` is already idempotent on its own output, for any
    /// input: a pristine text is never itself carrying literal `\r`s
    /// once it has been canonicalized once.
    #[quickcheck]
    fn detranslate_is_idempotent(data: Vec<u8>) -> bool {
        let once = detranslate(&data);
        let twice = detranslate(&once);
        once == twice
    }

    /// Round-tripping a canonical (already-`\n`-only) text through
    /// `translate`-then-`detranslate` for any EOL style always gets
    /// the original bytes back.
    #[quickcheck]
    fn translate_then_detranslate_recovers_canonical_text(lines: Vec<u8>, style_tag: u8) -> bool {
        let canonical = detranslate(&lines);
        let style = match style_tag % 4 {
            0 => EolStyle::Lf,
            1 => EolStyle::Crlf,
            2 => EolStyle::Cr,
            _ => EolStyle::Native,
        };
        let translated = translate(&canonical, style);
        detranslate(&translated) == canonical
    }
}
