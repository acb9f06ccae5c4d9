//! Inline term highlighting for plain-text snippets.
//!
//! Produces HTML fragments of the form
//! `<mark style="background:#FFFF00;">term</mark>`. Terms are applied in
//! query order; a later term can match text inside an earlier term's marker,
//! in which case the markers nest. Marker tags themselves are never matched,
//! so stripping every marker gives back the original text byte for byte.

use regex::RegexBuilder;

use crate::palette::Swatch;
use crate::query::Query;

pub const MARK_CLOSE: &str = "</mark>";

/// Opening marker for query term `index`.
pub fn mark_open(index: usize) -> String {
    format!(
        "<mark style=\"background:{};\">",
        Swatch::for_index(index).hex()
    )
}

enum Piece {
    Text(String),
    Marker(String),
}

/// Wraps every case-insensitive occurrence of each query term in `text`.
pub fn highlight(text: &str, query: &Query) -> String {
    if text.is_empty() {
        return String::new();
    }
    if query.is_empty() {
        return text.to_string();
    }

    let mut pieces = vec![Piece::Text(text.to_string())];

    for (i, term) in query.terms().iter().enumerate() {
        let re = match RegexBuilder::new(&regex::escape(term))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(term = %term, error = %e, "skipping unmatchable term");
                continue;
            }
        };

        let open = mark_open(i);
        let mut next = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let Piece::Text(s) = piece else {
                next.push(piece);
                continue;
            };
            let mut last = 0;
            for m in re.find_iter(&s) {
                if m.start() > last {
                    next.push(Piece::Text(s[last..m.start()].to_string()));
                }
                next.push(Piece::Marker(open.clone()));
                next.push(Piece::Text(m.as_str().to_string()));
                next.push(Piece::Marker(MARK_CLOSE.to_string()));
                last = m.end();
            }
            if last < s.len() {
                next.push(Piece::Text(s[last..].to_string()));
            }
        }
        pieces = next;
    }

    pieces
        .into_iter()
        .map(|p| match p {
            Piece::Text(s) | Piece::Marker(s) => s,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_markers(s: &str) -> String {
        let re = regex::Regex::new(r#"<mark style="background:#[0-9A-F]{6};">|</mark>"#).unwrap();
        re.replace_all(s, "").into_owned()
    }

    #[test]
    fn empty_text_yields_empty() {
        assert_eq!(highlight("", &Query::parse("anything")), "");
    }

    #[test]
    fn empty_query_is_identity() {
        assert_eq!(highlight("Some text", &Query::parse("")), "Some text");
    }

    #[test]
    fn no_match_is_identity() {
        assert_eq!(highlight("Some text", &Query::parse("absent")), "Some text");
    }

    #[test]
    fn wraps_case_insensitively_preserving_original_case() {
        let out = highlight("Annual report. ANNUAL totals.", &Query::parse("annual"));
        assert_eq!(
            out,
            "<mark style=\"background:#FFFF00;\">Annual</mark> report. \
             <mark style=\"background:#FFFF00;\">ANNUAL</mark> totals."
        );
    }

    #[test]
    fn second_term_gets_second_color() {
        let out = highlight("alpha beta", &Query::parse("alpha beta"));
        assert!(out.contains("<mark style=\"background:#FFFF00;\">alpha</mark>"));
        assert!(out.contains("<mark style=\"background:#40E0D0;\">beta</mark>"));
    }

    #[test]
    fn overlapping_terms_nest() {
        let out = highlight("reporting", &Query::parse("reporting port"));
        assert_eq!(
            out,
            "<mark style=\"background:#FFFF00;\">re\
             <mark style=\"background:#40E0D0;\">port</mark>ing</mark>"
        );
    }

    #[test]
    fn marker_text_is_never_matched() {
        let text = "mark the background style";
        let out = highlight(text, &Query::parse("mark background style"));
        assert_eq!(strip_markers(&out), text);
        assert_eq!(out.matches("</mark>").count(), 3);
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let out = highlight("cost (USD) is 5.0", &Query::parse("(usd) 5.0"));
        assert!(out.contains(">(USD)</mark>"));
        assert!(out.contains(">5.0</mark>"));
        assert_eq!(strip_markers(&out), "cost (USD) is 5.0");
    }

    #[test]
    fn content_preserved_across_many_terms() {
        let text = "The quick brown fox jumps over the lazy dog. THE END.";
        let query = Query::parse("the o fox qu e lazy dog end x");
        let out = highlight(text, &query);
        assert_eq!(strip_markers(&out), text);
        assert_eq!(
            out.matches("<mark").count(),
            out.matches("</mark>").count()
        );
    }
}
