//! WordprocessingML (DOCX) run highlighting.
//!
//! `word/document.xml` is streamed event by event. Every `w:r` is buffered
//! until its end tag, its `w:t` text is joined, and the first query term that
//! occurs in it (case-insensitively) sets the run's `w:highlight`. Runs that
//! match nothing, and every other part of the package, are written back
//! byte for byte.

use std::io::{Cursor, Read, Write};

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive};

use super::{AnnotateError, Annotator};
use crate::palette::Swatch;
use crate::query::Query;

/// Main document part inside the OOXML package.
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Maximum decompressed size of the document part (zip-bomb protection).
const MAX_PART_BYTES: u64 = 50 * 1024 * 1024;

/// `w:rPr` children that must come after `w:highlight` (CT_RPr sequence).
const AFTER_HIGHLIGHT: &[&[u8]] = &[
    b"u",
    b"effect",
    b"bdr",
    b"shd",
    b"fitText",
    b"vertAlign",
    b"rtl",
    b"cs",
    b"em",
    b"lang",
    b"eastAsianLayout",
    b"specVanish",
    b"oMath",
    b"rPrChange",
];

/// Highlights matching runs in `.docx` packages.
pub struct DocxAnnotator;

impl Annotator for DocxAnnotator {
    fn annotate(&self, bytes: &[u8], query: &Query) -> Result<Vec<u8>, AnnotateError> {
        if query.is_empty() {
            return Ok(bytes.to_vec());
        }
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let document = read_part(&mut archive, DOCUMENT_PART)?;
        let (rewritten, touched) = highlight_runs(&document, query)?;
        if touched == 0 {
            return Ok(bytes.to_vec());
        }
        tracing::debug!(runs = touched, "highlighted docx runs");
        repackage(&mut archive, &rewritten)
    }
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, AnnotateError> {
    let entry = archive.by_name(name)?;
    let mut out = Vec::new();
    entry.take(MAX_PART_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_PART_BYTES {
        return Err(AnnotateError::Malformed(format!(
            "{} exceeds size limit ({} bytes)",
            name, MAX_PART_BYTES
        )));
    }
    Ok(out)
}

/// Copies every entry of `archive` into a new package, replacing the
/// document part with `document`. Entry order is preserved.
fn repackage(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    document: &[u8],
) -> Result<Vec<u8>, AnnotateError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if entry.name() == DOCUMENT_PART {
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(DOCUMENT_PART, options)?;
            writer.write_all(document)?;
        } else {
            writer.raw_copy_file(entry)?;
        }
    }
    Ok(writer.finish()?.into_inner())
}

fn is_named(event: &Event<'_>, name: &[u8]) -> (bool, bool) {
    match event {
        Event::Start(e) => (e.name().as_ref() == name, false),
        Event::End(e) => (false, e.name().as_ref() == name),
        _ => (false, false),
    }
}

/// Rewrites the document part. Returns the new XML and the number of runs
/// that received a highlight.
fn highlight_runs(xml: &[u8], query: &Query) -> Result<(Vec<u8>, usize), AnnotateError> {
    let terms = query.indexed_lowercase();
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();

    // Runs can nest through text boxes; only the outermost one is buffered.
    let mut run: Option<Vec<Event<'static>>> = None;
    let mut nested = 0usize;
    let mut touched = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?.into_owned();
        if matches!(event, Event::Eof) {
            break;
        }
        let (opens_run, closes_run) = is_named(&event, b"w:r");

        match run.as_mut() {
            None if opens_run => run = Some(vec![event]),
            None => writer.write_event(event)?,
            Some(events) => {
                if opens_run {
                    nested += 1;
                    events.push(event);
                } else if closes_run && nested > 0 {
                    nested -= 1;
                    events.push(event);
                } else if closes_run {
                    events.push(event);
                    if let Some(events) = run.take() {
                        let (events, hit) = apply_to_run(events, &terms)?;
                        if hit {
                            touched += 1;
                        }
                        for e in events {
                            writer.write_event(e)?;
                        }
                    }
                } else {
                    events.push(event);
                }
            }
        }
        buf.clear();
    }

    if let Some(events) = run.take() {
        return Err(AnnotateError::Malformed(format!(
            "unterminated w:r ({} buffered events)",
            events.len()
        )));
    }

    Ok((writer.into_inner(), touched))
}

/// Text of all `w:t` elements in a buffered run.
fn run_text(events: &[Event<'static>]) -> Result<String, AnnotateError> {
    let mut text = String::new();
    let mut in_t = false;
    for event in events {
        match event {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_t = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_t = false,
            Event::Text(t) if in_t => {
                text.push_str(&t.unescape().map_err(quick_xml::Error::from)?)
            }
            _ => {}
        }
    }
    Ok(text)
}

fn apply_to_run(
    events: Vec<Event<'static>>,
    terms: &[(usize, String)],
) -> Result<(Vec<Event<'static>>, bool), AnnotateError> {
    let text = run_text(&events)?.to_lowercase();
    if text.is_empty() {
        return Ok((events, false));
    }
    let Some((index, _)) = terms.iter().find(|(_, term)| text.contains(term.as_str())) else {
        return Ok((events, false));
    };
    let value = Swatch::for_index(*index).word_highlight();
    Ok((with_highlight(events, value), true))
}

fn highlight_element(value: &'static str) -> Event<'static> {
    Event::Empty(BytesStart::new("w:highlight").with_attributes([("w:val", value)]))
}

fn properties_with_highlight(value: &'static str) -> [Event<'static>; 3] {
    [
        Event::Start(BytesStart::new("w:rPr")),
        highlight_element(value),
        Event::End(BytesEnd::new("w:rPr")),
    ]
}

/// Shape of a buffered event, detached from its borrow.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Tag {
    Open,
    Close,
    Leaf,
    Other,
}

struct Seen {
    tag: Tag,
    is_rpr: bool,
    is_highlight: bool,
    after_highlight: bool,
}

fn inspect(event: &Event<'_>) -> Seen {
    let (tag, start) = match event {
        Event::Start(e) => (Tag::Open, Some(e)),
        Event::Empty(e) => (Tag::Leaf, Some(e)),
        Event::End(e) => {
            return Seen {
                tag: Tag::Close,
                is_rpr: e.name().as_ref() == b"w:rPr",
                is_highlight: false,
                after_highlight: false,
            }
        }
        _ => (Tag::Other, None),
    };
    match start {
        Some(e) => Seen {
            tag,
            is_rpr: e.name().as_ref() == b"w:rPr",
            is_highlight: e.name().as_ref() == b"w:highlight",
            after_highlight: AFTER_HIGHLIGHT.contains(&e.local_name().as_ref()),
        },
        None => Seen {
            tag,
            is_rpr: false,
            is_highlight: false,
            after_highlight: false,
        },
    }
}

/// Sets the highlight of a buffered run, replacing any existing one.
///
/// `events[0]` is the run's start tag. Depth 1 is the run's direct children,
/// depth 2 the children of its `w:rPr`.
fn with_highlight(events: Vec<Event<'static>>, value: &'static str) -> Vec<Event<'static>> {
    let mut out = Vec::with_capacity(events.len() + 3);
    let mut depth = 0usize;
    let mut saw_rpr = false;
    let mut in_rpr = false;
    let mut placed = false;
    let mut skipping: Option<usize> = None;

    for event in events {
        let seen = inspect(&event);

        if let Some(level) = skipping {
            match seen.tag {
                Tag::Open => depth += 1,
                Tag::Close => {
                    depth -= 1;
                    if depth == level {
                        skipping = None;
                    }
                }
                _ => {}
            }
            continue;
        }

        match seen.tag {
            Tag::Open | Tag::Leaf => {
                let leaf = seen.tag == Tag::Leaf;
                if depth == 1 && !saw_rpr && seen.is_rpr {
                    saw_rpr = true;
                    if leaf {
                        // <w:rPr/>
                        out.extend(properties_with_highlight(value));
                        placed = true;
                        continue;
                    }
                    in_rpr = true;
                } else if depth == 2 && in_rpr && seen.is_highlight {
                    if !leaf {
                        skipping = Some(depth);
                        depth += 1;
                    }
                    continue;
                } else if depth == 2 && in_rpr && !placed && seen.after_highlight {
                    out.push(highlight_element(value));
                    placed = true;
                } else if depth == 1 && !saw_rpr {
                    out.extend(properties_with_highlight(value));
                    saw_rpr = true;
                    placed = true;
                }
                if !leaf {
                    depth += 1;
                }
                out.push(event);
            }
            Tag::Close => {
                if depth == 2 && in_rpr && seen.is_rpr {
                    if !placed {
                        out.push(highlight_element(value));
                        placed = true;
                    }
                    in_rpr = false;
                } else if depth == 1 && !saw_rpr {
                    out.extend(properties_with_highlight(value));
                    saw_rpr = true;
                }
                depth = depth.saturating_sub(1);
                out.push(event);
            }
            Tag::Other => out.push(event),
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    /// Builds a minimal package whose body is `body_xml`, plus a styles part.
    pub(crate) fn docx_with_body(body_xml: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file("[Content_Types].xml", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<?xml version=\"1.0\"?><Types/>").unwrap();
            zip.start_file(DOCUMENT_PART, SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
                 <w:document xmlns:w=\"{}\"><w:body>{}</w:body></w:document>",
                W_NS, body_xml
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.start_file("word/styles.xml", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<w:styles/>").unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    pub(crate) fn document_xml(docx: &[u8]) -> String {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut entry = archive.by_name(DOCUMENT_PART).unwrap();
        let mut s = String::new();
        entry.read_to_string(&mut s).unwrap();
        s
    }

    fn annotate(docx: &[u8], query: &str) -> Vec<u8> {
        DocxAnnotator
            .annotate(docx, &Query::parse(query))
            .unwrap()
    }

    #[test]
    fn highlights_only_the_matching_run() {
        let docx = docx_with_body(
            "<w:p><w:r><w:t>Annual</w:t></w:r>\
             <w:r><w:t xml:space=\"preserve\"> Report 2024</w:t></w:r></w:p>",
        );
        let xml = document_xml(&annotate(&docx, "annual"));
        assert!(xml.contains(
            "<w:r><w:rPr><w:highlight w:val=\"yellow\"/></w:rPr><w:t>Annual</w:t></w:r>"
        ));
        assert!(xml.contains("<w:r><w:t xml:space=\"preserve\"> Report 2024</w:t></w:r>"));
        assert_eq!(xml.matches("w:highlight").count(), 1);
    }

    #[test]
    fn inserts_highlight_at_schema_position() {
        let docx = docx_with_body(
            "<w:p><w:r><w:rPr><w:b/><w:u w:val=\"single\"/></w:rPr><w:t>Budget</w:t></w:r></w:p>",
        );
        let xml = document_xml(&annotate(&docx, "budget"));
        assert!(xml.contains(
            "<w:rPr><w:b/><w:highlight w:val=\"yellow\"/><w:u w:val=\"single\"/></w:rPr>"
        ));
    }

    #[test]
    fn replaces_existing_highlight() {
        let docx = docx_with_body(
            "<w:p><w:r><w:rPr><w:highlight w:val=\"red\"/></w:rPr><w:t>alpha</w:t></w:r></w:p>",
        );
        let xml = document_xml(&annotate(&docx, "zzz alpha"));
        assert!(xml.contains("<w:rPr><w:highlight w:val=\"cyan\"/></w:rPr>"));
        assert!(!xml.contains("w:val=\"red\""));
    }

    #[test]
    fn expands_empty_run_properties() {
        let docx = docx_with_body("<w:p><w:r><w:rPr/><w:t>alpha</w:t></w:r></w:p>");
        let xml = document_xml(&annotate(&docx, "ALPHA"));
        assert!(xml.contains("<w:r><w:rPr><w:highlight w:val=\"yellow\"/></w:rPr><w:t>alpha</w:t></w:r>"));
    }

    #[test]
    fn first_matching_term_wins() {
        let docx = docx_with_body("<w:p><w:r><w:t>alpha beta</w:t></w:r></w:p>");
        let xml = document_xml(&annotate(&docx, "beta alpha"));
        assert!(xml.contains("w:val=\"yellow\""));
        assert_eq!(xml.matches("w:highlight").count(), 1);
    }

    #[test]
    fn ninth_term_wraps_to_first_color() {
        let docx = docx_with_body("<w:p><w:r><w:t>target</w:t></w:r></w:p>");
        let xml = document_xml(&annotate(&docx, "a1 a2 a3 a4 a5 a6 a7 a8 target"));
        assert!(xml.contains("w:val=\"yellow\""));
    }

    #[test]
    fn no_match_returns_input_bytes() {
        let docx = docx_with_body("<w:p><w:r><w:t>nothing here</w:t></w:r></w:p>");
        assert_eq!(annotate(&docx, "absent"), docx);
    }

    #[test]
    fn keeps_other_parts() {
        let docx = docx_with_body("<w:p><w:r><w:t>alpha</w:t></w:r></w:p>");
        let out = annotate(&docx, "alpha");
        let mut archive = ZipArchive::new(Cursor::new(out.as_slice())).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names.len(), 3);
        let mut styles = String::new();
        archive
            .by_name("word/styles.xml")
            .unwrap()
            .read_to_string(&mut styles)
            .unwrap();
        assert_eq!(styles, "<w:styles/>");
    }

    #[test]
    fn escaped_text_is_matched_unescaped() {
        let docx = docx_with_body("<w:p><w:r><w:t>R&amp;D</w:t></w:r></w:p>");
        let xml = document_xml(&annotate(&docx, "r&d"));
        assert!(xml.contains("<w:t>R&amp;D</w:t>"));
        assert!(xml.contains("w:highlight"));
    }

    #[test]
    fn missing_document_part_fails() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.start_file("other.xml", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        assert!(DocxAnnotator.annotate(&buf, &Query::parse("x")).is_err());
    }
}
