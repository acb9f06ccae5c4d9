//! PDF highlight annotations.
//!
//! Text layout comes from `pdf-extract`: every shown character arrives at a
//! [`GlyphCollector`] with its text rendering matrix and advance width, with
//! font encodings and standard-14 metrics already applied. Characters are
//! grouped into visual lines, query terms are searched per line, and each
//! occurrence gets a `/Highlight` annotation (written with `lopdf`) whose
//! quadrilateral covers the matched glyphs.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};

use super::{AnnotateError, Annotator};
use crate::palette::Swatch;
use crate::query::Query;

/// Fraction of the font size below the baseline covered by a highlight.
const DESCENT: f32 = 0.22;
/// Fraction of the font size above the baseline covered by a highlight.
const ASCENT: f32 = 0.88;
/// Horizontal gap (in font sizes) treated as a word break.
const WORD_GAP: f32 = 0.25;

/// Adds highlight annotations to `.pdf` documents.
pub struct PdfAnnotator;

impl Annotator for PdfAnnotator {
    fn annotate(&self, bytes: &[u8], query: &Query) -> Result<Vec<u8>, AnnotateError> {
        if query.is_empty() {
            return Ok(bytes.to_vec());
        }
        let mut doc = Document::load_mem(bytes)?;
        let terms: Vec<(usize, Vec<char>)> = query
            .indexed_lowercase()
            .into_iter()
            .map(|(i, t)| (i, t.chars().map(fold).collect()))
            .collect();

        let mut lines_by_page = layout(&doc)?;
        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        let mut added = 0usize;
        for (page_num, page_id) in pages {
            let Some(lines) = lines_by_page.remove(&page_num) else {
                continue;
            };
            let mut found = Vec::new();
            for (index, term) in &terms {
                for line in &lines {
                    for quad in line.find(term) {
                        found.push((quad, *index));
                    }
                }
            }
            for (quad, index) in found {
                add_highlight(&mut doc, page_id, &quad, Swatch::for_index(index).rgb())?;
                added += 1;
            }
        }

        if added == 0 {
            return Ok(bytes.to_vec());
        }
        tracing::debug!(annotations = added, "highlighted pdf occurrences");
        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        Ok(out)
    }
}

/// Visual lines of every page, keyed by page number.
fn layout(doc: &Document) -> Result<HashMap<u32, Vec<Line>>, AnnotateError> {
    let mut collector = GlyphCollector::default();
    // pdf-extract panics on some malformed fonts and content streams.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::output_doc(doc, &mut collector)
    }));
    match result {
        Ok(Ok(())) => Ok(collector.pages),
        Ok(Err(e)) => Err(AnnotateError::Layout(e.to_string())),
        Err(_) => Err(AnnotateError::Layout("text extraction aborted".into())),
    }
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

// ============ Geometry ============

/// PDF transformation matrix `[a b c d e f]` (row-vector convention).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    fn apply(self, x: f32, y: f32) -> Point {
        let [a, b, c, d, e, f] = self.0;
        Point {
            x: a * x + c * y + e,
            y: b * x + d * y + f,
        }
    }
}

impl From<&Transform> for Matrix {
    fn from(t: &Transform) -> Self {
        Matrix([
            t.m11 as f32,
            t.m12 as f32,
            t.m21 as f32,
            t.m22 as f32,
            t.m31 as f32,
            t.m32 as f32,
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f32,
    y: f32,
}

/// Highlight quadrilateral in user space, in `/QuadPoints` corner order.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Quad {
    upper_left: Point,
    upper_right: Point,
    lower_left: Point,
    lower_right: Point,
}

impl Quad {
    fn corners(&self) -> [Point; 4] {
        [
            self.upper_left,
            self.upper_right,
            self.lower_left,
            self.lower_right,
        ]
    }

    fn bounds(&self) -> [f32; 4] {
        let pts = self.corners();
        let mut b = [pts[0].x, pts[0].y, pts[0].x, pts[0].y];
        for p in &pts[1..] {
            b[0] = b[0].min(p.x);
            b[1] = b[1].min(p.y);
            b[2] = b[2].max(p.x);
            b[3] = b[3].max(p.y);
        }
        b
    }
}

// ============ Lines ============

#[derive(Debug, Clone)]
struct Glyph {
    ch: char,
    /// `None` for synthesized word breaks.
    quad: Option<Quad>,
    origin: Point,
    end: Point,
    size: f32,
}

#[derive(Debug, Default)]
struct Line {
    glyphs: Vec<Glyph>,
}

impl Line {
    /// Non-overlapping occurrences of `term` (already case-folded).
    fn find(&self, term: &[char]) -> Vec<Quad> {
        let mut out = Vec::new();
        if term.is_empty() || term.len() > self.glyphs.len() {
            return out;
        }
        let mut i = 0;
        while i + term.len() <= self.glyphs.len() {
            let window = &self.glyphs[i..i + term.len()];
            if window.iter().zip(term).all(|(g, c)| fold(g.ch) == *c) {
                if let (Some(first), Some(last)) = (window[0].quad, window[term.len() - 1].quad) {
                    out.push(Quad {
                        upper_left: first.upper_left,
                        upper_right: last.upper_right,
                        lower_left: first.lower_left,
                        lower_right: last.lower_right,
                    });
                }
                i += term.len();
            } else {
                i += 1;
            }
        }
        out
    }
}

#[derive(Default)]
struct LineBuilder {
    lines: Vec<Line>,
    current: Line,
}

impl LineBuilder {
    fn push(&mut self, glyph: Glyph) {
        if let Some(last) = self.current.glyphs.last() {
            let size = glyph.size.max(last.size).max(f32::EPSILON);
            let dy = (glyph.origin.y - last.origin.y).abs();
            let gap = glyph.origin.x - last.end.x;
            if dy > 0.5 * size || gap < -size {
                self.break_line();
            } else if gap > WORD_GAP * size && last.ch != ' ' && glyph.ch != ' ' {
                self.current.glyphs.push(Glyph {
                    ch: ' ',
                    quad: None,
                    origin: last.end,
                    end: glyph.origin,
                    size,
                });
            }
        }
        self.current.glyphs.push(glyph);
    }

    fn break_line(&mut self) {
        if !self.current.glyphs.is_empty() {
            self.lines.push(std::mem::take(&mut self.current));
        }
    }

    fn finish(mut self) -> Vec<Line> {
        self.break_line();
        self.lines
    }
}

/// Receives positioned characters from `pdf_extract::output_doc` and builds
/// the lines of each page.
#[derive(Default)]
struct GlyphCollector {
    page: Option<u32>,
    current: LineBuilder,
    pages: HashMap<u32, Vec<Line>>,
}

impl OutputDev for GlyphCollector {
    fn begin_page(
        &mut self,
        page_num: u32,
        _media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> Result<(), OutputError> {
        self.page = Some(page_num);
        self.current = LineBuilder::default();
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        if let Some(page) = self.page.take() {
            let lines = std::mem::take(&mut self.current).finish();
            self.pages.insert(page, lines);
        }
        Ok(())
    }

    /// `trm` maps text space (unscaled by font size) to user space; `width`
    /// is the glyph advance in ems.
    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> Result<(), OutputError> {
        let chars: Vec<char> = char.chars().collect();
        if chars.is_empty() {
            return Ok(());
        }
        let m = Matrix::from(trm);
        let font_size = font_size as f32;
        let [_, _, c, d, _, _] = m.0;
        let size = font_size * (c * c + d * d).sqrt();
        let top = ASCENT * font_size;
        let bottom = -DESCENT * font_size;
        // Ligatures and multi-char mappings share the glyph's advance.
        let step = width as f32 * font_size / chars.len() as f32;
        for (i, ch) in chars.into_iter().enumerate() {
            let x0 = step * i as f32;
            let x1 = x0 + step;
            self.current.push(Glyph {
                ch,
                quad: Some(Quad {
                    upper_left: m.apply(x0, top),
                    upper_right: m.apply(x1, top),
                    lower_left: m.apply(x0, bottom),
                    lower_right: m.apply(x1, bottom),
                }),
                origin: m.apply(x0, 0.0),
                end: m.apply(x1, 0.0),
                size,
            });
        }
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

// ============ Annotation ============

fn reals(values: impl IntoIterator<Item = f32>) -> Vec<Object> {
    values.into_iter().map(Object::Real).collect()
}

fn add_highlight(
    doc: &mut Document,
    page_id: ObjectId,
    quad: &Quad,
    rgb: [f32; 3],
) -> Result<(), AnnotateError> {
    let bounds = quad.bounds();
    let points: Vec<f32> = quad.corners().iter().flat_map(|p| [p.x, p.y]).collect();

    let [ul, ur, ll, lr] = quad.corners();
    let appearance = format!(
        "/GS0 gs {:.3} {:.3} {:.3} rg {:.3} {:.3} m {:.3} {:.3} l {:.3} {:.3} l {:.3} {:.3} l h f",
        rgb[0], rgb[1], rgb[2], ll.x, ll.y, lr.x, lr.y, ur.x, ur.y, ul.x, ul.y
    );
    let form = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => reals(bounds),
            "Resources" => dictionary! {
                "ExtGState" => dictionary! {
                    "GS0" => dictionary! {
                        "Type" => "ExtGState",
                        "BM" => "Multiply",
                    },
                },
            },
        },
        appearance.into_bytes(),
    );
    let form_id = doc.add_object(form);

    let annot = dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "Rect" => reals(bounds),
        "QuadPoints" => reals(points),
        "C" => reals(rgb),
        "F" => Object::Integer(4),
        "P" => Object::Reference(page_id),
        "AP" => dictionary! { "N" => Object::Reference(form_id) },
    };
    let annot_id = doc.add_object(annot);
    attach_annotation(doc, page_id, annot_id)
}

fn attach_annotation(
    doc: &mut Document,
    page_id: ObjectId,
    annot_id: ObjectId,
) -> Result<(), AnnotateError> {
    let shared_array = match doc.get_dictionary(page_id)?.get(b"Annots") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    if let Some(id) = shared_array {
        if let Ok(Object::Array(annots)) = doc.get_object_mut(id) {
            annots.push(Object::Reference(annot_id));
            return Ok(());
        }
    }
    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    match page.get_mut(b"Annots") {
        Ok(Object::Array(annots)) => annots.push(Object::Reference(annot_id)),
        _ => page.set("Annots", vec![Object::Reference(annot_id)]),
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, StringFormat};

    fn standard_font(base: &str) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => Object::Name(base.as_bytes().to_vec()),
        }
    }

    /// One-page PDF showing `operations` with `font` as `/F1`; resources
    /// live on the page tree root so they are inherited.
    fn pdf_with_font(font: Dictionary, operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(font);
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn pdf_with_operations(operations: Vec<Operation>) -> Vec<u8> {
        pdf_with_font(standard_font("Courier"), operations)
    }

    fn line_operations(lines: &[&str]) -> Vec<Operation> {
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("TL", vec![14.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
        ];
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                ops.push(Operation::new("T*", vec![]));
            }
            ops.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        }
        ops.push(Operation::new("ET", vec![]));
        ops
    }

    fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
        pdf_with_operations(line_operations(lines))
    }

    fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(id) => doc.get_object(*id).unwrap(),
            other => other,
        }
    }

    fn number(obj: &Object) -> f32 {
        match obj {
            Object::Integer(i) => *i as f32,
            Object::Real(r) => *r as f32,
            other => panic!("not a number: {:?}", other),
        }
    }

    /// Highlight annotation dictionaries on the first page.
    fn highlights(pdf: &[u8]) -> Vec<Dictionary> {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let Ok(annots) = page.get(b"Annots") else {
            return Vec::new();
        };
        let annots = resolve(&doc, annots).as_array().unwrap();
        annots
            .iter()
            .map(|a| resolve(&doc, a).as_dict().unwrap().clone())
            .collect()
    }

    fn floats(dict: &Dictionary, key: &[u8]) -> Vec<f32> {
        dict.get(key)
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(number)
            .collect()
    }

    fn annotate(pdf: &[u8], query: &str) -> Vec<u8> {
        PdfAnnotator.annotate(pdf, &Query::parse(query)).unwrap()
    }

    #[test]
    fn no_occurrence_returns_input_unchanged() {
        let pdf = pdf_with_lines(&["Quarterly figures"]);
        let out = annotate(&pdf, "annual");
        assert_eq!(out, pdf);
        assert!(highlights(&out).is_empty());
    }

    #[test]
    fn highlights_case_insensitive_occurrence() {
        let pdf = pdf_with_lines(&["Annual Report 2024"]);
        let out = annotate(&pdf, "annual");
        let annots = highlights(&out);
        assert_eq!(annots.len(), 1);
        let annot = &annots[0];
        assert!(matches!(annot.get(b"Subtype"), Ok(Object::Name(n)) if n.as_slice() == b"Highlight"));
        assert_eq!(floats(annot, b"C"), vec![1.0, 1.0, 0.0]);

        // Courier 12pt: 7.2pt per glyph, "Annual" spans 100..143.2.
        let rect = floats(annot, b"Rect");
        assert!((rect[0] - 100.0).abs() < 0.01);
        assert!((rect[2] - 143.2).abs() < 0.01);
        assert!(rect[1] < 700.0 && rect[3] > 700.0);
        assert_eq!(floats(annot, b"QuadPoints").len(), 8);
    }

    #[test]
    fn proportional_font_uses_standard_metrics() {
        // Helvetica: "l" is 222/1000 em and the space 278, so "Report"
        // starts at 100 + (20 * 222 + 278) * 12 / 1000 = 156.616.
        let pdf = pdf_with_font(
            standard_font("Helvetica"),
            line_operations(&["llllllllllllllllllll Report"]),
        );
        let annots = highlights(&annotate(&pdf, "report"));
        assert_eq!(annots.len(), 1);
        let rect = floats(&annots[0], b"Rect");
        assert!((rect[0] - 156.616).abs() < 0.05, "rect {:?}", rect);
        // R e p o r t = 722 + 556 * 3 + 333 + 278 = 3001 thousandths.
        assert!((rect[2] - 192.628).abs() < 0.05, "rect {:?}", rect);
    }

    #[test]
    fn differences_encoding_maps_codes_to_glyph_names() {
        let mut font = standard_font("Helvetica");
        font.set(
            "Encoding",
            dictionary! {
                "Type" => "Encoding",
                "Differences" => vec![
                    1.into(),
                    Object::Name(b"R".to_vec()),
                    Object::Name(b"e".to_vec()),
                    Object::Name(b"p".to_vec()),
                    Object::Name(b"o".to_vec()),
                    Object::Name(b"r".to_vec()),
                    Object::Name(b"t".to_vec()),
                ],
            },
        );
        let pdf = pdf_with_font(
            font,
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(vec![1, 2, 3, 4, 5, 6], StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ],
        );
        assert_eq!(highlights(&annotate(&pdf, "report")).len(), 1);
    }

    #[test]
    fn each_term_uses_its_own_color() {
        let pdf = pdf_with_lines(&["alpha beta", "beta again"]);
        let annots = highlights(&annotate(&pdf, "alpha beta"));
        assert_eq!(annots.len(), 3);
        let colors: Vec<Vec<f32>> = annots.iter().map(|a| floats(a, b"C")).collect();
        assert_eq!(colors.iter().filter(|c| **c == vec![1.0, 1.0, 0.0]).count(), 1);
        assert_eq!(colors.iter().filter(|c| **c == vec![0.0, 0.8, 0.8]).count(), 2);
    }

    #[test]
    fn match_survives_kerned_text_array() {
        let pdf = pdf_with_operations(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("Ann"),
                    Object::Integer(-20),
                    Object::string_literal("ual"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ]);
        assert_eq!(highlights(&annotate(&pdf, "ANNUAL")).len(), 1);
    }

    #[test]
    fn terms_do_not_match_across_lines() {
        let pdf = pdf_with_lines(&["annu", "al"]);
        assert!(highlights(&annotate(&pdf, "annual")).is_empty());
    }

    #[test]
    fn positioned_words_are_not_glued_together() {
        let pdf = pdf_with_operations(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal("foo")]),
            Operation::new("Td", vec![100.into(), 0.into()]),
            Operation::new("Tj", vec![Object::string_literal("bar")]),
            Operation::new("ET", vec![]),
        ]);
        assert!(highlights(&annotate(&pdf, "foobar")).is_empty());
        assert_eq!(highlights(&annotate(&pdf, "bar")).len(), 1);
    }

    #[test]
    fn annotations_append_to_existing_ones() {
        let pdf = pdf_with_lines(&["alpha"]);
        let once = annotate(&pdf, "alpha");
        let twice = annotate(&once, "alpha");
        assert_eq!(highlights(&twice).len(), 2);
    }

    #[test]
    fn glyph_boxes_follow_rendering_matrix() {
        let mut collector = GlyphCollector::default();
        let media = MediaBox {
            llx: 0.0,
            lly: 0.0,
            urx: 612.0,
            ury: 792.0,
        };
        collector.begin_page(1, &media, None).unwrap();
        let trm = Transform::row_major(2.0, 0.0, 0.0, 2.0, 10.0, 20.0);
        collector.output_character(&trm, 0.5, 0.0, 10.0, "fi").unwrap();
        collector.end_page().unwrap();

        let lines = &collector.pages[&1];
        assert_eq!(lines.len(), 1);
        let glyphs = &lines[0].glyphs;
        assert_eq!(glyphs.iter().map(|g| g.ch).collect::<String>(), "fi");
        // Advance 0.5 em * 10pt = 5 text units, split over the ligature and
        // doubled by the matrix.
        assert_eq!(glyphs[0].origin, Point { x: 10.0, y: 20.0 });
        assert_eq!(glyphs[1].origin, Point { x: 15.0, y: 20.0 });
        assert_eq!(glyphs[1].end, Point { x: 20.0, y: 20.0 });
        let quad = glyphs[0].quad.unwrap();
        assert!((quad.upper_left.y - (20.0 + 2.0 * ASCENT * 10.0)).abs() < 1e-4);
        assert!((quad.lower_left.y - (20.0 - 2.0 * DESCENT * 10.0)).abs() < 1e-4);
    }
}
