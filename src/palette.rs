//! Color assignment shared by every highlighting context.
//!
//! Query term `i` is always painted with palette entry `i mod 8`, whether it
//! ends up as an HTML `<mark>` in a text snippet, a `w:highlight` value in a
//! DOCX run, or the stroke color of a PDF highlight annotation. Each rendering
//! context has its own representation, but the semantic sequence is the same.

/// Number of distinct colors before the palette wraps around.
pub const PALETTE_SIZE: usize = 8;

/// Rendering context a color is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteKind {
    /// HTML markup in text snippets.
    Text,
    /// WordprocessingML run highlight.
    FlowDoc,
    /// PDF annotation color.
    FixedDoc,
}

/// Semantic palette entry, in assignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swatch {
    Yellow,
    Turquoise,
    Pink,
    Green,
    PaleGreen,
    LightBlue,
    LightPink,
    Violet,
}

const SWATCHES: [Swatch; PALETTE_SIZE] = [
    Swatch::Yellow,
    Swatch::Turquoise,
    Swatch::Pink,
    Swatch::Green,
    Swatch::PaleGreen,
    Swatch::LightBlue,
    Swatch::LightPink,
    Swatch::Violet,
];

impl Swatch {
    /// Palette entry for query term `index`.
    pub fn for_index(index: usize) -> Swatch {
        SWATCHES[index % PALETTE_SIZE]
    }

    /// CSS hex color used in text snippets.
    pub fn hex(self) -> &'static str {
        match self {
            Swatch::Yellow => "#FFFF00",
            Swatch::Turquoise => "#40E0D0",
            Swatch::Pink => "#FFC0CB",
            Swatch::Green => "#90EE90",
            Swatch::PaleGreen => "#98FB98",
            Swatch::LightBlue => "#ADD8E6",
            Swatch::LightPink => "#FFB6C1",
            Swatch::Violet => "#EE82EE",
        }
    }

    /// Value of the `w:val` attribute on a DOCX `w:highlight` element.
    ///
    /// WordprocessingML only allows a fixed set of highlight colors, so each
    /// swatch maps to its nearest named index.
    pub fn word_highlight(self) -> &'static str {
        match self {
            Swatch::Yellow => "yellow",
            Swatch::Turquoise => "cyan",
            Swatch::Pink => "magenta",
            Swatch::Green => "darkGreen",
            Swatch::PaleGreen => "green",
            Swatch::LightBlue => "blue",
            Swatch::LightPink => "red",
            Swatch::Violet => "darkMagenta",
        }
    }

    /// DeviceRGB components in `[0, 1]` for PDF annotations.
    pub fn rgb(self) -> [f32; 3] {
        match self {
            Swatch::Yellow => [1.0, 1.0, 0.0],
            Swatch::Turquoise => [0.0, 0.8, 0.8],
            Swatch::Pink => [1.0, 0.75, 0.8],
            Swatch::Green => [0.56, 0.93, 0.56],
            Swatch::PaleGreen => [0.6, 0.98, 0.6],
            Swatch::LightBlue => [0.68, 0.85, 0.9],
            Swatch::LightPink => [1.0, 0.71, 0.76],
            Swatch::Violet => [0.93, 0.51, 0.93],
        }
    }
}

/// A concrete color in the representation a [`PaletteKind`] expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Color {
    Hex(&'static str),
    WordHighlight(&'static str),
    Rgb([f32; 3]),
}

/// Color for query term `index` in the given rendering context.
pub fn color_for(index: usize, kind: PaletteKind) -> Color {
    let swatch = Swatch::for_index(index);
    match kind {
        PaletteKind::Text => Color::Hex(swatch.hex()),
        PaletteKind::FlowDoc => Color::WordHighlight(swatch.word_highlight()),
        PaletteKind::FixedDoc => Color::Rgb(swatch.rgb()),
    }
}
