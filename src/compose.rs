//! Document composition: turns processed posts into one ordered batch of edits.
//!
//! All offsets come from a single snapshot of the document end offset. The
//! cursor starts one before the end marker and advances by the length of each
//! insertion, measured in UTF-16 code units (the Docs index unit). An inline
//! image counts as one unit.
//!
//! Per post:
//!
//! ```text
//! heading\n\n          (styled HEADING_1 over the heading span)
//! insight\n ... \n     (when insights are present)
//! body\n\n
//! [image]\n ...        (one per hosted image)
//! failed-url\n ...     (one per image that could not be hosted)
//! \n\n                 (spacer)
//! ```

use crate::error::ComposeError;
use crate::models::PostRecord;
use crate::utils::utf16_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Heading1,
}

impl ParagraphStyle {
    pub fn named_style_type(self) -> &'static str {
        match self {
            ParagraphStyle::Heading1 => "HEADING_1",
        }
    }
}

/// Display size of an inline image, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSize {
    pub width_pt: f64,
    pub height_pt: f64,
}

impl ImageSize {
    pub fn square(pt: f64) -> Self {
        Self {
            width_pt: pt,
            height_pt: pt,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    InsertText {
        at: usize,
        text: String,
    },
    StyleRange {
        start: usize,
        end: usize,
        style: ParagraphStyle,
    },
    InsertImage {
        at: usize,
        uri: String,
        size: ImageSize,
    },
}

impl EditOp {
    /// Offset the operation applies at.
    pub fn at(&self) -> usize {
        match self {
            EditOp::InsertText { at, .. } | EditOp::InsertImage { at, .. } => *at,
            EditOp::StyleRange { start, .. } => *start,
        }
    }

    /// Units this operation adds to the document.
    pub fn inserted_len(&self) -> usize {
        match self {
            EditOp::InsertText { text, .. } => utf16_len(text),
            EditOp::InsertImage { .. } => 1,
            EditOp::StyleRange { .. } => 0,
        }
    }
}

/// A composed batch plus the cursor bookkeeping that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub ops: Vec<EditOp>,
    /// Cursor before the first insertion.
    pub start: usize,
    /// Cursor after the last insertion.
    pub end_cursor: usize,
}

impl Composition {
    pub fn inserted_len(&self) -> usize {
        self.end_cursor - self.start
    }
}

struct Cursor {
    at: usize,
    ops: Vec<EditOp>,
}

impl Cursor {
    fn insert_text(&mut self, text: String) {
        let len = utf16_len(&text);
        self.ops.push(EditOp::InsertText { at: self.at, text });
        self.at += len;
    }

    fn insert_image(&mut self, uri: &str, size: ImageSize) {
        self.ops.push(EditOp::InsertImage {
            at: self.at,
            uri: uri.to_string(),
            size,
        });
        self.at += 1;
    }

    fn style(&mut self, start: usize, end: usize, style: ParagraphStyle) {
        self.ops.push(EditOp::StyleRange { start, end, style });
    }
}

/// Build the edit batch for `posts`, appending at `current_end_offset - 1`.
///
/// # Arguments
///
/// * `current_end_offset` - Document end index from a single snapshot
/// * `posts` - Posts in output order
/// * `image_size` - Display size for every inline image
///
/// # Returns
///
/// The ordered [`EditOp`]s with non-decreasing offsets, or
/// [`ComposeError::InvalidEndOffset`] when the offset is below 1.
pub fn compose(
    current_end_offset: usize,
    posts: &[PostRecord],
    image_size: ImageSize,
) -> Result<Composition, ComposeError> {
    if current_end_offset < 1 {
        return Err(ComposeError::InvalidEndOffset(current_end_offset));
    }
    let start = current_end_offset - 1;
    let mut cursor = Cursor {
        at: start,
        ops: Vec::new(),
    };

    for post in posts {
        let heading_start = cursor.at;
        let heading_end = heading_start + utf16_len(&post.heading);
        cursor.insert_text(format!("{}\n\n", post.heading));
        cursor.style(heading_start, heading_end, ParagraphStyle::Heading1);

        // An empty or all-blank list is treated as absent: no separator.
        let insight_lines: Vec<&String> = post
            .insights
            .iter()
            .flatten()
            .filter(|l| !l.trim().is_empty())
            .collect();
        if !insight_lines.is_empty() {
            for line in insight_lines {
                cursor.insert_text(format!("{line}\n"));
            }
            cursor.insert_text("\n".to_string());
        }

        cursor.insert_text(format!("{}\n\n", post.body));

        for uri in &post.images {
            cursor.insert_image(uri, image_size);
            cursor.insert_text("\n".to_string());
        }

        for link in &post.failed_links {
            cursor.insert_text(format!("{link}\n"));
        }

        cursor.insert_text("\n\n".to_string());
    }

    Ok(Composition {
        ops: cursor.ops,
        start,
        end_cursor: cursor.at,
    })
}
