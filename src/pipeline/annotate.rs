//! Markup writing: burn highlight and comment annotations into the PDF.
//!
//! The writer operates on the original document bytes with lopdf, leaving
//! page content streams untouched — annotations are added as standard
//! `/Annots` dictionary entries (a `Highlight` for the ink, a `FreeText` for
//! the comment overlay), so the output stays structurally identical to the
//! input apart from re-serialisation.
//!
//! ## Coordinate spaces
//!
//! Scraped rectangles are in page points with a top-left origin (the model
//! reads the raster top-down). PDF user space puts the origin at the
//! bottom-left, so rectangles are flipped against the page MediaBox height
//! at write time. The MediaBox may be inherited from an ancestor `Pages`
//! node; the lookup walks the parent chain.
//!
//! Drawing the same candidate twice doubles the visible ink but never
//! corrupts document structure, and a failed candidate leaves previously
//! applied ones in place — there is no rollback.

use crate::config::BoundsPolicy;
use crate::error::MarkupError;
use crate::pipeline::scrape::AnnotationCandidate;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::path::Path;
use tracing::{debug, warn};

/// Font size for overlaid comment text, in points.
const COMMENT_FONT_SIZE: f32 = 8.0;
/// Comment text colour (RGB, 0–1): blue.
const COMMENT_COLOR: (f32, f32, f32) = (0.0, 0.0, 1.0);
/// Highlight colour (RGB, 0–1): yellow.
const HIGHLIGHT_COLOR: (f32, f32, f32) = (1.0, 1.0, 0.0);
/// Highlight opacity.
const HIGHLIGHT_OPACITY: f32 = 0.4;

/// Fallback page size (US Letter, points) when no MediaBox is resolvable.
const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Writes annotations into a loaded PDF document.
///
/// One writer owns the document for the whole run; candidates are applied
/// page by page and the document is serialised exactly once by [`save`].
///
/// [`save`]: MarkupWriter::save
pub struct MarkupWriter {
    doc: Document,
    /// Page object ids in document order (index 0 = page 1).
    page_ids: Vec<ObjectId>,
}

impl MarkupWriter {
    /// Load a document from a file path.
    pub fn open(path: &Path) -> Result<Self, MarkupError> {
        let doc = Document::load(path).map_err(|e| MarkupError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Ok(Self::from_document(doc))
    }

    /// Load a document from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MarkupError> {
        let doc = Document::load_mem(bytes).map_err(|e| MarkupError::AnnotationFailed {
            detail: format!("could not parse PDF: {}", e),
        })?;
        Ok(Self::from_document(doc))
    }

    fn from_document(doc: Document) -> Self {
        // get_pages() keys are 1-based page numbers; BTreeMap iteration
        // yields them in document order.
        let page_ids = doc.get_pages().into_values().collect();
        Self { doc, page_ids }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Draw one candidate onto a page (0-indexed).
    ///
    /// Returns `Ok(true)` when the annotation pair was drawn, `Ok(false)`
    /// when the clamp policy dropped an entirely off-page rectangle.
    pub fn apply(
        &mut self,
        page_index: usize,
        candidate: &AnnotationCandidate,
        policy: BoundsPolicy,
    ) -> Result<bool, MarkupError> {
        let page_id = *self
            .page_ids
            .get(page_index)
            .ok_or(MarkupError::PageOutOfRange {
                page: page_index + 1,
                total: self.page_ids.len(),
            })?;

        let (width, height) = self.page_size(page_id);

        let rect = match policy {
            BoundsPolicy::PassThrough => candidate.rect,
            BoundsPolicy::Clamp => match candidate.rect.clamped_to(width, height) {
                Some(r) => r,
                None => {
                    warn!(
                        "Page {}: dropping annotation entirely outside the page: {:?}",
                        page_index + 1,
                        candidate.rect
                    );
                    return Ok(false);
                }
            },
        };

        // Flip from top-left model space into bottom-left PDF user space.
        let llx = rect.x0 as f32;
        let lly = (height - rect.y1) as f32;
        let urx = rect.x1 as f32;
        let ury = (height - rect.y0) as f32;

        let highlight_id = self.build_highlight(llx, lly, urx, ury);
        self.attach_to_page(page_id, highlight_id)?;

        let comment_id = self.build_comment(llx, lly, urx, ury, &candidate.comment);
        self.attach_to_page(page_id, comment_id)?;

        debug!(
            "Page {}: highlight at ({:.1}, {:.1})–({:.1}, {:.1}): {}",
            page_index + 1,
            llx,
            lly,
            urx,
            ury,
            candidate.comment
        );

        Ok(true)
    }

    /// Serialise the annotated document to bytes. Consumes the writer; the
    /// document is written exactly once per run.
    pub fn save(mut self) -> Result<Vec<u8>, MarkupError> {
        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| MarkupError::AnnotationFailed {
                detail: format!("could not serialise PDF: {}", e),
            })?;
        Ok(out)
    }

    /// Build a Highlight annotation dictionary and register it.
    fn build_highlight(&mut self, llx: f32, lly: f32, urx: f32, ury: f32) -> ObjectId {
        let (r, g, b) = HIGHLIGHT_COLOR;
        let mut annot = Dictionary::new();
        annot.set("Type", Object::Name(b"Annot".to_vec()));
        annot.set("Subtype", Object::Name(b"Highlight".to_vec()));
        annot.set(
            "Rect",
            Object::Array(vec![
                Object::Real(llx),
                Object::Real(lly),
                Object::Real(urx),
                Object::Real(ury),
            ]),
        );
        // QuadPoints: upper-left, upper-right, lower-left, lower-right
        annot.set(
            "QuadPoints",
            Object::Array(vec![
                Object::Real(llx),
                Object::Real(ury),
                Object::Real(urx),
                Object::Real(ury),
                Object::Real(llx),
                Object::Real(lly),
                Object::Real(urx),
                Object::Real(lly),
            ]),
        );
        annot.set("CA", Object::Real(HIGHLIGHT_OPACITY));
        annot.set(
            "C",
            Object::Array(vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
        );
        self.doc.add_object(Object::Dictionary(annot))
    }

    /// Build a FreeText annotation carrying the comment, and register it.
    fn build_comment(&mut self, llx: f32, lly: f32, urx: f32, ury: f32, text: &str) -> ObjectId {
        let (r, g, b) = COMMENT_COLOR;
        let mut annot = Dictionary::new();
        annot.set("Type", Object::Name(b"Annot".to_vec()));
        annot.set("Subtype", Object::Name(b"FreeText".to_vec()));
        annot.set(
            "Rect",
            Object::Array(vec![
                Object::Real(llx),
                Object::Real(lly),
                Object::Real(urx),
                Object::Real(ury),
            ]),
        );
        annot.set(
            "Contents",
            Object::String(text.as_bytes().to_vec(), StringFormat::Literal),
        );
        let da = format!("/Helv {} Tf {} {} {} rg", COMMENT_FONT_SIZE, r, g, b);
        annot.set("DA", Object::String(da.into_bytes(), StringFormat::Literal));
        // No border around the text box
        let mut bs = Dictionary::new();
        bs.set("W", Object::Integer(0));
        annot.set("BS", Object::Dictionary(bs));
        self.doc.add_object(Object::Dictionary(annot))
    }

    /// Append an annotation reference to the page's `/Annots` array.
    ///
    /// `/Annots` may hold the array directly or reference a separate array
    /// object; existing annotations are preserved either way.
    fn attach_to_page(&mut self, page_id: ObjectId, annot_id: ObjectId) -> Result<(), MarkupError> {
        // Follow an indirect /Annots first, so the page borrow is released
        // before the referenced array is mutated.
        let indirect = self
            .doc
            .get_dictionary(page_id)
            .ok()
            .and_then(|dict| match dict.get(b"Annots") {
                Ok(Object::Reference(id)) => Some(*id),
                _ => None,
            });

        if let Some(array_id) = indirect {
            if let Ok(Object::Array(ref mut arr)) = self.doc.get_object_mut(array_id) {
                arr.push(Object::Reference(annot_id));
                return Ok(());
            }
        }

        let page = self
            .doc
            .get_object_mut(page_id)
            .map_err(|e| MarkupError::AnnotationFailed {
                detail: e.to_string(),
            })?;

        if let Object::Dictionary(ref mut page_dict) = page {
            if let Ok(Object::Array(ref mut arr)) = page_dict.get_mut(b"Annots") {
                arr.push(Object::Reference(annot_id));
            } else {
                page_dict.set("Annots", Object::Array(vec![Object::Reference(annot_id)]));
            }
        }
        Ok(())
    }

    /// Resolve the page's MediaBox size, walking inherited attributes.
    fn page_size(&self, page_id: ObjectId) -> (f64, f64) {
        let mut id = page_id;
        // Bounded walk; a well-formed page tree is a few levels deep.
        for _ in 0..16 {
            let Ok(dict) = self.doc.get_dictionary(id) else {
                break;
            };
            if let Ok(obj) = dict.get(b"MediaBox") {
                if let Some(size) = media_box_size(&self.doc, obj) {
                    return size;
                }
            }
            match dict.get(b"Parent") {
                Ok(Object::Reference(parent)) => id = *parent,
                _ => break,
            }
        }
        warn!("No MediaBox found for page {:?}; assuming US Letter", page_id);
        DEFAULT_PAGE_SIZE
    }
}

/// Interpret a MediaBox array `[llx lly urx ury]` as (width, height).
fn media_box_size(doc: &Document, obj: &Object) -> Option<(f64, f64)> {
    let obj = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let arr = match obj {
        Object::Array(arr) if arr.len() == 4 => arr,
        _ => return None,
    };
    let mut vals = [0f64; 4];
    for (slot, item) in vals.iter_mut().zip(arr.iter()) {
        *slot = number_value(doc, item)?;
    }
    let width = vals[2] - vals[0];
    let height = vals[3] - vals[1];
    if width > 0.0 && height > 0.0 {
        Some((width, height))
    } else {
        None
    }
}

fn number_value(doc: &Document, obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        Object::Reference(id) => number_value(doc, doc.get_object(*id).ok()?),
        _ => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::scrape::Rect;
    use lopdf::dictionary;

    /// Build a minimal single-page PDF in memory.
    fn minimal_pdf(width: i64, height: i64) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        });
        if let Ok(page) = doc.get_object_mut(page_id) {
            if let Ok(dict) = page.as_dict_mut() {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn candidate(x0: f64, y0: f64, x1: f64, y1: f64, comment: &str) -> AnnotationCandidate {
        AnnotationCandidate {
            rect: Rect::new(x0, y0, x1, y1).unwrap(),
            comment: comment.to_string(),
        }
    }

    /// Count annotation references on every page of a serialised document.
    fn annots_per_page(bytes: &[u8]) -> Vec<usize> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&page_id| {
                doc.get_dictionary(page_id)
                    .ok()
                    .and_then(|d| d.get(b"Annots").ok())
                    .and_then(|o| o.as_array().ok())
                    .map(|a| a.len())
                    .unwrap_or(0)
            })
            .collect()
    }

    #[test]
    fn one_candidate_yields_highlight_plus_comment() {
        let pdf = minimal_pdf(612, 792);
        let mut writer = MarkupWriter::from_bytes(&pdf).unwrap();
        let drawn = writer
            .apply(0, &candidate(10.0, 10.0, 100.0, 50.0, "missing value"), BoundsPolicy::PassThrough)
            .unwrap();
        assert!(drawn);

        let out = writer.save().unwrap();
        assert!(out.starts_with(b"%PDF-"));
        assert_eq!(annots_per_page(&out), vec![2]);
    }

    #[test]
    fn rectangle_is_flipped_into_pdf_space() {
        let pdf = minimal_pdf(612, 792);
        let mut writer = MarkupWriter::from_bytes(&pdf).unwrap();
        writer
            .apply(0, &candidate(10.0, 10.0, 100.0, 50.0, "x"), BoundsPolicy::PassThrough)
            .unwrap();
        let out = writer.save().unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let annots = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Annots")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        let first = match &annots[0] {
            Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
            _ => panic!("expected reference"),
        };
        let rect: Vec<f64> = first
            .get(b"Rect")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| match o {
                Object::Real(r) => *r as f64,
                Object::Integer(i) => *i as f64,
                _ => panic!("non-numeric rect entry"),
            })
            .collect();
        // Top-left (10,10)-(100,50) on a 792pt page → PDF (10, 742, 100, 782)
        assert_eq!(rect, vec![10.0, 742.0, 100.0, 782.0]);
    }

    #[test]
    fn zero_candidates_leaves_annotation_set_empty() {
        let pdf = minimal_pdf(612, 792);
        let writer = MarkupWriter::from_bytes(&pdf).unwrap();
        let out = writer.save().unwrap();
        assert_eq!(annots_per_page(&out), vec![0]);

        let doc = Document::load_mem(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn off_page_rect_passes_through_by_default() {
        let pdf = minimal_pdf(612, 792);
        let mut writer = MarkupWriter::from_bytes(&pdf).unwrap();
        let drawn = writer
            .apply(0, &candidate(700.0, 10.0, 900.0, 50.0, "off page"), BoundsPolicy::PassThrough)
            .unwrap();
        assert!(drawn);
        assert_eq!(annots_per_page(&writer.save().unwrap()), vec![2]);
    }

    #[test]
    fn clamp_policy_drops_fully_off_page_rect() {
        let pdf = minimal_pdf(612, 792);
        let mut writer = MarkupWriter::from_bytes(&pdf).unwrap();
        let drawn = writer
            .apply(0, &candidate(700.0, 10.0, 900.0, 50.0, "off page"), BoundsPolicy::Clamp)
            .unwrap();
        assert!(!drawn);
        assert_eq!(annots_per_page(&writer.save().unwrap()), vec![0]);
    }

    #[test]
    fn clamp_policy_trims_partially_off_page_rect() {
        let pdf = minimal_pdf(612, 792);
        let mut writer = MarkupWriter::from_bytes(&pdf).unwrap();
        let drawn = writer
            .apply(0, &candidate(500.0, 10.0, 900.0, 50.0, "partially off"), BoundsPolicy::Clamp)
            .unwrap();
        assert!(drawn);
        assert_eq!(annots_per_page(&writer.save().unwrap()), vec![2]);
    }

    #[test]
    fn out_of_range_page_index_is_an_error() {
        let pdf = minimal_pdf(612, 792);
        let mut writer = MarkupWriter::from_bytes(&pdf).unwrap();
        let result = writer.apply(5, &candidate(1.0, 1.0, 2.0, 2.0, "x"), BoundsPolicy::PassThrough);
        assert!(matches!(result, Err(MarkupError::PageOutOfRange { page: 6, total: 1 })));
    }

    #[test]
    fn comment_text_and_style_survive_round_trip() {
        let pdf = minimal_pdf(612, 792);
        let mut writer = MarkupWriter::from_bytes(&pdf).unwrap();
        writer
            .apply(0, &candidate(10.0, 10.0, 100.0, 50.0, "check the total"), BoundsPolicy::PassThrough)
            .unwrap();
        let out = writer.save().unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let annots = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Annots")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(annots.len(), 2);

        let free_text = match &annots[1] {
            Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
            _ => panic!("expected reference"),
        };
        assert_eq!(
            free_text.get(b"Subtype").unwrap().as_name().unwrap(),
            &b"FreeText"[..]
        );
        let contents = free_text.get(b"Contents").unwrap().as_str().unwrap();
        assert_eq!(contents, &b"check the total"[..]);
        let da = free_text.get(b"DA").unwrap().as_str().unwrap();
        let da = String::from_utf8_lossy(da);
        assert!(da.contains("8 Tf"), "font size should be 8pt: {da}");
        assert!(da.contains("0 0 1 rg"), "text should be blue: {da}");
    }

    #[test]
    fn indirect_annots_array_is_appended_not_replaced() {
        // Some producers store /Annots as a reference to a separate array
        // object. Existing entries must survive.
        let mut doc = Document::load_mem(&minimal_pdf(612, 792)).unwrap();
        let existing = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Text",
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        });
        let array_id = doc.add_object(Object::Array(vec![Object::Reference(existing)]));
        let page_id = *doc.get_pages().values().next().unwrap();
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(page_id) {
            dict.set("Annots", Object::Reference(array_id));
        }
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let mut writer = MarkupWriter::from_bytes(&bytes).unwrap();
        writer
            .apply(0, &candidate(10.0, 10.0, 100.0, 50.0, "x"), BoundsPolicy::PassThrough)
            .unwrap();
        let out = writer.save().unwrap();

        let reloaded = Document::load_mem(&out).unwrap();
        let page_id = *reloaded.get_pages().values().next().unwrap();
        let annots = reloaded
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Annots")
            .unwrap();
        let arr = match annots {
            Object::Reference(id) => reloaded.get_object(*id).unwrap().as_array().unwrap(),
            Object::Array(arr) => arr,
            _ => panic!("unexpected /Annots shape"),
        };
        assert_eq!(arr.len(), 3, "one existing + highlight + comment");
    }

    #[test]
    fn drawing_twice_doubles_ink_without_corruption() {
        let pdf = minimal_pdf(612, 792);
        let mut writer = MarkupWriter::from_bytes(&pdf).unwrap();
        let c = candidate(10.0, 10.0, 100.0, 50.0, "dup");
        writer.apply(0, &c, BoundsPolicy::PassThrough).unwrap();
        writer.apply(0, &c, BoundsPolicy::PassThrough).unwrap();
        let out = writer.save().unwrap();
        assert_eq!(annots_per_page(&out), vec![4]);
        assert_eq!(Document::load_mem(&out).unwrap().get_pages().len(), 1);
    }
}
