//! Text extraction: turn a prospectus PDF into page-level strings.
//!
//! ## Why a trait?
//!
//! The rest of the pipeline only needs "give me the pages of this file".
//! [`PageSource`] states exactly that, so the orchestration and its tests run
//! against in-memory pages while the binary plugs in [`PdfiumSource`].
//!
//! ## Why lazy pages?
//!
//! A prospectus runs to several hundred pages. The iterator extracts one
//! page per `next()` and the caller reports progress between pages; nothing
//! forces the whole document into memory before the first page is seen.

use crate::error::{ExtractionError, VcExtractError};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Something that can open a file and yield its pages' text in order.
pub trait PageSource {
    /// Finite, non-restartable page iterator borrowed from the source.
    type Pages<'a>: ExactSizeIterator<Item = Result<String, ExtractionError>>
    where
        Self: 'a;

    /// Open `path`. Errors here mean the whole file is unusable.
    fn open<'a>(&'a self, path: &Path) -> Result<Self::Pages<'a>, ExtractionError>;
}

/// Page source backed by a bound pdfium library.
pub struct PdfiumSource {
    pdfium: Pdfium,
}

impl PdfiumSource {
    /// Bind pdfium once for the whole run.
    ///
    /// Search order: `library_path` (a library file or the directory holding
    /// it, usually from `PDFIUM_LIB_PATH`), the working directory, then the
    /// system library.
    pub fn bind(library_path: Option<&Path>) -> Result<Self, VcExtractError> {
        let mut attempts = Vec::new();

        if let Some(p) = library_path {
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(p)
            } else {
                p.to_path_buf()
            };
            match Pdfium::bind_to_library(&lib) {
                Ok(bindings) => return Ok(Self::with_bindings(bindings, &lib.display().to_string())),
                Err(e) => attempts.push(format!("{}: {:?}", lib.display(), e)),
            }
        }

        let local = Pdfium::pdfium_platform_library_name_at_path("./");
        match Pdfium::bind_to_library(&local) {
            Ok(bindings) => return Ok(Self::with_bindings(bindings, &local.display().to_string())),
            Err(e) => attempts.push(format!("{}: {:?}", local.display(), e)),
        }

        match Pdfium::bind_to_system_library() {
            Ok(bindings) => Ok(Self::with_bindings(bindings, "system library")),
            Err(e) => {
                attempts.push(format!("system library: {:?}", e));
                Err(VcExtractError::PdfiumBindingFailed(attempts.join("; ")))
            }
        }
    }

    fn with_bindings(bindings: Box<dyn PdfiumLibraryBindings>, origin: &str) -> Self {
        info!("Bound pdfium from {}", origin);
        Self {
            pdfium: Pdfium::new(bindings),
        }
    }
}

impl PageSource for PdfiumSource {
    type Pages<'a> = PdfiumPages<'a>;

    fn open<'a>(&'a self, path: &Path) -> Result<PdfiumPages<'a>, ExtractionError> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| map_load_error(path, &e))?;
        let total = document.pages().len();
        debug!("Opened {} ({} pages)", path.display(), total);
        Ok(PdfiumPages {
            document,
            next: 0,
            total,
        })
    }
}

/// pdfium reports a missing password as a load error; tell it apart by name.
fn map_load_error(path: &Path, e: &PdfiumError) -> ExtractionError {
    let detail = format!("{:?}", e);
    if detail.contains("Password") || detail.contains("password") {
        ExtractionError::Encrypted {
            path: path.to_path_buf(),
        }
    } else {
        ExtractionError::Corrupt {
            path: path.to_path_buf(),
            detail,
        }
    }
}

/// Lazily extracted pages of one open document.
pub struct PdfiumPages<'a> {
    document: PdfDocument<'a>,
    next: PdfPageIndex,
    total: PdfPageIndex,
}

impl Iterator for PdfiumPages<'_> {
    type Item = Result<String, ExtractionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;
        let page_text_err = |e: PdfiumError| ExtractionError::PageText {
            page: index as usize + 1,
            detail: format!("{:?}", e),
        };
        let text = self
            .document
            .pages()
            .get(index)
            .and_then(|page| page_text(&page))
            .map_err(page_text_err);
        Some(text)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for PdfiumPages<'_> {}

fn page_text(page: &PdfPage) -> Result<String, PdfiumError> {
    Ok(page.text()?.all())
}

/// Whether extracted pages carry any text at all.
///
/// Scanned prospectuses without an OCR layer come back as whitespace and
/// form feeds only.
pub fn has_text(pages: &[String]) -> bool {
    pages.iter().any(|p| p.chars().any(|c| !c.is_whitespace()))
}
