//! Single-flight render and extraction pipeline for one reader.
//!
//! A request overwrites a one-slot mailbox and cancels the render in flight.
//! One worker thread drains the mailbox: render the bitmap, then (unless a
//! newer request arrived meanwhile) extract words natively, falling back to
//! OCR for pages without a text layer. Results are only applied while their
//! request is still the latest, so the page state never shows a superseded
//! page even when renders finish out of order.

use crate::cancellation::CancellationToken;
use crate::document::PdfDocument;
use crate::error::RenderError;
use crate::geometry::{ExtractionResult, WordBox, extract_native};
use crate::layout::{LayoutOptions, PageLayout, reconstruct_layout};
use crate::ocr::OcrExtractor;
use anyhow::{Result, anyhow, bail};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RenderRequest {
    /// 1-based.
    pub page_number: usize,
    pub scale: f32,
}

/// What the UI should currently show for the page.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    /// Request the words and bitmap belong to.
    pub request: Option<RenderRequest>,
    pub words: Vec<WordBox>,
    pub layout: PageLayout,
    pub is_ocr: bool,
    pub rendering: bool,
    pub ocr_running: bool,
    /// 0.0..=1.0 while OCR runs.
    pub ocr_progress: f32,
    pub error: Option<String>,
    pub bitmap: Option<Arc<RgbaImage>>,
    /// Bumped every time a result or error is applied.
    pub revision: u64,
}

impl PageState {
    pub fn text(&self) -> &str {
        &self.layout.text
    }
}

pub struct RenderCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    document: Arc<dyn PdfDocument>,
    ocr: Option<OcrExtractor>,
    layout: LayoutOptions,
    slots: Mutex<Slots>,
    idle: Condvar,
}

#[derive(Default)]
struct Slots {
    pending: Option<RenderRequest>,
    active: Option<ActiveRender>,
    busy: bool,
    closed: bool,
    page: PageState,
}

struct ActiveRender {
    request: RenderRequest,
    cancel: CancellationToken,
}

impl Slots {
    fn superseded(&self, cancel: &CancellationToken) -> bool {
        self.closed || self.pending.is_some() || cancel.is_cancelled()
    }
}

impl RenderCoordinator {
    pub fn new(
        document: Arc<dyn PdfDocument>,
        ocr: Option<OcrExtractor>,
        layout: LayoutOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                document,
                ocr,
                layout,
                slots: Mutex::new(Slots::default()),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn page_count(&self) -> usize {
        self.inner.document.page_count()
    }

    /// Ask for `page_number` at `scale`. The newest request always wins; an
    /// older queued request is dropped and the active render is cancelled.
    pub fn request_render(&self, page_number: usize, scale: f32) -> Result<()> {
        let page_count = self.page_count();
        if page_number == 0 || page_number > page_count {
            bail!("page {page_number} out of range (document has {page_count} pages)");
        }
        if !scale.is_finite() || scale <= 0.0 {
            bail!("invalid render scale {scale}");
        }
        let request = RenderRequest { page_number, scale };

        let mut slots = self.inner.lock_slots();
        if slots.closed {
            bail!("render coordinator has been shut down");
        }
        if let Some(dropped) = slots.pending.replace(request) {
            debug!(page = dropped.page_number, "Dropping queued render request");
        }
        if let Some(active) = &slots.active {
            debug!(
                page = active.request.page_number,
                "Cancelling render superseded by page {page_number}"
            );
            active.cancel.cancel();
        }
        slots.page.rendering = true;

        if !slots.busy {
            slots.busy = true;
            let inner = Arc::clone(&self.inner);
            let spawned = thread::Builder::new()
                .name("page-render".to_string())
                .spawn(move || inner.run());
            if let Err(err) = spawned {
                slots.busy = false;
                slots.pending = None;
                slots.page.rendering = false;
                return Err(anyhow!("failed to spawn render worker: {err}"));
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PageState {
        self.inner.lock_slots().page.clone()
    }

    pub fn bitmap(&self) -> Option<Arc<RgbaImage>> {
        self.inner.lock_slots().page.bitmap.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock_slots().busy
    }

    /// Block until the worker has drained every request. Returns `false` on
    /// timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let slots = self.inner.lock_slots();
        let (slots, _) = self
            .inner
            .idle
            .wait_timeout_while(slots, timeout, |slots| slots.busy)
            .unwrap_or_else(PoisonError::into_inner);
        !slots.busy
    }

    /// Cancel the active render and refuse further requests. Safe to call
    /// while a render is finishing on its own.
    pub fn shutdown(&self) {
        let mut slots = self.inner.lock_slots();
        if slots.closed {
            return;
        }
        slots.closed = true;
        slots.pending = None;
        if let Some(active) = &slots.active {
            active.cancel.cancel();
        }
        info!("Render coordinator shut down");
    }
}

impl Drop for RenderCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        debug!("Render worker started");
        loop {
            let (request, cancel) = {
                let mut slots = self.lock_slots();
                match slots.pending.take() {
                    Some(request) if !slots.closed => {
                        let cancel = CancellationToken::new();
                        slots.active = Some(ActiveRender {
                            request,
                            cancel: cancel.clone(),
                        });
                        (request, cancel)
                    }
                    _ => {
                        slots.busy = false;
                        slots.active = None;
                        slots.page.rendering = false;
                        slots.page.ocr_running = false;
                        self.idle.notify_all();
                        debug!("Render worker idle");
                        return;
                    }
                }
            };
            self.process(request, &cancel);
            self.lock_slots().active = None;
        }
    }

    fn process(&self, request: RenderRequest, cancel: &CancellationToken) {
        let page_number = request.page_number;
        let page = match self.document.page(page_number) {
            Ok(page) => page,
            Err(err) => {
                self.fail(request, cancel, format!("failed to load page {page_number}: {err:#}"));
                return;
            }
        };
        let viewport = page.viewport(request.scale);
        debug!(
            page = page_number,
            scale = request.scale,
            width = viewport.pixel_width(),
            height = viewport.pixel_height(),
            "Rendering page"
        );

        let bitmap = match page.render(&viewport, cancel) {
            Ok(bitmap) => Arc::new(bitmap),
            Err(RenderError::Cancelled) => {
                debug!(page = page_number, "Render cancelled");
                return;
            }
            Err(err) => {
                self.fail(request, cancel, err.to_string());
                return;
            }
        };

        if self.lock_slots().superseded(cancel) {
            debug!(page = page_number, "Newer request arrived; skipping extraction");
            return;
        }

        let mut result = extract_native(page.as_ref(), page_number, &viewport);
        if result.is_empty() {
            result = self.run_ocr(request, cancel, &bitmap);
        }
        let layout = reconstruct_layout(&result.words, &self.layout);
        self.apply(request, cancel, bitmap, result, layout);
    }

    fn run_ocr(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
        bitmap: &RgbaImage,
    ) -> ExtractionResult {
        let Some(ocr) = &self.ocr else {
            debug!(page = request.page_number, "No text layer and OCR is disabled");
            return ExtractionResult::empty(false);
        };
        {
            let mut slots = self.lock_slots();
            if slots.superseded(cancel) {
                return ExtractionResult::empty(true);
            }
            slots.page.ocr_running = true;
            slots.page.ocr_progress = 0.0;
        }
        let mut progress = |fraction: f32| {
            let mut slots = self.lock_slots();
            if !slots.superseded(cancel) {
                slots.page.ocr_progress = fraction;
            }
        };
        ocr.extract_via_ocr(bitmap, request.page_number, &mut progress)
    }

    fn apply(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
        bitmap: Arc<RgbaImage>,
        result: ExtractionResult,
        layout: PageLayout,
    ) {
        let mut slots = self.lock_slots();
        if slots.superseded(cancel) {
            debug!(
                page = request.page_number,
                "Discarding extraction for superseded request"
            );
            slots.page.ocr_running = false;
            return;
        }
        let page = &mut slots.page;
        page.request = Some(request);
        page.bitmap = Some(bitmap);
        page.is_ocr = result.is_ocr;
        page.words = result.words;
        page.layout = layout;
        page.error = None;
        page.ocr_running = false;
        if page.is_ocr {
            page.ocr_progress = 1.0;
        }
        page.rendering = false;
        page.revision += 1;
        info!(
            page = request.page_number,
            words = page.words.len(),
            ocr = page.is_ocr,
            "Page ready"
        );
    }

    fn fail(&self, request: RenderRequest, cancel: &CancellationToken, message: String) {
        let mut slots = self.lock_slots();
        if slots.superseded(cancel) {
            warn!(page = request.page_number, "Superseded render failed: {message}");
            return;
        }
        error!(page = request.page_number, "Render failed: {message}");
        let page = &mut slots.page;
        page.request = Some(request);
        page.words.clear();
        page.layout = PageLayout::default();
        page.is_ocr = false;
        page.bitmap = None;
        page.ocr_running = false;
        page.rendering = false;
        page.error = Some(message);
        page.revision += 1;
    }
}
