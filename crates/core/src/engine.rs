//! Interactive render engine: owns the document state, offloads layout to
//! a background worker, and renders preview pages on demand.
//!
//! Layout requests are debounced with a quiet window so keystroke bursts
//! coalesce into one computation. Each request carries a generation number;
//! a completed layout is applied only if its generation still matches the
//! engine's current one, so stale results never overwrite fresher state.

use crate::compositor::{image_line_slots, PageCompositor};
use crate::config::{PaperGeometry, RenderSettings};
use crate::error::Result;
use crate::font::FontStore;
use crate::layout::build_lines_from_tokens;
use crate::paginate::{paginate, PageRecord};
use crate::token::{tokenize, StyleMap};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::thread::JoinHandle;
use std::time::Duration;
use tiny_skia::Pixmap;
use tracing::{debug, trace};

/// Quiet window for coalescing layout requests.
const DEBOUNCE: Duration = Duration::from_millis(50);

/// Cached layouts retained for quick settings toggling.
const LAYOUT_CACHE_SIZE: usize = 16;

/// Cache key covering everything layout depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LayoutKey {
    text_hash: u64,
    chars_per_line: usize,
    lines_per_page: usize,
    first_page_lines: Option<usize>,
}

impl LayoutKey {
    fn new(markup: &str, geometry: &PaperGeometry, settings: &RenderSettings) -> Self {
        let mut hasher = DefaultHasher::new();
        markup.hash(&mut hasher);
        Self {
            text_hash: hasher.finish(),
            chars_per_line: settings.chars_per_line(geometry),
            lines_per_page: geometry.lines_per_page(),
            first_page_lines: settings.first_page_lines,
        }
    }
}

struct LayoutRequest {
    generation: u64,
    markup: String,
    geometry: PaperGeometry,
    settings: RenderSettings,
}

struct LayoutDone {
    generation: u64,
    pages: Vec<PageRecord>,
    style_map: StyleMap,
}

enum WorkerMsg {
    Layout(Box<LayoutRequest>),
    Shutdown,
}

fn compute_layout(req: &LayoutRequest) -> (Vec<PageRecord>, StyleMap) {
    let tokens = tokenize(&req.markup);
    let style_map = StyleMap::from_tokens(&tokens);
    let lines = build_lines_from_tokens(
        &tokens,
        req.settings.chars_per_line(&req.geometry),
        |src| image_line_slots(src, &req.geometry),
    );
    let pages = paginate(
        &lines,
        req.geometry.lines_per_page(),
        req.settings.first_page_lines,
    );
    (pages, style_map)
}

fn worker_loop(rx: Receiver<WorkerMsg>, tx: Sender<LayoutDone>) {
    loop {
        let mut msg = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => return,
        };

        // Coalesce: keep swallowing newer requests until the channel goes
        // quiet for the debounce window.
        loop {
            if matches!(msg, WorkerMsg::Shutdown) {
                return;
            }
            match rx.recv_timeout(DEBOUNCE) {
                Ok(newer) => msg = newer,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let WorkerMsg::Layout(req) = msg else { return };
        trace!("Layout worker computing generation {}", req.generation);
        let (pages, style_map) = compute_layout(&req);
        let done = LayoutDone {
            generation: req.generation,
            pages,
            style_map,
        };
        if tx.send(done).is_err() {
            return;
        }
    }
}

/// The interactive engine behind a live preview surface.
pub struct RenderEngine {
    font: FontStore,
    settings: RenderSettings,
    markup: String,

    pages: Vec<PageRecord>,
    style_map: StyleMap,

    generation: u64,
    worker_tx: Sender<WorkerMsg>,
    result_rx: Receiver<LayoutDone>,
    worker: Option<JoinHandle<()>>,

    cache: LruCache<LayoutKey, (Vec<PageRecord>, StyleMap)>,
    page_count_listener: Option<Box<dyn Fn(usize) + Send>>,
    last_notified_count: usize,
}

impl RenderEngine {
    pub fn new(font: FontStore, settings: RenderSettings) -> Result<Self> {
        settings.validate()?;
        let (worker_tx, worker_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let worker = std::thread::Builder::new()
            .name("handscript-layout".to_string())
            .spawn(move || worker_loop(worker_rx, result_tx))
            .map_err(|e| crate::error::RenderError::ChannelError(e.to_string()))?;

        let mut engine = Self {
            font,
            settings,
            markup: String::new(),
            pages: Vec::new(),
            style_map: StyleMap::from_tokens(&[]),
            generation: 0,
            worker_tx,
            result_rx,
            worker: Some(worker),
            cache: LruCache::new(
                NonZeroUsize::new(LAYOUT_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            ),
            page_count_listener: None,
            last_notified_count: 0,
        };
        engine.layout_now();
        Ok(engine)
    }

    /// Register a listener fired whenever recomputed pagination changes the
    /// total page count.
    pub fn on_page_count_change(&mut self, listener: impl Fn(usize) + Send + 'static) {
        self.page_count_listener = Some(Box::new(listener));
    }

    /// Replace the document text and schedule a debounced background
    /// layout. Call [`poll`](Self::poll) to pick up the result.
    pub fn set_text(&mut self, markup: impl Into<String>) -> Result<()> {
        self.markup = markup.into();
        self.schedule_layout()
    }

    /// Replace the settings snapshot and schedule a background layout.
    pub fn update_settings(&mut self, settings: RenderSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        self.schedule_layout()
    }

    /// Reshuffle jitter without changing layout. Cheap: pagination is
    /// unaffected, so no layout pass is scheduled.
    pub fn regenerate(&mut self) {
        self.settings.regenerate += 1;
    }

    fn schedule_layout(&mut self) -> Result<()> {
        self.generation += 1;
        let req = LayoutRequest {
            generation: self.generation,
            markup: self.markup.clone(),
            geometry: self.preview_geometry(),
            settings: self.settings.clone(),
        };
        self.worker_tx.send(WorkerMsg::Layout(Box::new(req)))?;
        Ok(())
    }

    /// Apply any finished background layouts. Results from superseded
    /// generations are discarded. Returns true if the layout changed.
    pub fn poll(&mut self) -> bool {
        let mut applied = false;
        while let Ok(done) = self.result_rx.try_recv() {
            if done.generation != self.generation {
                debug!(
                    "Discarding stale layout generation {} (current {})",
                    done.generation, self.generation
                );
                continue;
            }
            self.store_layout(done.pages, done.style_map);
            applied = true;
        }
        applied
    }

    /// Synchronous layout: compute (or fetch from cache) immediately on the
    /// calling thread, bypassing the debounce.
    pub fn layout_now(&mut self) {
        self.generation += 1;
        let geometry = self.preview_geometry();
        let key = LayoutKey::new(&self.markup, &geometry, &self.settings);
        if let Some((pages, style_map)) = self.cache.get(&key) {
            let (pages, style_map) = (pages.clone(), style_map.clone());
            self.store_layout(pages, style_map);
            return;
        }
        let req = LayoutRequest {
            generation: self.generation,
            markup: self.markup.clone(),
            geometry,
            settings: self.settings.clone(),
        };
        let (pages, style_map) = compute_layout(&req);
        self.cache.put(key, (pages.clone(), style_map.clone()));
        self.store_layout(pages, style_map);
    }

    fn store_layout(&mut self, pages: Vec<PageRecord>, style_map: StyleMap) {
        self.pages = pages;
        self.style_map = style_map;
        let count = self.pages.len();
        if count != self.last_notified_count {
            self.last_notified_count = count;
            if let Some(listener) = &self.page_count_listener {
                listener(count);
            }
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn text(&self) -> &str {
        &self.markup
    }

    fn preview_geometry(&self) -> PaperGeometry {
        PaperGeometry::preview(&self.settings)
    }

    /// Render one page of the current layout at preview resolution.
    pub fn render_page(&self, index: usize) -> Result<Pixmap> {
        let page = self
            .pages
            .get(index)
            .ok_or(crate::error::RenderError::PageOutOfRange {
                page: index,
                total: self.pages.len(),
            })?;
        let compositor = PageCompositor::new(
            &self.settings,
            self.preview_geometry(),
            &self.font,
            Some(&self.style_map),
            false,
        );
        compositor.render_page(page)
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        let _ = self.worker_tx.send(WorkerMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
