use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

pub const DISPLAY_SURFACE_ID: &str = "spice-area";
pub const OVERLAY_SURFACE_ID: &str = "message-div";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Container the remote display renders into.
    Display,
    /// Status message overlay.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Created but not yet laid out into the visible tree.
    Pending,
    Ready,
    /// Removed or replaced.
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Faded,
    Hidden,
}

/// Handle to one element created through a [`SurfaceHost`].
///
/// The generation distinguishes a handle from a later element created under
/// the same id, so a stale handle never addresses its replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRef {
    id: String,
    kind: SurfaceKind,
    generation: u64,
}

impl SurfaceRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Where the console's elements live. Operations on handles that are no
/// longer live are no-ops.
pub trait SurfaceHost: Send + Sync {
    /// Creates an element, replacing any existing element with the same id.
    fn create(&self, id: &str, kind: SurfaceKind) -> SurfaceRef;
    fn remove(&self, surface: &SurfaceRef);
    fn readiness(&self, surface: &SurfaceRef) -> Readiness;
    fn set_text(&self, surface: &SurfaceRef, text: &str);
    fn set_visibility(&self, surface: &SurfaceRef, visibility: Visibility);
    fn focus(&self, surface: &SurfaceRef);
    /// Sizes the inner canvas of a display element to fit its container.
    fn fit_canvas(&self, surface: &SurfaceRef);
}

/// The display container and status overlay owned by one session.
/// Both are removed on [`SessionSurfaces::release`] or drop.
pub struct SessionSurfaces {
    host: Arc<dyn SurfaceHost>,
    display: SurfaceRef,
    overlay: SurfaceRef,
    released: bool,
}

impl SessionSurfaces {
    pub fn acquire(host: Arc<dyn SurfaceHost>) -> Self {
        let overlay = host.create(OVERLAY_SURFACE_ID, SurfaceKind::Overlay);
        let display = host.create(DISPLAY_SURFACE_ID, SurfaceKind::Display);
        Self {
            host,
            display,
            overlay,
            released: false,
        }
    }

    pub fn display(&self) -> &SurfaceRef {
        &self.display
    }

    pub fn overlay(&self) -> &SurfaceRef {
        &self.overlay
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.host.remove(&self.display);
        self.host.remove(&self.overlay);
    }
}

impl Drop for SessionSurfaces {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read-only view of one headless element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSnapshot {
    pub id: String,
    pub kind: SurfaceKind,
    pub generation: u64,
    pub laid_out: bool,
    pub text: String,
    pub visibility: Visibility,
    pub focused: bool,
    pub canvas_fitted: bool,
}

#[derive(Debug)]
struct Element {
    kind: SurfaceKind,
    generation: u64,
    laid_out: bool,
    text: String,
    visibility: Visibility,
    focused: bool,
    canvas_fitted: bool,
}

#[derive(Debug, Default)]
struct HeadlessState {
    elements: HashMap<String, Element>,
    next_generation: u64,
    removals: usize,
}

/// In-memory surface host for the command line front end and tests.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    state: Mutex<HeadlessState>,
    deferred_layout: bool,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// New elements stay [`Readiness::Pending`] until [`Self::complete_layout`].
    pub fn with_deferred_layout() -> Self {
        Self {
            state: Mutex::default(),
            deferred_layout: true,
        }
    }

    pub fn complete_layout(&self, id: &str) {
        if let Some(element) = self.state.lock().elements.get_mut(id) {
            element.laid_out = true;
        }
    }

    pub fn element(&self, id: &str) -> Option<ElementSnapshot> {
        self.state.lock().elements.get(id).map(|el| ElementSnapshot {
            id: id.to_owned(),
            kind: el.kind,
            generation: el.generation,
            laid_out: el.laid_out,
            text: el.text.clone(),
            visibility: el.visibility,
            focused: el.focused,
            canvas_fitted: el.canvas_fitted,
        })
    }

    pub fn element_count(&self) -> usize {
        self.state.lock().elements.len()
    }

    /// Number of elements actually removed (no-op removals are not counted).
    pub fn removals(&self) -> usize {
        self.state.lock().removals
    }

    fn with_live<R>(&self, surface: &SurfaceRef, f: impl FnOnce(&mut Element) -> R) -> Option<R> {
        let mut state = self.state.lock();
        match state.elements.get_mut(&surface.id) {
            Some(element) if element.generation == surface.generation => Some(f(element)),
            _ => None,
        }
    }
}

impl SurfaceHost for HeadlessHost {
    fn create(&self, id: &str, kind: SurfaceKind) -> SurfaceRef {
        let mut state = self.state.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        let replaced = state.elements.insert(
            id.to_owned(),
            Element {
                kind,
                generation,
                laid_out: !self.deferred_layout,
                text: String::new(),
                visibility: Visibility::Visible,
                focused: false,
                canvas_fitted: false,
            },
        );
        if replaced.is_some() {
            trace!(target: "vmdeck::surface", id, "replaced stale element");
        }
        SurfaceRef {
            id: id.to_owned(),
            kind,
            generation,
        }
    }

    fn remove(&self, surface: &SurfaceRef) {
        let mut state = self.state.lock();
        let live = state
            .elements
            .get(&surface.id)
            .is_some_and(|el| el.generation == surface.generation);
        if live {
            state.elements.remove(&surface.id);
            state.removals += 1;
        }
    }

    fn readiness(&self, surface: &SurfaceRef) -> Readiness {
        self.with_live(surface, |el| {
            if el.laid_out {
                Readiness::Ready
            } else {
                Readiness::Pending
            }
        })
        .unwrap_or(Readiness::Gone)
    }

    fn set_text(&self, surface: &SurfaceRef, text: &str) {
        self.with_live(surface, |el| el.text = text.to_owned());
    }

    fn set_visibility(&self, surface: &SurfaceRef, visibility: Visibility) {
        self.with_live(surface, |el| el.visibility = visibility);
    }

    fn focus(&self, surface: &SurfaceRef) {
        self.with_live(surface, |el| el.focused = true);
    }

    fn fit_canvas(&self, surface: &SurfaceRef) {
        self.with_live(surface, |el| {
            if el.kind == SurfaceKind::Display {
                el.canvas_fitted = true;
            }
        });
    }
}
