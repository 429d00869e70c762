use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::pattern_bgra;
use crate::capture::{CaptureSource, PixelLayout, Snapshot, Surface};
use crate::error::{PlatformError, Result};
use crate::geometry::Rect;
use crate::handle::WindowHandle;
use crate::window::{Placement, ShapeOp, ShapeQuery, WindowSystem, WindowTree};

/// Tint of the desktop surface pattern.
pub const DESKTOP_TINT: u8 = 0x80;

/// Description of a fake window.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub class: String,
    pub title: String,
    pub pid: u32,
    /// Outer rectangle relative to the parent.
    pub rect: Rect,
    /// Client area relative to the outer origin.
    pub client: Option<Rect>,
    pub visible: bool,
    pub owner: WindowHandle,
    pub input_shape: Option<Vec<Rect>>,
    pub tint: u8,
    pub alpha: bool,
}

impl WindowSpec {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            title: String::new(),
            pid: 0,
            rect: Rect::new(0, 0, 100, 100),
            client: None,
            visible: true,
            owner: WindowHandle::NULL,
            input_shape: None,
            tint: 0x40,
            alpha: false,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn rect(mut self, x: i32, y: i32, width: i32, height: i32) -> Self {
        self.rect = Rect::new(x, y, width, height);
        self
    }

    pub fn client(mut self, client: Rect) -> Self {
        self.client = Some(client);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn owned_by(mut self, owner: WindowHandle) -> Self {
        self.owner = owner;
        self
    }

    pub fn input_shape(mut self, rects: Vec<Rect>) -> Self {
        self.input_shape = Some(rects);
        self
    }

    pub fn tint(mut self, tint: u8) -> Self {
        self.tint = tint;
        self
    }

    pub fn with_alpha(mut self) -> Self {
        self.alpha = true;
        self
    }

    fn client_rect(&self) -> Rect {
        self.client
            .unwrap_or(Rect::new(0, 0, self.rect.width, self.rect.height))
    }
}

/// Recorded window mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Bounds(WindowHandle, Rect),
    Parent(WindowHandle, WindowHandle),
    Shape(WindowHandle, ShapeOp, Vec<Rect>),
    ClearShape(WindowHandle),
}

struct Node {
    parent: WindowHandle,
    spec: WindowSpec,
}

struct DesktopState {
    next: u64,
    nodes: HashMap<WindowHandle, Node>,
    children: HashMap<WindowHandle, Vec<WindowHandle>>,
    screen: Rect,
    work_area: Rect,
    active: WindowHandle,
    nested: bool,
    min_size: i32,
    snapshot_failure: Option<PlatformError>,
    mutations: Vec<Mutation>,
}

impl DesktopState {
    fn absolute_origin(&self, window: WindowHandle) -> Option<(i32, i32)> {
        let mut x = 0;
        let mut y = 0;
        let mut cur = window;
        while cur != FakeDesktop::ROOT {
            let node = self.nodes.get(&cur)?;
            x += node.spec.rect.x;
            y += node.spec.rect.y;
            cur = node.parent;
        }
        Some((x, y))
    }

    fn remove_subtree(&mut self, window: WindowHandle) {
        for child in self.children.remove(&window).unwrap_or_default() {
            self.remove_subtree(child);
        }
        self.nodes.remove(&window);
    }
}

#[derive(Default)]
struct CaptureCounters {
    taken: AtomicUsize,
    released: AtomicUsize,
}

/// In-memory window tree with pixel surfaces.
///
/// Handle `1` is the root and covers the screen. Nothing is drawn: snapshot pixels come from the
/// shared test pattern.
pub struct FakeDesktop {
    state: Mutex<DesktopState>,
    counters: Arc<CaptureCounters>,
}

impl FakeDesktop {
    pub const ROOT: WindowHandle = WindowHandle::from_raw(1);

    pub fn new(screen_width: i32, screen_height: i32) -> Self {
        let screen = Rect::new(0, 0, screen_width, screen_height);
        Self {
            state: Mutex::new(DesktopState {
                next: 0x100,
                nodes: HashMap::new(),
                children: HashMap::new(),
                screen,
                work_area: screen,
                active: WindowHandle::NULL,
                nested: false,
                min_size: 1,
                snapshot_failure: None,
                mutations: Vec::new(),
            }),
            counters: Arc::default(),
        }
    }

    /// Adds a window on top of its siblings.
    pub fn add(&self, parent: WindowHandle, spec: WindowSpec) -> WindowHandle {
        let mut state = self.state.lock();
        let handle = WindowHandle::from_raw(state.next);
        state.next += 1;
        state.nodes.insert(handle, Node { parent, spec });
        state.children.entry(parent).or_default().push(handle);
        handle
    }

    pub fn add_top_level(&self, spec: WindowSpec) -> WindowHandle {
        self.add(Self::ROOT, spec)
    }

    /// Removes a window and its descendants. The handle remains a plain value.
    pub fn destroy(&self, window: WindowHandle) {
        let mut state = self.state.lock();
        let parent = state.nodes.get(&window).map(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(siblings) = state.children.get_mut(&parent) {
                siblings.retain(|w| *w != window);
            }
        }
        state.remove_subtree(window);
    }

    pub fn set_work_area(&self, area: Rect) {
        self.state.lock().work_area = area;
    }

    pub fn set_active(&self, window: WindowHandle) {
        self.state.lock().active = window;
    }

    pub fn set_nested_clients(&self, nested: bool) {
        self.state.lock().nested = nested;
    }

    /// Smallest width or height `set_bounds` will apply.
    pub fn set_min_size(&self, min: i32) {
        self.state.lock().min_size = min;
    }

    /// Makes every following snapshot fail with `err`.
    pub fn fail_snapshots(&self, err: Option<PlatformError>) {
        self.state.lock().snapshot_failure = err;
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().mutations.clone()
    }

    pub fn snapshots_taken(&self) -> usize {
        self.counters.taken.load(Ordering::SeqCst)
    }

    pub fn snapshots_released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    fn surface_of(&self, surface: Surface) -> Result<(Rect, u8, bool)> {
        let state = self.state.lock();
        match surface {
            Surface::Desktop => Ok((state.screen, DESKTOP_TINT, false)),
            Surface::Window(window) => {
                let node = state
                    .nodes
                    .get(&window)
                    .ok_or_else(|| PlatformError::resource("window surface"))?;
                let client = node.spec.client_rect();
                Ok((
                    Rect::new(0, 0, client.width, client.height),
                    node.spec.tint,
                    node.spec.alpha,
                ))
            }
        }
    }
}

impl WindowSystem for FakeDesktop {
    fn bounds(&self, window: WindowHandle) -> Rect {
        let state = self.state.lock();
        if window.is_null() || window == Self::ROOT {
            return state.screen;
        }
        match (state.nodes.get(&window), state.absolute_origin(window)) {
            (Some(node), Some((x, y))) => Rect::new(x, y, node.spec.rect.width, node.spec.rect.height),
            _ => Rect::ZERO,
        }
    }

    fn client_bounds(&self, window: WindowHandle) -> Rect {
        let state = self.state.lock();
        if window.is_null() || window == Self::ROOT {
            return state.screen;
        }
        match (state.nodes.get(&window), state.absolute_origin(window)) {
            (Some(node), Some((x, y))) => node.spec.client_rect().translate(x, y),
            _ => Rect::ZERO,
        }
    }

    fn is_valid(&self, window: WindowHandle) -> bool {
        window == Self::ROOT || self.state.lock().nodes.contains_key(&window)
    }

    fn title(&self, window: WindowHandle) -> String {
        let state = self.state.lock();
        state
            .nodes
            .get(&window)
            .map(|n| n.spec.title.clone())
            .unwrap_or_default()
    }

    fn pid(&self, window: WindowHandle) -> u32 {
        self.state
            .lock()
            .nodes
            .get(&window)
            .map_or(0, |n| n.spec.pid)
    }

    fn set_bounds(&self, window: WindowHandle, bounds: Rect) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations.push(Mutation::Bounds(window, bounds));
        let parent_origin = match state.nodes.get(&window) {
            Some(node) => state.absolute_origin(node.parent).unwrap_or((0, 0)),
            None => return Ok(()),
        };
        let min = state.min_size;
        if let Some(node) = state.nodes.get_mut(&window) {
            node.spec.rect = Rect::new(
                bounds.x - parent_origin.0,
                bounds.y - parent_origin.1,
                bounds.width.max(min),
                bounds.height.max(min),
            );
        }
        Ok(())
    }

    fn set_parent(&self, window: WindowHandle, parent: WindowHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations.push(Mutation::Parent(window, parent));
        if let Some(node) = state.nodes.get_mut(&window) {
            node.spec.owner = parent;
        }
        Ok(())
    }

    /// `Set` and `Union` update the input shape; the other operations are only recorded.
    fn set_shape(&self, window: WindowHandle, rects: &[Rect], op: ShapeOp) -> Result<()> {
        let mut state = self.state.lock();
        state
            .mutations
            .push(Mutation::Shape(window, op, rects.to_vec()));
        if let Some(node) = state.nodes.get_mut(&window) {
            match op {
                ShapeOp::Set => node.spec.input_shape = Some(rects.to_vec()),
                ShapeOp::Union => node
                    .spec
                    .input_shape
                    .get_or_insert_with(Vec::new)
                    .extend_from_slice(rects),
                _ => {}
            }
        }
        Ok(())
    }

    fn clear_shape(&self, window: WindowHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations.push(Mutation::ClearShape(window));
        if let Some(node) = state.nodes.get_mut(&window) {
            node.spec.input_shape = None;
        }
        Ok(())
    }

    fn active_window(&self) -> WindowHandle {
        self.state.lock().active
    }

    fn work_area(&self, _window: WindowHandle) -> Rect {
        self.state.lock().work_area
    }
}

impl WindowTree for FakeDesktop {
    fn root(&self) -> WindowHandle {
        Self::ROOT
    }

    fn children(&self, window: WindowHandle) -> Vec<WindowHandle> {
        self.state
            .lock()
            .children
            .get(&window)
            .cloned()
            .unwrap_or_default()
    }

    fn class_name(&self, window: WindowHandle) -> String {
        self.state
            .lock()
            .nodes
            .get(&window)
            .map(|n| n.spec.class.clone())
            .unwrap_or_default()
    }

    fn is_main_candidate(&self, window: WindowHandle) -> bool {
        self.state
            .lock()
            .nodes
            .get(&window)
            .is_some_and(|n| n.spec.visible && n.spec.owner.is_null())
    }

    fn clients_nested(&self) -> bool {
        self.state.lock().nested
    }
}

impl ShapeQuery for FakeDesktop {
    fn placement(&self, window: WindowHandle) -> Option<Placement> {
        let state = self.state.lock();
        state.nodes.get(&window).map(|n| Placement {
            mapped: n.spec.visible,
            rect: n.spec.rect,
        })
    }

    fn input_shape(&self, window: WindowHandle) -> Option<Vec<Rect>> {
        self.state
            .lock()
            .nodes
            .get(&window)
            .and_then(|n| n.spec.input_shape.clone())
    }
}

struct FakeSnapshot {
    bounds: Rect,
    data: Vec<u8>,
    alpha: bool,
    counters: Arc<CaptureCounters>,
}

impl Snapshot for FakeSnapshot {
    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn stride(&self) -> usize {
        self.bounds.width.max(0) as usize * 4
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn layout(&self) -> PixelLayout {
        PixelLayout::Bgra
    }

    fn has_alpha(&self) -> bool {
        self.alpha
    }
}

impl Drop for FakeSnapshot {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl CaptureSource for FakeDesktop {
    fn snapshot(&self, surface: Surface, region: Rect) -> Result<Box<dyn Snapshot + '_>> {
        if let Some(err) = self.state.lock().snapshot_failure.clone() {
            return Err(err);
        }
        let (extent, tint, alpha) = self.surface_of(surface)?;
        let bounds = region.intersection(&extent).unwrap_or(Rect::ZERO);
        let alpha_byte = if alpha { 0x7F } else { 0x00 };
        let mut data = Vec::with_capacity(bounds.rgba_len());
        for y in bounds.y..bounds.bottom() {
            for x in bounds.x..bounds.right() {
                data.extend_from_slice(&pattern_bgra(x, y, tint, alpha_byte));
            }
        }
        self.counters.taken.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSnapshot {
            bounds,
            data,
            alpha,
            counters: Arc::clone(&self.counters),
        }))
    }
}
