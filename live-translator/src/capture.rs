//! Screen capture sources.
//!
//! A [`CaptureSource`] turns a [`MonitorTarget`] into a [`Frame`]. Sources never
//! fail loudly: on error they return a zero-sized frame, which the capture loop
//! treats as "skip this tick".

use crate::frame::{Frame, FrameSource};
use crate::types::{MonitorTarget, Rect, WindowId, WindowInfo};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// How long a window that failed to capture is skipped before retrying
const UNCAPTURABLE_COOLDOWN: Duration = Duration::from_secs(30);

/// Pixel acquisition primitive. Calls are blocking; the loop runs them off
/// the async executor.
pub trait CaptureSource: Send + Sync {
    fn capture_full_screen(&self) -> Frame;

    /// `bounds` is the last-known window rectangle
    fn capture_window(&self, id: WindowId, bounds: &Rect) -> Frame;

    fn capture_region(&self, rect: &Rect, name: &str) -> Frame;

    fn screen_dimensions(&self) -> (u32, u32);

    /// Visible top-level windows. Sources without window support list none.
    fn list_windows(&self) -> Vec<WindowInfo> {
        Vec::new()
    }

    /// Update a window target's last-known bounds and title from the live
    /// window list. Returns `false` when the window is not listed; the target
    /// is then left as it was.
    fn refresh_target(&self, target: &mut MonitorTarget) -> bool {
        let MonitorTarget::Window { id, bounds, title } = target else {
            return true;
        };

        match self.list_windows().into_iter().find(|w| w.id == *id) {
            Some(window) => {
                if *bounds != window.bounds {
                    debug!("Window {} moved to {:?}", id, window.bounds);
                    *bounds = window.bounds;
                }
                *title = window.title;
                true
            }
            None => false,
        }
    }

    fn capture(&self, target: &MonitorTarget) -> Frame {
        match target {
            MonitorTarget::FullScreen => self.capture_full_screen(),
            MonitorTarget::Window { id, bounds, .. } => self.capture_window(*id, bounds),
            MonitorTarget::Region { rect, name } => self.capture_region(rect, name),
        }
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::*;
    use crate::frame::PixelFormat;
    use core_graphics::display::CGDisplay;
    use core_graphics::geometry::{CGPoint, CGRect, CGSize};
    use core_graphics::image::CGImage;
    use core_graphics::window::{
        kCGWindowImageBestResolution, kCGWindowImageBoundsIgnoreFraming,
        kCGWindowListOptionIncludingWindow, kCGWindowListOptionOnScreenOnly,
        CGWindowListCreateImage,
    };
    use core_foundation::array::CFArray;
    use core_foundation::base::{CFType, TCFType};
    use core_foundation::dictionary::CFDictionary;
    use core_foundation::number::CFNumber;
    use core_foundation::string::CFString;
    use core_graphics::window::{
        kCGNullWindowID, kCGWindowListExcludeDesktopElements, CGWindowListCopyWindowInfo,
    };
    use foreign_types_shared::ForeignType;

    /// Windows smaller than this in either dimension are not worth watching
    const MIN_WINDOW_SIDE: u32 = 100;

    fn cg_rect(rect: &Rect) -> CGRect {
        CGRect::new(
            &CGPoint::new(rect.x as f64, rect.y as f64),
            &CGSize::new(rect.width as f64, rect.height as f64),
        )
    }

    pub fn main_display_bounds() -> Rect {
        let bounds = CGDisplay::main().bounds();
        Rect::new(
            bounds.origin.x as i32,
            bounds.origin.y as i32,
            bounds.size.width as u32,
            bounds.size.height as u32,
        )
    }

    /// Normal-layer, on-screen windows, front to back
    pub fn list_windows() -> Vec<WindowInfo> {
        let options = kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements;

        let window_list: CFArray<CFDictionary<CFString, CFType>> = unsafe {
            let list_ref = CGWindowListCopyWindowInfo(options, kCGNullWindowID);
            if list_ref.is_null() {
                return Vec::new();
            }
            CFArray::wrap_under_create_rule(list_ref)
        };

        window_list
            .iter()
            .filter_map(|dict| parse_window_dict(&dict))
            .collect()
    }

    fn parse_window_dict(dict: &CFDictionary<CFString, CFType>) -> Option<WindowInfo> {
        let id = dict_number(dict, "kCGWindowNumber")? as WindowId;
        let pid = dict_number(dict, "kCGWindowOwnerPID")? as u32;

        // Menu bars, docks and overlays live on other layers
        if dict_number(dict, "kCGWindowLayer").unwrap_or(0) != 0 {
            return None;
        }

        let bounds = window_bounds(dict)?;
        if bounds.width < MIN_WINDOW_SIDE || bounds.height < MIN_WINDOW_SIDE {
            return None;
        }

        Some(WindowInfo {
            id,
            title: dict_string(dict, "kCGWindowName").unwrap_or_default(),
            app_name: dict_string(dict, "kCGWindowOwnerName").unwrap_or_default(),
            pid,
            bounds,
        })
    }

    fn dict_value(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<CFType> {
        dict.find(&CFString::new(key)).map(|value| (*value).clone())
    }

    fn dict_number(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<i64> {
        dict_value(dict, key)?.downcast::<CFNumber>()?.to_i64()
    }

    fn dict_f64(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<f64> {
        dict_value(dict, key)?.downcast::<CFNumber>()?.to_f64()
    }

    fn dict_string(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<String> {
        dict_value(dict, key)?
            .downcast::<CFString>()
            .map(|s| s.to_string())
    }

    fn window_bounds(dict: &CFDictionary<CFString, CFType>) -> Option<Rect> {
        let value = dict_value(dict, "kCGWindowBounds")?;
        if value.type_of() != CFDictionary::<CFString, CFType>::type_id() {
            return None;
        }
        let bounds: CFDictionary<CFString, CFType> =
            unsafe { CFDictionary::wrap_under_get_rule(value.as_CFTypeRef() as *const _) };

        Some(Rect::new(
            dict_f64(&bounds, "X")? as i32,
            dict_f64(&bounds, "Y")? as i32,
            dict_f64(&bounds, "Width")? as u32,
            dict_f64(&bounds, "Height")? as u32,
        ))
    }

    /// Capture a specific window by ID
    pub fn capture_window(window_id: WindowId, bounds: &Rect, source: FrameSource) -> Option<Frame> {
        let options = kCGWindowImageBoundsIgnoreFraming | kCGWindowImageBestResolution;

        let cg_image: CGImage = unsafe {
            let image_ref = CGWindowListCreateImage(
                cg_rect(bounds),
                kCGWindowListOptionIncludingWindow,
                window_id as u32,
                options,
            );
            if image_ref.is_null() {
                return None;
            }
            CGImage::from_ptr(image_ref)
        };

        frame_from_cgimage(&cg_image, source)
    }

    /// Capture every on-screen window inside a rectangle
    pub fn capture_rect(rect: &Rect, source: FrameSource) -> Option<Frame> {
        let cg_image: CGImage = unsafe {
            let image_ref = CGWindowListCreateImage(
                cg_rect(rect),
                kCGWindowListOptionOnScreenOnly,
                0, // kCGNullWindowID
                kCGWindowImageBestResolution,
            );
            if image_ref.is_null() {
                return None;
            }
            CGImage::from_ptr(image_ref)
        };

        frame_from_cgimage(&cg_image, source)
    }

    /// Copy the CGImage rows into a packed BGRA frame, dropping row padding
    fn frame_from_cgimage(cg_image: &CGImage, source: FrameSource) -> Option<Frame> {
        let width = cg_image.width();
        let height = cg_image.height();
        let bytes_per_row = cg_image.bytes_per_row();
        let bytes_per_pixel = cg_image.bits_per_pixel() / 8;

        if bytes_per_pixel != 4 {
            warn!("Unsupported CGImage layout: {} bits per pixel", cg_image.bits_per_pixel());
            return None;
        }

        let data = cg_image.data();
        let bytes = data.bytes();
        let row_len = width * 4;
        if bytes.is_empty() || bytes.len() < bytes_per_row * height.saturating_sub(1) + row_len {
            return None;
        }

        let mut packed = Vec::with_capacity(row_len * height);
        for y in 0..height {
            let start = y * bytes_per_row;
            packed.extend_from_slice(&bytes[start..start + row_len]);
        }

        Frame::from_raw(width as u32, height as u32, PixelFormat::Bgra, packed, source).ok()
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::*;

    pub fn main_display_bounds() -> Rect {
        Rect::default()
    }

    pub fn list_windows() -> Vec<WindowInfo> {
        Vec::new()
    }

    pub fn capture_window(_window_id: WindowId, _bounds: &Rect, _source: FrameSource) -> Option<Frame> {
        None
    }

    pub fn capture_rect(_rect: &Rect, _source: FrameSource) -> Option<Frame> {
        None
    }
}

/// Platform screen capture
pub struct ScreenCapture {
    /// Windows that failed to capture (likely on a different Space)
    uncapturable_windows: Mutex<HashMap<WindowId, Instant>>,
}

impl ScreenCapture {
    pub fn new() -> Self {
        Self {
            uncapturable_windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check if a window recently failed to capture
    pub fn is_uncapturable(&self, window_id: WindowId) -> bool {
        match self.uncapturable_windows.lock() {
            Ok(map) => map
                .get(&window_id)
                .map(|time| time.elapsed() < UNCAPTURABLE_COOLDOWN)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn mark_window(&self, window_id: WindowId, capturable: bool) {
        if let Ok(mut map) = self.uncapturable_windows.lock() {
            map.retain(|_, failed_at| failed_at.elapsed() < UNCAPTURABLE_COOLDOWN);
            if capturable {
                map.remove(&window_id);
            } else {
                map.insert(window_id, Instant::now());
            }
        }
    }

    /// Forget failures of windows that no longer exist
    fn prune_closed(&self, live: &HashSet<WindowId>) {
        if let Ok(mut map) = self.uncapturable_windows.lock() {
            map.retain(|id, _| live.contains(id));
        }
    }

    fn uncapturable_count(&self) -> usize {
        self.uncapturable_windows.lock().map(|map| map.len()).unwrap_or(0)
    }
}

impl Default for ScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for ScreenCapture {
    fn capture_full_screen(&self) -> Frame {
        let start = Instant::now();
        let bounds = platform::main_display_bounds();
        match platform::capture_rect(&bounds, FrameSource::FullScreen) {
            Some(frame) => {
                trace!("Screen captured in {:?}", start.elapsed());
                frame
            }
            None => {
                warn!("Failed to capture the main display");
                Frame::empty(FrameSource::FullScreen)
            }
        }
    }

    fn capture_window(&self, id: WindowId, bounds: &Rect) -> Frame {
        if self.is_uncapturable(id) {
            trace!("Skipping uncapturable window {}", id);
            return Frame::empty(FrameSource::Window(id));
        }

        trace!("Capturing window {} at {:?}", id, bounds);
        match platform::capture_window(id, bounds, FrameSource::Window(id)) {
            Some(frame) => {
                self.mark_window(id, true);
                frame
            }
            None => {
                debug!("Window {} not capturable (likely on different Space)", id);
                self.mark_window(id, false);
                Frame::empty(FrameSource::Window(id))
            }
        }
    }

    fn capture_region(&self, rect: &Rect, name: &str) -> Frame {
        let source = FrameSource::Region(name.to_string());
        if rect.is_empty() {
            warn!("Region '{}' has no area", name);
            return Frame::empty(source);
        }

        platform::capture_rect(rect, source.clone()).unwrap_or_else(|| {
            warn!("Failed to capture region '{}'", name);
            Frame::empty(source)
        })
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        let bounds = platform::main_display_bounds();
        (bounds.width, bounds.height)
    }

    fn list_windows(&self) -> Vec<WindowInfo> {
        let windows = platform::list_windows();
        let live: HashSet<WindowId> = windows.iter().map(|w| w.id).collect();
        self.prune_closed(&live);
        trace!("{} windows on screen", windows.len());
        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_region_yields_empty_frame() {
        let capture = ScreenCapture::new();
        let frame = capture.capture(&MonitorTarget::Region {
            rect: Rect::new(10, 10, 0, 40),
            name: "nothing".into(),
        });
        assert!(frame.is_empty());
        assert_eq!(frame.source(), &FrameSource::Region("nothing".into()));
    }

    #[test]
    fn test_uncapturable_cooldown() {
        let capture = ScreenCapture::new();
        assert!(!capture.is_uncapturable(7));
        capture.mark_window(7, false);
        assert!(capture.is_uncapturable(7));
        capture.mark_window(7, true);
        assert!(!capture.is_uncapturable(7));
    }

    #[test]
    fn test_closed_windows_are_forgotten() {
        let capture = ScreenCapture::new();
        capture.mark_window(7, false);
        capture.mark_window(8, false);
        assert_eq!(capture.uncapturable_count(), 2);

        capture.prune_closed(&HashSet::from([8]));
        assert_eq!(capture.uncapturable_count(), 1);
        assert!(capture.is_uncapturable(8));
        assert!(!capture.is_uncapturable(7));
    }

    #[test]
    fn test_expired_failures_are_dropped() {
        let capture = ScreenCapture::new();
        if let Some(long_ago) = Instant::now().checked_sub(UNCAPTURABLE_COOLDOWN * 2) {
            capture.uncapturable_windows.lock().unwrap().insert(7, long_ago);
            capture.mark_window(9, false);
            assert_eq!(capture.uncapturable_count(), 1);
            assert!(capture.is_uncapturable(9));
        }
    }

    /// Reports one window at whatever bounds the test sets
    struct Desktop {
        windows: Mutex<Vec<WindowInfo>>,
    }

    impl CaptureSource for Desktop {
        fn capture_full_screen(&self) -> Frame {
            Frame::empty(FrameSource::FullScreen)
        }
        fn capture_window(&self, id: WindowId, _bounds: &Rect) -> Frame {
            Frame::empty(FrameSource::Window(id))
        }
        fn capture_region(&self, _rect: &Rect, name: &str) -> Frame {
            Frame::empty(FrameSource::Region(name.to_string()))
        }
        fn screen_dimensions(&self) -> (u32, u32) {
            (1920, 1080)
        }
        fn list_windows(&self) -> Vec<WindowInfo> {
            self.windows.lock().unwrap().clone()
        }
    }

    fn editor_window(bounds: Rect) -> WindowInfo {
        WindowInfo {
            id: 42,
            title: "Ladder Editor".into(),
            app_name: "PLCStudio".into(),
            pid: 900,
            bounds,
        }
    }

    #[test]
    fn test_refresh_follows_moved_window() {
        let desktop = Desktop {
            windows: Mutex::new(vec![editor_window(Rect::new(300, 200, 800, 600))]),
        };
        let mut target = MonitorTarget::Window {
            id: 42,
            bounds: Rect::new(0, 0, 800, 600),
            title: String::new(),
        };

        assert!(desktop.refresh_target(&mut target));
        assert_eq!(target, editor_window(Rect::new(300, 200, 800, 600)).to_target());
    }

    #[test]
    fn test_refresh_keeps_unlisted_window() {
        let desktop = Desktop {
            windows: Mutex::new(Vec::new()),
        };
        let original = MonitorTarget::Window {
            id: 42,
            bounds: Rect::new(10, 10, 640, 480),
            title: "Ladder Editor".into(),
        };
        let mut target = original.clone();

        assert!(!desktop.refresh_target(&mut target));
        assert_eq!(target, original);

        let mut full = MonitorTarget::FullScreen;
        assert!(desktop.refresh_target(&mut full));
    }
}
