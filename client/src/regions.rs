/// Region selection session: rectangular regions drawn over a video frame,
/// tracked in video-pixel coordinates and serialized into the `regions`
/// form field consumed by the watermark-removal endpoint.
use std::time::Duration;
use tracing::debug;

/// One user-drawn rectangle in video-pixel space.
///
/// Width/height may be negative when the drag went up or left; the raw
/// extents are preserved (the server takes their absolute value).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Canvas geometry: intrinsic bitmap size vs. on-screen rendered size.
///
/// The overlay is stretched to the video's display box, so pointer
/// coordinates must be scaled by intrinsic/rendered independently per axis
/// before they mean anything in video space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub bitmap_width: f64,
    pub bitmap_height: f64,
    pub display_width: f64,
    pub display_height: f64,
}

impl Viewport {
    pub fn new(bitmap: (u32, u32), display: (f64, f64)) -> Self {
        Self {
            bitmap_width: bitmap.0 as f64,
            bitmap_height: bitmap.1 as f64,
            display_width: display.0,
            display_height: display.1,
        }
    }

    /// Map a display-space pointer position into video-pixel space.
    pub fn to_bitmap(&self, x: f64, y: f64) -> (f64, f64) {
        let scale_x = self.bitmap_width / self.display_width;
        let scale_y = self.bitmap_height / self.display_height;
        (x * scale_x, y * scale_y)
    }
}

/// Rendering surface for the selector. Receives the committed sequence plus
/// the in-progress candidate on every change.
pub trait RegionView {
    fn render(&mut self, committed: &[Region], candidate: Option<&Region>);
}

/// No-op view for headless use of the selector.
pub struct NullRegionView;

impl RegionView for NullRegionView {
    fn render(&mut self, _committed: &[Region], _candidate: Option<&Region>) {}
}

/// One region-selection session. Owns the ordered region sequence, the
/// serialized field string, and the view; mutated only through its own
/// operations, never shared.
pub struct RegionSelector<V: RegionView> {
    viewport: Option<Viewport>,
    regions: Vec<Region>,
    /// Anchor of the in-progress drag, in video-pixel space.
    anchor: Option<(f64, f64)>,
    /// Serialized form of `regions`; kept in sync on every mutation.
    field: String,
    view: V,
}

impl<V: RegionView> RegionSelector<V> {
    pub fn new(view: V) -> Self {
        Self {
            viewport: None,
            regions: Vec::new(),
            anchor: None,
            field: String::new(),
            view,
        }
    }

    /// Establish sizing once video metadata is available. Also used on
    /// resize: committed regions are resolution-relative and stay valid.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        debug!(
            "Viewport set: {}x{} bitmap over {}x{} display",
            viewport.bitmap_width, viewport.bitmap_height,
            viewport.display_width, viewport.display_height
        );
        self.viewport = Some(viewport);
        self.redraw(None);
    }

    pub fn is_sized(&self) -> bool {
        self.viewport.is_some()
    }

    /// Begin a candidate region anchored at the pointer position.
    /// Ignored until a viewport has been established.
    pub fn pointer_down(&mut self, display_x: f64, display_y: f64) {
        let Some(viewport) = self.viewport else { return };
        self.anchor = Some(viewport.to_bitmap(display_x, display_y));
    }

    /// Redraw committed regions plus the candidate stretched to the current
    /// pointer position. Returns the candidate for callers that render
    /// incrementally; None when no drag is active.
    pub fn pointer_move(&mut self, display_x: f64, display_y: f64) -> Option<Region> {
        let candidate = self.candidate_at(display_x, display_y)?;
        self.redraw(Some(&candidate));
        Some(candidate)
    }

    /// Commit the candidate to the ordered sequence, redraw and reserialize.
    pub fn pointer_up(&mut self, display_x: f64, display_y: f64) -> Option<Region> {
        let committed = self.candidate_at(display_x, display_y)?;
        self.anchor = None;
        self.regions.push(committed);
        self.sync_field();
        self.redraw(None);
        Some(committed)
    }

    fn candidate_at(&self, display_x: f64, display_y: f64) -> Option<Region> {
        let viewport = self.viewport?;
        let (ax, ay) = self.anchor?;
        let (x, y) = viewport.to_bitmap(display_x, display_y);
        Some(Region {
            x: ax,
            y: ay,
            width: x - ax,
            height: y - ay,
        })
    }

    /// Remove the most recently committed region. No-op when empty.
    pub fn undo(&mut self) {
        self.regions.pop();
        self.sync_field();
        self.redraw(None);
    }

    /// Empty the sequence.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.sync_field();
        self.redraw(None);
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Current value of the hidden `regions` form field.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Field value for submission; an empty selection blocks the submit.
    pub fn submit_field(&self) -> crate::errors::ClientResult<String> {
        if self.regions.is_empty() {
            return Err(crate::errors::ClientError::EmptyRegionSet);
        }
        Ok(self.field.clone())
    }

    fn sync_field(&mut self) {
        self.field = serialize_regions(&self.regions);
    }

    fn redraw(&mut self, candidate: Option<&Region>) {
        self.view.render(&self.regions, candidate);
    }
}

/// Serialize a region sequence as `"x,y,w,h;x,y,w,h"` with
/// integer-rounded coordinates.
pub fn serialize_regions(regions: &[Region]) -> String {
    regions
        .iter()
        .map(|r| {
            format!(
                "{},{},{},{}",
                r.x.round() as i64,
                r.y.round() as i64,
                r.width.round() as i64,
                r.height.round() as i64
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse a serialized field back into regions, skipping malformed entries
/// the way the server-side consumer does.
pub fn parse_field(field: &str) -> Vec<Region> {
    field
        .split(';')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parts: Vec<f64> = entry
                .split(',')
                .map(|p| p.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .ok()?;
            if parts.len() != 4 {
                return None;
            }
            Some(Region {
                x: parts[0],
                y: parts[1],
                width: parts[2],
                height: parts[3],
            })
        })
        .collect()
}

/// Wait for the video's intrinsic size to become known, probing
/// periodically. Bounded: after `timeout` the fallback size is used rather
/// than retrying forever.
pub async fn resolve_intrinsic_size<F>(
    mut probe: F,
    fallback: (u32, u32),
    timeout: Duration,
) -> (u32, u32)
where
    F: FnMut() -> Option<(u32, u32)>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut interval = tokio::time::interval(Duration::from_millis(100));
    loop {
        interval.tick().await;
        if let Some(size) = probe() {
            return size;
        }
        if tokio::time::Instant::now() >= deadline {
            debug!("Video metadata never arrived, using fallback size");
            return fallback;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every render call for assertions.
    struct RecordingView {
        renders: usize,
        last_candidate: Option<Region>,
    }

    impl RecordingView {
        fn new() -> Self {
            Self { renders: 0, last_candidate: None }
        }
    }

    impl RegionView for &mut RecordingView {
        fn render(&mut self, _committed: &[Region], candidate: Option<&Region>) {
            self.renders += 1;
            self.last_candidate = candidate.copied();
        }
    }

    fn sized_selector(view: &mut RecordingView) -> RegionSelector<&mut RecordingView> {
        let mut selector = RegionSelector::new(view);
        selector.set_viewport(Viewport::new((1920, 1080), (960.0, 540.0)));
        selector
    }

    #[test]
    fn test_pointer_coordinates_scaled_to_video_space() {
        let mut view = RecordingView::new();
        let mut selector = sized_selector(&mut view);

        selector.pointer_down(100.0, 50.0);
        let region = selector.pointer_up(200.0, 150.0).unwrap();

        assert_eq!(region, Region { x: 200.0, y: 100.0, width: 200.0, height: 200.0 });
        assert_eq!(selector.field(), "200,100,200,200");
    }

    #[test]
    fn test_negative_extents_preserved() {
        let mut view = RecordingView::new();
        let mut selector = sized_selector(&mut view);

        // Drag up and to the left.
        selector.pointer_down(200.0, 150.0);
        let region = selector.pointer_up(100.0, 50.0).unwrap();

        assert_eq!(region.width, -200.0);
        assert_eq!(region.height, -200.0);
        assert_eq!(selector.field(), "400,300,-200,-200");
    }

    #[test]
    fn test_move_renders_candidate_without_committing() {
        let mut view = RecordingView::new();
        let mut selector = sized_selector(&mut view);

        selector.pointer_down(0.0, 0.0);
        let candidate = selector.pointer_move(50.0, 50.0).unwrap();
        assert_eq!(candidate.width, 100.0);
        assert!(selector.regions().is_empty());
        assert_eq!(selector.field(), "");

        // The view saw the candidate: one render for sizing, one per move.
        drop(selector);
        assert_eq!(view.renders, 2);
        assert_eq!(view.last_candidate.unwrap().width, 100.0);
    }

    #[test]
    fn test_pointer_events_ignored_before_sizing() {
        let mut view = RecordingView::new();
        let mut selector = RegionSelector::new(&mut view);
        selector.pointer_down(10.0, 10.0);
        assert!(selector.pointer_move(20.0, 20.0).is_none());
        assert!(selector.pointer_up(20.0, 20.0).is_none());
        assert!(selector.regions().is_empty());
    }

    #[test]
    fn test_undo_removes_most_recent() {
        let mut view = RecordingView::new();
        let mut selector = sized_selector(&mut view);

        selector.pointer_down(0.0, 0.0);
        selector.pointer_up(10.0, 10.0);
        selector.pointer_down(20.0, 20.0);
        selector.pointer_up(40.0, 40.0);
        assert_eq!(selector.regions().len(), 2);

        selector.undo();
        assert_eq!(selector.regions().len(), 1);
        assert_eq!(selector.regions()[0].x, 0.0);
    }

    #[test]
    fn test_undo_on_empty_is_noop() {
        let mut view = RecordingView::new();
        let mut selector = sized_selector(&mut view);
        selector.undo();
        assert!(selector.regions().is_empty());
        assert_eq!(selector.field(), "");
    }

    #[test]
    fn test_clear_empties_sequence() {
        let mut view = RecordingView::new();
        let mut selector = sized_selector(&mut view);
        selector.pointer_down(0.0, 0.0);
        selector.pointer_up(10.0, 10.0);
        selector.clear();
        assert!(selector.regions().is_empty());
        assert_eq!(selector.field(), "");
    }

    #[test]
    fn test_serialization_format() {
        let regions = vec![
            Region { x: 1.0, y: 2.0, width: 3.0, height: 4.0 },
            Region { x: 5.0, y: 6.0, width: 7.0, height: 8.0 },
        ];
        assert_eq!(serialize_regions(&regions), "1,2,3,4;5,6,7,8");
    }

    #[test]
    fn test_parse_field_roundtrip() {
        let parsed = parse_field("1,2,3,4;5,6,7,8");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1], Region { x: 5.0, y: 6.0, width: 7.0, height: 8.0 });
        // Malformed entries are skipped.
        assert_eq!(parse_field("1,2,3;x,y,w,h;9,9,9,9").len(), 1);
        assert!(parse_field("").is_empty());
    }

    #[test]
    fn test_empty_submit_blocked() {
        let mut view = RecordingView::new();
        let selector = sized_selector(&mut view);
        assert!(matches!(
            selector.submit_field(),
            Err(crate::errors::ClientError::EmptyRegionSet)
        ));
    }

    #[test]
    fn test_resize_retains_regions() {
        let mut view = RecordingView::new();
        let mut selector = sized_selector(&mut view);
        selector.pointer_down(100.0, 50.0);
        selector.pointer_up(200.0, 150.0);
        let field_before = selector.field().to_string();

        // Window resized: same bitmap, new display box.
        selector.set_viewport(Viewport::new((1920, 1080), (480.0, 270.0)));
        assert_eq!(selector.field(), field_before);

        // New drags use the new scale.
        selector.pointer_down(10.0, 10.0);
        let region = selector.pointer_up(20.0, 20.0).unwrap();
        assert_eq!(region.x, 40.0);
        assert_eq!(region.width, 40.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intrinsic_size_from_metadata() {
        let mut calls = 0;
        let size = resolve_intrinsic_size(
            move || {
                calls += 1;
                if calls >= 3 { Some((1280, 720)) } else { None }
            },
            (640, 360),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(size, (1280, 720));
    }

    #[tokio::test(start_paused = true)]
    async fn test_intrinsic_size_fallback_after_deadline() {
        let size = resolve_intrinsic_size(|| None, (640, 360), Duration::from_secs(1)).await;
        assert_eq!(size, (640, 360));
    }
}
