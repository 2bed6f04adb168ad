//! Pagination – page geometry, break decisions, columns and mirrored
//! margins.
//!
//! The controller owns every page and the cursor. It decides *whether* a
//! break is needed; the document performs the break because a break also
//! touches fonts, colours and the header/footer callbacks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::content::ContentStream;
use crate::error::{EngineError, Result};
use crate::fonts::FontId;
use crate::layout_config::{LayoutConfig, Margins};
use crate::units::{mm_to_pt, PageOrientation, PageSize};

/// A block breaks only when it passes the trigger by more than this, mm.
pub const BREAK_TOLERANCE: f32 = 1e-4;

/// Link target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Link {
    Uri(String),
    /// 1-based page number and y position in mm.
    Page { page: usize, y: f32 },
}

/// A link rectangle on a page, in PDF points.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAnnotation {
    pub rect: [f32; 4],
    pub target: Link,
}

/// Resources referenced from one page's content stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResources {
    pub fonts: BTreeSet<FontId>,
    pub images: BTreeSet<usize>,
    pub graphics_states: BTreeSet<usize>,
    pub spot_colors: BTreeSet<usize>,
}

#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based.
    pub number: usize,
    pub width: f32,
    pub height: f32,
    pub orientation: PageOrientation,
    pub margins: Margins,
    pub content: ContentStream,
    pub resources: PageResources,
    pub links: Vec<LinkAnnotation>,
    pub next_mcid: u32,
}

impl Page {
    pub fn pt_x(&self, x: f32) -> f32 {
        mm_to_pt(x)
    }

    /// Flip a user-space y (mm from the top) into PDF points from the bottom.
    pub fn pt_y(&self, y: f32) -> f32 {
        mm_to_pt(self.height - y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    NoPage,
    PageActive,
    /// A new page is open and the previous one still needs its footer.
    FooterPending,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Columns {
    count: usize,
    gap: f32,
    current: usize,
    /// y at which the column set starts on the current page.
    top: f32,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            count: 1,
            gap: 0.0,
            current: 0,
            top: 0.0,
        }
    }
}

/// Where the next content goes after a break decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakTarget {
    NextColumn,
    NewPage,
}

pub struct PageController {
    size: PageSize,
    default_orientation: PageOrientation,
    margins: Margins,
    mirror_margins: bool,
    force_portrait_margins: bool,
    header_offset: f32,
    footer_offset: f32,
    pub auto_page_break: bool,

    pages: Vec<Page>,
    /// Index of the page that receives drawing.
    current: Option<usize>,
    state: PageState,
    columns: Columns,

    pub x: f32,
    pub y: f32,
}

impl PageController {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            size: config.page_size,
            default_orientation: config.orientation,
            margins: config.margins,
            mirror_margins: config.mirror_margins,
            force_portrait_margins: config.force_portrait_margins,
            header_offset: config.header_offset,
            footer_offset: config.footer_offset,
            auto_page_break: config.auto_page_break,
            pages: Vec::new(),
            current: None,
            state: PageState::NoPage,
            columns: Columns::default(),
            x: config.margins.left,
            y: config.margins.top,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Margins of page `number` in `orientation`.
    pub fn resolve_margins(&self, number: usize, orientation: PageOrientation) -> Margins {
        let mut m = self.margins;
        if self.mirror_margins && number % 2 == 0 {
            std::mem::swap(&mut m.left, &mut m.right);
        }
        if orientation != self.default_orientation && self.force_portrait_margins {
            // Keep each margin on the same physical paper edge.
            m = Margins {
                left: m.top,
                top: m.right,
                right: m.bottom,
                bottom: m.left,
            };
        }
        m
    }

    /// Start a new page and make it the drawing target. The previously
    /// active page moves to `FooterPending`; its index is returned.
    pub fn open_page(&mut self, orientation: Option<PageOrientation>) -> Option<usize> {
        let orientation = orientation.unwrap_or(self.default_orientation);
        let number = self.pages.len() + 1;
        let (width, height) = self.size.oriented(orientation);
        let margins = self.resolve_margins(number, orientation);
        let closed = self.current;
        self.pages.push(Page {
            number,
            width,
            height,
            orientation,
            margins,
            content: ContentStream::new(),
            resources: PageResources::default(),
            links: Vec::new(),
            next_mcid: 0,
        });
        self.current = Some(self.pages.len() - 1);
        self.state = if closed.is_some() {
            PageState::FooterPending
        } else {
            PageState::PageActive
        };
        self.columns.current = 0;
        self.columns.top = margins.top;
        self.x = margins.left;
        self.y = margins.top;
        log::info!("page {number} opened ({orientation:?}, {width}x{height} mm)");
        closed
    }

    pub fn footer_done(&mut self) {
        if self.state == PageState::FooterPending {
            self.state = PageState::PageActive;
        }
    }

    /// Redirect drawing to page `index` (used while painting a footer on a
    /// page that is no longer the newest).
    pub fn set_target(&mut self, index: usize) {
        if index < self.pages.len() {
            self.current = Some(index);
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn page(&self) -> Result<&Page> {
        self.current
            .and_then(|i| self.pages.get(i))
            .ok_or(EngineError::InvalidState("no page is open"))
    }

    pub fn page_mut(&mut self) -> Result<&mut Page> {
        self.current
            .and_then(|i| self.pages.get_mut(i))
            .ok_or(EngineError::InvalidState("no page is open"))
    }

    pub fn page_at_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 1-based number of the page receiving drawing, 0 before the first page.
    pub fn page_no(&self) -> usize {
        self.current.map(|i| i + 1).unwrap_or(0)
    }

    pub fn header_y(&self) -> f32 {
        self.header_offset
    }

    pub fn footer_y(&self) -> Result<f32> {
        Ok(self.page()?.height - self.footer_offset)
    }

    pub fn margins(&self) -> Margins {
        self.page().map(|p| p.margins).unwrap_or(self.margins)
    }

    pub fn page_size(&self) -> (f32, f32) {
        self.page()
            .map(|p| (p.width, p.height))
            .unwrap_or_else(|_| self.size.oriented(self.default_orientation))
    }

    /// y at which content must break.
    pub fn trigger(&self) -> f32 {
        let (_, height) = self.page_size();
        height - self.margins().bottom
    }

    /// Whether content of height `h` at the cursor crosses the trigger.
    pub fn would_break(&self, h: f32) -> bool {
        self.y + h > self.trigger() + BREAK_TOLERANCE
    }

    // -- columns ------------------------------------------------------------

    /// Lay out content in `count` columns separated by `gap` mm, starting at
    /// the cursor. `count <= 1` returns to a single column.
    pub fn set_columns(&mut self, count: usize, gap: f32) {
        self.columns = Columns {
            count: count.max(1),
            gap: gap.max(0.0),
            current: 0,
            top: self.y,
        };
        self.x = self.column_left();
    }

    pub fn column_count(&self) -> usize {
        self.columns.count
    }

    pub fn column_width(&self) -> f32 {
        let (width, _) = self.page_size();
        let m = self.margins();
        let content = width - m.left - m.right;
        let n = self.columns.count as f32;
        (content - self.columns.gap * (n - 1.0)) / n
    }

    pub fn column_left(&self) -> f32 {
        self.margins().left + self.columns.current as f32 * (self.column_width() + self.columns.gap)
    }

    /// Right edge of the area content may use.
    pub fn right_edge(&self) -> f32 {
        if self.columns.count > 1 {
            self.column_left() + self.column_width()
        } else {
            let (width, _) = self.page_size();
            width - self.margins().right
        }
    }

    /// Where a break at the cursor leads.
    pub fn break_target(&self) -> BreakTarget {
        if self.columns.current + 1 < self.columns.count {
            BreakTarget::NextColumn
        } else {
            BreakTarget::NewPage
        }
    }

    /// The cursor has not moved below the top of the current column.
    pub fn at_column_top(&self) -> bool {
        self.y <= self.columns.top + BREAK_TOLERANCE
    }

    /// Move to the top of the next column on the same page.
    pub fn next_column(&mut self) {
        self.columns.current += 1;
        self.y = self.columns.top;
        self.x = self.column_left();
        log::debug!("advanced to column {}", self.columns.current + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(config: LayoutConfig) -> PageController {
        let mut pc = PageController::new(&config);
        pc.open_page(None);
        pc
    }

    #[test]
    fn trigger_is_height_minus_bottom_margin() {
        let pc = controller(LayoutConfig::default());
        assert_eq!(pc.trigger(), 287.0);
    }

    #[test]
    fn exact_fit_does_not_break() {
        let mut pc = controller(LayoutConfig::default());
        pc.y = 100.0;
        let h = pc.trigger() - pc.y;
        assert!(!pc.would_break(h));
        assert!(pc.would_break(h + 0.001));
    }

    #[test]
    fn mirrored_margins_swap_on_even_pages() {
        let mut config = LayoutConfig::default();
        config.mirror_margins = true;
        config.margins.left = 30.0;
        config.margins.right = 10.0;
        let mut pc = controller(config);
        assert_eq!(pc.page().unwrap().margins.left, 30.0);
        let closed = pc.open_page(None);
        assert_eq!(closed, Some(0));
        assert_eq!(pc.state(), PageState::FooterPending);
        assert_eq!(pc.page().unwrap().margins.left, 10.0);
        assert_eq!(pc.x, 10.0);
    }

    #[test]
    fn landscape_override_keeps_portrait_margins() {
        let mut config = LayoutConfig::default();
        config.force_portrait_margins = true;
        config.margins = Margins {
            left: 1.0,
            top: 2.0,
            right: 3.0,
            bottom: 4.0,
        };
        let mut pc = controller(config);
        pc.open_page(Some(PageOrientation::Landscape));
        let page = pc.page().unwrap();
        assert_eq!((page.width, page.height), (297.0, 210.0));
        assert_eq!(page.margins.left, 2.0);
        assert_eq!(page.margins.bottom, 1.0);
    }

    #[test]
    fn columns_advance_before_pages() {
        let mut pc = controller(LayoutConfig::default());
        pc.set_columns(2, 10.0);
        assert_eq!(pc.column_width(), 90.0);
        assert_eq!(pc.break_target(), BreakTarget::NextColumn);
        pc.y = 200.0;
        pc.next_column();
        assert_eq!(pc.x, 110.0);
        assert_eq!(pc.y, 10.0);
        assert_eq!(pc.right_edge(), 200.0);
        assert_eq!(pc.break_target(), BreakTarget::NewPage);
    }

    #[test]
    fn no_page_is_invalid_state() {
        let pc = PageController::new(&LayoutConfig::default());
        assert_eq!(pc.state(), PageState::NoPage);
        assert!(matches!(pc.page(), Err(EngineError::InvalidState(_))));
    }
}
