use std::fs::File;
use std::io::{self, BufWriter};
use std::ops::Range;
use std::path::Path;

use ropey::Rope;

use super::pv_search::SearchState;
use crate::preferences::{MAX_ZOOM, MIN_ZOOM};

pub const BASE_FONT_SIZE: f32 = 14.0;
const ZOOM_STEP: f32 = 1.5;

/// Read-only Markdown view with find, highlight and zoom.
pub struct MarkdownPreview {
    pub(super) content: String,
    pub(super) content_version: u64,
    pub(super) zoom_level: i32,
    pub(super) search: SearchState,
    pub(super) show_search: bool,
    pub(super) focus_search: bool,
    pub(super) pending_selection: Option<Range<usize>>,
    pub(super) cached_word_count: usize,
    pub(super) cached_char_count: usize,
    pub(super) cached_counts_version: u64,
}

impl MarkdownPreview {
    pub fn new(zoom_level: i32) -> Self {
        Self {
            content: String::new(),
            content_version: 0,
            zoom_level: zoom_level.clamp(MIN_ZOOM, MAX_ZOOM),
            search: SearchState::default(),
            show_search: false,
            focus_search: false,
            pending_selection: None,
            cached_word_count: 0,
            cached_char_count: 0,
            cached_counts_version: u64::MAX,
        }
    }

    pub fn set_content(&mut self, markdown: impl Into<String>) {
        self.content = markdown.into().replace("\r\n", "\n");
        self.content_version += 1;
        self.pending_selection = None;
    }

    pub fn clear(&mut self) {
        self.set_content(String::new());
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn zoom_level(&self) -> i32 {
        self.zoom_level
    }

    pub fn font_size(&self) -> f32 {
        BASE_FONT_SIZE + ZOOM_STEP * self.zoom_level as f32
    }

    pub fn set_zoom_level(&mut self, level: i32) -> i32 {
        self.zoom_level = level.clamp(MIN_ZOOM, MAX_ZOOM);
        self.zoom_level
    }

    pub fn zoom_in(&mut self) -> i32 {
        self.set_zoom_level(self.zoom_level + 1)
    }

    pub fn zoom_out(&mut self) -> i32 {
        self.set_zoom_level(self.zoom_level - 1)
    }

    pub fn reset_zoom(&mut self) -> i32 {
        self.set_zoom_level(0)
    }

    fn refresh_counts(&mut self) {
        if self.cached_counts_version != self.content_version {
            self.cached_word_count = self.content.split_whitespace().count();
            self.cached_char_count = self.content.chars().count();
            self.cached_counts_version = self.content_version;
        }
    }

    pub fn word_count(&mut self) -> usize {
        self.refresh_counts();
        self.cached_word_count
    }

    pub fn char_count(&mut self) -> usize {
        self.refresh_counts();
        self.cached_char_count
    }

    pub fn stats_text(&mut self) -> String {
        format!("Words: {}  Characters: {}", self.word_count(), self.char_count())
    }

    pub fn open_search(&mut self) {
        self.show_search = true;
        self.focus_search = true;
    }

    pub fn close_search(&mut self) {
        self.show_search = false;
        self.search.clear();
    }

    pub fn is_search_open(&self) -> bool {
        self.show_search
    }

    pub fn search(&self) -> &SearchState {
        &self.search
    }

    /// A freshly rebuilt match list lands on its first match.
    pub fn find_next(&mut self) -> Option<Range<usize>> {
        self.search.refresh(&self.content, self.content_version);
        let found = self.search.next();
        self.pending_selection = found.clone();
        found
    }

    pub fn find_previous(&mut self) -> Option<Range<usize>> {
        self.search.refresh(&self.content, self.content_version);
        let found = self.search.previous();
        self.pending_selection = found.clone();
        found
    }

    pub fn select_all(&mut self) {
        self.pending_selection = Some(0..self.content.chars().count());
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        Rope::from_str(&self.content).write_to(&mut writer)
    }
}
