use std::ops::Range;

use eframe::egui;

use super::pv_main::MarkdownPreview;
use crate::style::{ColorPalette, ThemeColors};

pub struct HighlightColors {
    pub text: egui::Color32,
    pub match_bg: egui::Color32,
    pub current_bg: egui::Color32,
}

impl HighlightColors {
    pub fn new(theme: &ThemeColors, dark_mode: bool) -> Self {
        Self {
            text: theme.text_foreground,
            match_bg: if dark_mode { ColorPalette::MATCH_DARK } else { ColorPalette::MATCH_LIGHT },
            current_bg: ColorPalette::CURRENT_MATCH,
        }
    }
}

/// Lay out `text` in monospace with search hits painted behind it.
/// `matches` are char ranges; `current` indexes into them.
pub fn build_layout_job(
    text: &str,
    matches: &[Range<usize>],
    current: Option<usize>,
    highlight_all: bool,
    font_size: f32,
    colors: &HighlightColors,
) -> egui::text::LayoutJob {
    let mut job: egui::text::LayoutJob = egui::text::LayoutJob::default();
    let plain: egui::TextFormat = text_format(font_size, colors.text, egui::Color32::TRANSPARENT);

    let byte_at: Vec<usize> = char_to_byte_offsets(text);
    let mut cursor: usize = 0;
    for (idx, range) in matches.iter().enumerate() {
        let is_current: bool = current == Some(idx);
        if !is_current && !highlight_all {
            continue;
        }
        let (Some(&start), Some(&end)) = (byte_at.get(range.start), byte_at.get(range.end)) else {
            break;
        };
        if start < cursor {
            continue;
        }
        if start > cursor {
            job.append(&text[cursor..start], 0.0, plain.clone());
        }
        let bg: egui::Color32 = if is_current { colors.current_bg } else { colors.match_bg };
        job.append(&text[start..end], 0.0, text_format(font_size, colors.text, bg));
        cursor = end;
    }
    if cursor < text.len() || text.is_empty() {
        job.append(&text[cursor..], 0.0, plain);
    }
    job
}

fn text_format(font_size: f32, color: egui::Color32, background: egui::Color32) -> egui::TextFormat {
    egui::TextFormat {
        font_id: egui::FontId::monospace(font_size),
        color,
        background,
        ..Default::default()
    }
}

/// Byte offset of every char boundary, including the end of the string.
fn char_to_byte_offsets(text: &str) -> Vec<usize> {
    text.char_indices().map(|(b, _)| b).chain(std::iter::once(text.len())).collect()
}

impl MarkdownPreview {
    pub fn show(&mut self, ui: &mut egui::Ui, theme: &ThemeColors) {
        if self.show_search {
            self.render_search_bar(ui);
            ui.separator();
        }
        self.render_text(ui, theme);
    }

    fn render_search_bar(&mut self, ui: &mut egui::Ui) {
        let mut close: bool = false;
        ui.horizontal(|ui: &mut egui::Ui| {
            ui.label("Find:");
            let response: egui::Response = ui.add(
                egui::TextEdit::singleline(&mut self.search.query)
                    .hint_text("Search the Markdown")
                    .desired_width(220.0),
            );
            if self.focus_search {
                response.request_focus();
                self.focus_search = false;
            }
            if response.lost_focus() && ui.input(|i: &egui::InputState| i.key_pressed(egui::Key::Enter)) {
                if ui.input(|i: &egui::InputState| i.modifiers.shift) { self.find_previous(); } else { self.find_next(); }
                response.request_focus();
            }
            if response.has_focus() && ui.input(|i: &egui::InputState| i.key_pressed(egui::Key::Escape)) {
                close = true;
            }

            ui.checkbox(&mut self.search.case_sensitive, "Match case");
            ui.checkbox(&mut self.search.highlight_all, "Highlight all");

            if ui.button("⏶").on_hover_text("Previous match (Shift+F3)").clicked() { self.find_previous(); }
            if ui.button("⏷").on_hover_text("Next match (F3)").clicked() { self.find_next(); }

            self.search.refresh(&self.content, self.content_version);
            ui.label(self.search.summary());

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui: &mut egui::Ui| {
                if ui.small_button("✕").on_hover_text("Close (Esc)").clicked() { close = true; }
            });
        });
        if close {
            self.close_search();
        }
    }

    fn render_text(&mut self, ui: &mut egui::Ui, theme: &ThemeColors) {
        let font_size: f32 = self.font_size();
        let colors: HighlightColors = HighlightColors::new(theme, ui.visuals().dark_mode);
        let (matches, current, highlight_all): (Vec<Range<usize>>, Option<usize>, bool) = if self.show_search {
            self.search.refresh(&self.content, self.content_version);
            let current: Option<usize> = self
                .search
                .current_match()
                .and_then(|m| self.search.matches().iter().position(|r| *r == m));
            (self.search.matches().to_vec(), current, self.search.highlight_all)
        } else {
            (Vec::new(), None, false)
        };

        let pending: Option<Range<usize>> = self.pending_selection.take();
        let ctx: egui::Context = ui.ctx().clone();

        egui::ScrollArea::both().auto_shrink([false, false]).show(ui, |ui: &mut egui::Ui| {
            let mut layouter = |ui: &egui::Ui, text_buffer: &dyn egui::TextBuffer, wrap_width: f32| {
                let mut job: egui::text::LayoutJob =
                    build_layout_job(text_buffer.as_str(), &matches, current, highlight_all, font_size, &colors);
                job.wrap.max_width = wrap_width;
                ui.fonts_mut(|f: &mut egui::epaint::FontsView<'_>| f.layout_job(job))
            };

            let mut text: &str = self.content.as_str();
            let output: egui::text_edit::TextEditOutput = egui::TextEdit::multiline(&mut text)
                .id_salt("markdown_preview")
                .hint_text("Converted Markdown will appear here")
                .layouter(&mut layouter)
                .desired_width(f32::INFINITY)
                .desired_rows(30)
                .frame(false)
                .show(ui);

            if let Some(range) = pending {
                let id: egui::Id = output.response.id;
                let start: egui::text::CCursor = egui::text::CCursor::new(range.start);
                let end: egui::text::CCursor = egui::text::CCursor::new(range.end);
                if let Some(mut state) = egui::TextEdit::load_state(&ctx, id) {
                    state.cursor.set_char_range(Some(egui::text::CCursorRange::two(start, end)));
                    state.store(&ctx, id);
                }
                let rect: egui::Rect = output.galley.pos_from_cursor(start).translate(output.galley_pos.to_vec2());
                ui.scroll_to_rect(rect, Some(egui::Align::Center));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> HighlightColors {
        HighlightColors {
            text: egui::Color32::BLACK,
            match_bg: egui::Color32::YELLOW,
            current_bg: egui::Color32::RED,
        }
    }

    fn sections(job: &egui::text::LayoutJob) -> Vec<(String, egui::Color32)> {
        job.sections
            .iter()
            .map(|s| (job.text[s.byte_range.clone()].to_string(), s.format.background))
            .collect()
    }

    #[test]
    fn plain_text_is_one_section() {
        let job = build_layout_job("hello", &[], None, true, 14.0, &colors());
        assert_eq!(sections(&job), vec![("hello".to_string(), egui::Color32::TRANSPARENT)]);
    }

    #[test]
    fn current_match_is_distinct() {
        let job = build_layout_job("ab ab ab", &[0..2, 3..5, 6..8], Some(1), true, 14.0, &colors());
        let got = sections(&job);
        assert_eq!(got[0], ("ab".to_string(), egui::Color32::YELLOW));
        assert_eq!(got[2], ("ab".to_string(), egui::Color32::RED));
        assert_eq!(got[4], ("ab".to_string(), egui::Color32::YELLOW));
        assert_eq!(job.text, "ab ab ab");
    }

    #[test]
    fn only_current_when_highlight_all_off() {
        let job = build_layout_job("ab ab", &[0..2, 3..5], Some(1), false, 14.0, &colors());
        assert_eq!(
            sections(&job),
            vec![
                ("ab ".to_string(), egui::Color32::TRANSPARENT),
                ("ab".to_string(), egui::Color32::RED),
            ]
        );
    }

    #[test]
    fn multibyte_ranges_map_to_bytes() {
        let job = build_layout_job("é|é", &[2..3], Some(0), true, 14.0, &colors());
        assert_eq!(sections(&job)[1], ("é".to_string(), egui::Color32::RED));
    }
}
