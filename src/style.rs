use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::preferences::PreferencesStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }
}

pub struct ColorPalette;

impl ColorPalette {
    pub const BLUE_400: egui::Color32 = egui::Color32::from_rgb(96, 165, 250);
    pub const BLUE_500: egui::Color32 = egui::Color32::from_rgb(59, 130, 246);
    pub const BLUE_600: egui::Color32 = egui::Color32::from_rgb(37, 99, 235);

    pub const ACCENT: egui::Color32 = egui::Color32::from_rgb(0x00, 0x78, 0xd7);

    pub const MATCH_LIGHT: egui::Color32 = egui::Color32::from_rgb(0xff, 0xf2, 0x9e);
    pub const MATCH_DARK: egui::Color32 = egui::Color32::from_rgb(0x6b, 0x5b, 0x00);
    pub const CURRENT_MATCH: egui::Color32 = egui::Color32::from_rgb(0xff, 0x9f, 0x1c);
}

/// Named colors for one theme.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeColors {
    pub background: egui::Color32,
    pub foreground: egui::Color32,
    pub text_background: egui::Color32,
    pub text_foreground: egui::Color32,
    pub accent: egui::Color32,
    pub border: egui::Color32,
    pub button: egui::Color32,
    pub button_pressed: egui::Color32,
    pub highlight: egui::Color32,
    pub highlight_text: egui::Color32,
    pub disabled_bg: egui::Color32,
    pub disabled_fg: egui::Color32,
    pub status_bar_bg: egui::Color32,
    pub status_bar_fg: egui::Color32,
    pub toolbar_bg: egui::Color32,
    pub toolbar_fg: egui::Color32,
    pub menu_bg: egui::Color32,
    pub menu_fg: egui::Color32,
    pub field_bg: egui::Color32,
    pub field_fg: egui::Color32,
    pub field_highlight_bg: egui::Color32,
    pub scrollbar_bg: egui::Color32,
    pub scrollbar_fg: egui::Color32,
}

const fn hex(rgb: u32) -> egui::Color32 {
    egui::Color32::from_rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

static LIGHT: ThemeColors = ThemeColors {
    background: hex(0xffffff),
    foreground: hex(0x000000),
    text_background: hex(0xffffff),
    text_foreground: hex(0x000000),
    accent: ColorPalette::ACCENT,
    border: hex(0xd1d1d1),
    button: hex(0xf0f0f0),
    button_pressed: hex(0xd8d8d8),
    highlight: hex(0xe5f1fb),
    highlight_text: hex(0x000000),
    disabled_bg: hex(0xf0f0f0),
    disabled_fg: hex(0xa0a0a0),
    status_bar_bg: hex(0xf0f0f0),
    status_bar_fg: hex(0x000000),
    toolbar_bg: hex(0xf5f5f5),
    toolbar_fg: hex(0x000000),
    menu_bg: hex(0xffffff),
    menu_fg: hex(0x000000),
    field_bg: hex(0xffffff),
    field_fg: hex(0x000000),
    field_highlight_bg: hex(0xe5f1fb),
    scrollbar_bg: hex(0xf0f0f0),
    scrollbar_fg: hex(0xc0c0c0),
};

static DARK: ThemeColors = ThemeColors {
    background: hex(0x2d2d2d),
    foreground: hex(0xe0e0e0),
    text_background: hex(0x333333),
    text_foreground: hex(0xe0e0e0),
    accent: ColorPalette::ACCENT,
    border: hex(0x555555),
    button: hex(0x3d3d3d),
    button_pressed: hex(0x4d4d4d),
    highlight: hex(0x264f78),
    highlight_text: hex(0xffffff),
    disabled_bg: hex(0x3d3d3d),
    disabled_fg: hex(0x767676),
    status_bar_bg: hex(0x3d3d3d),
    status_bar_fg: hex(0xe0e0e0),
    toolbar_bg: hex(0x333333),
    toolbar_fg: hex(0xe0e0e0),
    menu_bg: hex(0x2d2d2d),
    menu_fg: hex(0xe0e0e0),
    field_bg: hex(0x333333),
    field_fg: hex(0xe0e0e0),
    field_highlight_bg: hex(0x264f78),
    scrollbar_bg: hex(0x3d3d3d),
    scrollbar_fg: hex(0x5d5d5d),
};

impl ThemeColors {
    pub fn for_mode(mode: ThemeMode) -> &'static ThemeColors {
        match mode {
            ThemeMode::Light => &LIGHT,
            ThemeMode::Dark => &DARK,
        }
    }
}

pub fn apply_theme(ctx: &egui::Context, theme: ThemeMode) {
    let mut style = (*ctx.style()).clone();

    style.visuals.widgets.noninteractive.corner_radius = egui::CornerRadius::same(4);
    style.visuals.widgets.inactive.corner_radius = egui::CornerRadius::same(4);
    style.visuals.widgets.hovered.corner_radius = egui::CornerRadius::same(4);
    style.visuals.widgets.active.corner_radius = egui::CornerRadius::same(4);

    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.button_padding = egui::vec2(10.0, 4.0);
    style.spacing.window_margin = egui::Margin::same(10);

    style.visuals.dark_mode = matches!(theme, ThemeMode::Dark);
    apply_colors(&mut style, ThemeColors::for_mode(theme));

    ctx.set_style(style);
}

fn apply_colors(style: &mut egui::Style, c: &ThemeColors) {
    let visuals = &mut style.visuals;

    visuals.panel_fill = c.background;
    visuals.window_fill = c.background;
    visuals.window_stroke = egui::Stroke::new(1.0, c.border);
    visuals.faint_bg_color = c.toolbar_bg;
    visuals.extreme_bg_color = c.text_background;
    visuals.code_bg_color = c.text_background;
    visuals.override_text_color = None;

    visuals.widgets.noninteractive.bg_fill = c.background;
    visuals.widgets.noninteractive.weak_bg_fill = c.toolbar_bg;
    visuals.widgets.noninteractive.bg_stroke = egui::Stroke::new(1.0, c.border);
    visuals.widgets.noninteractive.fg_stroke = egui::Stroke::new(1.0, c.foreground);

    visuals.widgets.inactive.bg_fill = c.field_bg;
    visuals.widgets.inactive.weak_bg_fill = c.button;
    visuals.widgets.inactive.bg_stroke = egui::Stroke::new(1.0, c.border);
    visuals.widgets.inactive.fg_stroke = egui::Stroke::new(1.0, c.foreground);

    visuals.widgets.hovered.bg_fill = c.highlight;
    visuals.widgets.hovered.weak_bg_fill = c.button_pressed;
    visuals.widgets.hovered.bg_stroke = egui::Stroke::new(1.0, c.accent);
    visuals.widgets.hovered.fg_stroke = egui::Stroke::new(1.0, c.foreground);

    visuals.widgets.active.bg_fill = c.button_pressed;
    visuals.widgets.active.weak_bg_fill = c.button_pressed;
    visuals.widgets.active.bg_stroke = egui::Stroke::new(1.0, c.accent);
    visuals.widgets.active.fg_stroke = egui::Stroke::new(1.0, c.highlight_text);

    visuals.selection.bg_fill = c.field_highlight_bg;
    visuals.selection.stroke = egui::Stroke::new(1.0, c.highlight_text);
    visuals.hyperlink_color = if visuals.dark_mode {
        ColorPalette::BLUE_400
    } else {
        ColorPalette::BLUE_600
    };
}

/// Tracks the active theme and persists every change.
pub struct ThemeManager {
    current: ThemeMode,
}

impl ThemeManager {
    pub fn new(initial: ThemeMode) -> Self {
        Self { current: initial }
    }

    /// Re-apply the current theme without persisting, for startup.
    pub fn initialize(&self, ctx: &egui::Context) {
        apply_theme(ctx, self.current);
    }

    pub fn apply_theme(&mut self, ctx: &egui::Context, mode: ThemeMode, prefs: &mut PreferencesStore) {
        self.current = mode;
        apply_theme(ctx, mode);
        prefs.set_theme(mode);
        tracing::debug!(theme = mode.as_str(), "theme applied");
    }

    pub fn toggle_theme(&mut self, ctx: &egui::Context, prefs: &mut PreferencesStore) -> ThemeMode {
        let next = self.current.toggled();
        self.apply_theme(ctx, next, prefs);
        next
    }

    pub fn get_current_theme(&self) -> ThemeMode {
        self.current
    }

    pub fn get_theme_colors(&self) -> &'static ThemeColors {
        ThemeColors::for_mode(self.current)
    }
}

pub fn status_bar_frame(theme: ThemeMode) -> egui::Frame {
    let c = ThemeColors::for_mode(theme);
    egui::Frame::new()
        .fill(c.status_bar_bg)
        .stroke(egui::Stroke::new(1.0, c.border))
        .inner_margin(egui::Margin::symmetric(8, 4))
}

pub fn toolbar_frame(theme: ThemeMode) -> egui::Frame {
    let c = ThemeColors::for_mode(theme);
    egui::Frame::new()
        .fill(c.toolbar_bg)
        .inner_margin(egui::Margin::symmetric(8, 6))
}

pub fn primary_button(ui: &mut egui::Ui, text: &str, enabled: bool) -> egui::Response {
    let (bg_color, hover_color) = (ColorPalette::BLUE_600, ColorPalette::BLUE_500);

    ui.scope(|ui| {
        let style = ui.style_mut();
        style.visuals.widgets.inactive.bg_fill = bg_color;
        style.visuals.widgets.inactive.weak_bg_fill = bg_color;
        style.visuals.widgets.inactive.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);
        style.visuals.widgets.inactive.bg_stroke = egui::Stroke::NONE;

        style.visuals.widgets.hovered.bg_fill = hover_color;
        style.visuals.widgets.hovered.weak_bg_fill = hover_color;
        style.visuals.widgets.hovered.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);
        style.visuals.widgets.hovered.bg_stroke = egui::Stroke::NONE;

        style.visuals.widgets.active.bg_fill = bg_color;
        style.visuals.widgets.active.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);
        style.visuals.widgets.active.bg_stroke = egui::Stroke::NONE;

        let button = egui::Button::new(egui::RichText::new(text).size(15.0))
            .min_size(egui::vec2(120.0, 30.0));

        ui.add_enabled(enabled, button)
    })
    .inner
}
