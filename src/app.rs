use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::Instant;

use eframe::egui;

use crate::context::AppContext;
use crate::converter::{ConversionParameters, ConversionProgress, ProgressCallback};
use crate::modules::notification_widgets::NotificationPanel;
use crate::modules::preview::MarkdownPreview;
use crate::notifications::{DRAIN_INTERVAL, Notification, NotificationCallback};
use crate::style::{self, ThemeMode};

const APP_TITLE: &str = "MarkItDown UI";
const STATUS_ERROR_CHARS: usize = 50;

const OPEN_FILTERS: &[(&str, &[&str])] = &[
    ("All Files", &["*"]),
    ("PDF Files", &["pdf"]),
    ("Word Documents", &["docx", "doc"]),
    ("PowerPoint Presentations", &["pptx", "ppt"]),
    ("Excel Spreadsheets", &["xlsx", "xls"]),
    ("HTML Files", &["html", "htm"]),
    ("Images", &["jpg", "jpeg", "png", "gif", "bmp"]),
    ("Audio Files", &["mp3", "wav", "m4a"]),
];

enum UiMessage {
    Progress(ConversionProgress),
}

#[derive(Debug, Clone)]
enum UiAction {
    Browse,
    OpenRecent(PathBuf),
    ClearRecent,
    Convert,
    SaveAs,
    Copy,
    SelectAll,
    Clear,
    Find,
    FindNext,
    FindPrevious,
    ToggleTheme,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    ShowHistory,
    About,
    Exit,
}

/// Raw text of the conversion form, as typed.
#[derive(Debug, Clone)]
struct ParameterForm {
    file_path: String,
    extension: String,
    mimetype: String,
    charset: String,
    use_docintel: bool,
    docintel_endpoint: String,
    use_plugins: bool,
    keep_data_uris: bool,
}

impl Default for ParameterForm {
    fn default() -> Self {
        Self {
            file_path: String::new(),
            extension: String::new(),
            mimetype: String::new(),
            charset: String::new(),
            use_docintel: false,
            docintel_endpoint: String::new(),
            use_plugins: true,
            keep_data_uris: false,
        }
    }
}

impl ParameterForm {
    fn to_parameters(&self) -> ConversionParameters {
        let field = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        ConversionParameters {
            extension: field(&self.extension),
            mimetype: field(&self.mimetype),
            charset: field(&self.charset),
            enable_plugins: self.use_plugins,
            keep_data_uris: self.keep_data_uris,
            docintel_endpoint: if self.use_docintel { field(&self.docintel_endpoint) } else { None },
        }
    }
}

pub struct MarkItDownApp {
    app: AppContext,
    preview: MarkdownPreview,
    notification_panel: NotificationPanel,
    form: ParameterForm,
    status: String,
    progress: Option<ConversionProgress>,
    has_result: bool,
    show_about: bool,
    positioned: bool,
    pending_actions: Vec<UiAction>,
    ui_rx: Receiver<UiMessage>,
}

impl MarkItDownApp {
    pub fn new(cc: &eframe::CreationContext<'_>, mut app: AppContext, initial_file: Option<PathBuf>) -> Self {
        app.themes.initialize(&cc.egui_ctx);

        let (tx, rx): (Sender<UiMessage>, Receiver<UiMessage>) = channel();
        let repaint_ctx: egui::Context = cc.egui_ctx.clone();
        let callback: ProgressCallback = Arc::new(move |progress: &ConversionProgress| {
            let _ = tx.send(UiMessage::Progress(progress.clone()));
            repaint_ctx.request_repaint();
        });
        app.converter.set_progress_callback(callback);

        if !app.notifications.is_initialized() {
            app.notifications.initialize(DRAIN_INTERVAL);
        }
        let display_log: NotificationCallback = Arc::new(|n: &Notification| {
            tracing::debug!(id = %n.id, kind = n.kind.as_str(), source = n.source.as_deref().unwrap_or(""), "notification shown");
        });
        app.notifications.register_display_callback(display_log);

        let preview: MarkdownPreview = MarkdownPreview::new(app.preferences.zoom_level());
        let mut this = Self {
            app,
            preview,
            notification_panel: NotificationPanel::new(),
            form: ParameterForm::default(),
            status: "Ready".to_string(),
            progress: None,
            has_result: false,
            show_about: false,
            positioned: false,
            pending_actions: Vec::new(),
            ui_rx: rx,
        };
        if let Some(path) = initial_file {
            this.open_file(path);
        }
        this
    }

    fn theme(&self) -> ThemeMode {
        self.app.themes.get_current_theme()
    }

    fn is_converting(&self) -> bool {
        self.progress.as_ref().is_some_and(|p| !p.is_complete)
    }

    fn open_file(&mut self, path: PathBuf) {
        self.form.file_path = path.display().to_string();
        self.form.extension = extension_hint(&path);
        self.preview.clear();
        self.has_result = false;
        self.progress = None;
        self.app.preferences.add_recent_file(&path);
        self.status = format!("File selected: {}", display_name(&path));
        tracing::info!(path = %path.display(), "file selected");
    }

    fn browse(&mut self) {
        let mut dialog: rfd::FileDialog = rfd::FileDialog::new().set_title("Select a file to convert");
        for (name, extensions) in OPEN_FILTERS {
            dialog = dialog.add_filter(*name, *extensions);
        }
        if let Some(path) = dialog.pick_file() {
            self.open_file(path);
        }
    }

    fn open_recent(&mut self, path: PathBuf) {
        if path.is_file() {
            self.open_file(path);
        } else {
            self.app.preferences.remove_recent_file(&path);
            let message: String = format!("File not found: {}", path.display());
            self.app.notifications.add_warning(message, None, None, Some("recent_files"));
        }
    }

    fn start_conversion(&mut self) {
        if self.is_converting() {
            return;
        }
        let path: PathBuf = PathBuf::from(self.form.file_path.trim());
        let (valid, message) = self.app.converter.validate_file(&path);
        if !valid {
            self.status = message.clone();
            show_error_dialog(DialogKind::Validation, "Invalid File", &message);
            return;
        }
        let parameters: ConversionParameters = self.form.to_parameters();
        let (valid, message) = self.app.converter.validate_parameters(&parameters);
        if !valid {
            self.status = message.clone();
            show_error_dialog(DialogKind::Validation, "Invalid Parameters", &message);
            return;
        }

        self.preview.clear();
        self.has_result = false;
        match self.app.converter.convert(&path, parameters, None) {
            Ok(()) => {
                self.progress = Some(ConversionProgress::new());
                self.status = "Converting...".to_string();
            }
            Err(e) => {
                self.status = error_status(&e.to_string());
                self.app.notifications.notifier().add_from_error(&e, None, Some("conversion"));
            }
        }
    }

    fn drain_messages(&mut self) {
        while let Ok(message) = self.ui_rx.try_recv() {
            match message {
                UiMessage::Progress(progress) => self.on_progress(progress),
            }
        }
    }

    fn on_progress(&mut self, progress: ConversionProgress) {
        if progress.is_complete && progress.is_error {
            let message: String = progress.error_message.clone().unwrap_or_default();
            self.status = error_status(&message);
            show_error_dialog(DialogKind::Failure, "Conversion Error", &message);
        } else if progress.is_complete {
            match self.app.converter.get_result() {
                Some(result) => {
                    self.preview.set_content(result.markdown);
                    self.has_result = true;
                }
                None => tracing::warn!("conversion finished without a result"),
            }
            self.status = progress.status.clone();
        } else {
            self.status = progress.status.clone();
        }
        self.progress = Some(progress);
    }

    fn save_as(&mut self) {
        if !self.has_result {
            return;
        }
        let source: PathBuf = PathBuf::from(self.form.file_path.trim());
        let suggested: String = source
            .file_stem()
            .map(|s| format!("{}.md", s.to_string_lossy()))
            .unwrap_or_else(|| "output.md".to_string());
        let picked: Option<PathBuf> = rfd::FileDialog::new()
            .set_title("Save Markdown")
            .set_file_name(&suggested)
            .add_filter("Markdown", &["md"])
            .add_filter("Text", &["txt"])
            .add_filter("All Files", &["*"])
            .save_file();
        let Some(mut path) = picked else { return };
        if path.extension().is_none() {
            path.set_extension("md");
        }

        match self.preview.save_to(&path) {
            Ok(()) => {
                self.status = format!("File saved: {}", display_name(&path));
                let message: String = format!("Markdown saved to {}", path.display());
                self.app.notifications.add_success(message, None, None, Some("save"));
                tracing::info!(path = %path.display(), "markdown saved");
            }
            Err(e) => {
                let message: String = format!("Could not save {}: {e}", path.display());
                self.status = error_status(&message);
                show_error_dialog(DialogKind::Failure, "Save Error", &message);
                self.app.notifications.notifier().add_from_error(&e, Some(message), Some("save"));
            }
        }
    }

    fn persist_zoom(&mut self, level: i32) {
        self.app.preferences.set_zoom_level(level);
        self.status = format!("Zoom: {level}");
    }

    fn run_action(&mut self, ctx: &egui::Context, action: UiAction) {
        match action {
            UiAction::Browse => self.browse(),
            UiAction::OpenRecent(path) => self.open_recent(path),
            UiAction::ClearRecent => self.app.preferences.clear_recent_files(),
            UiAction::Convert => self.start_conversion(),
            UiAction::SaveAs => self.save_as(),
            UiAction::Copy => {
                if self.has_result {
                    ctx.copy_text(self.preview.content().to_string());
                    self.status = "Copied to clipboard".to_string();
                }
            }
            UiAction::SelectAll => self.preview.select_all(),
            UiAction::Clear => {
                self.preview.clear();
                self.has_result = false;
                self.status = "Ready".to_string();
            }
            UiAction::Find => self.preview.open_search(),
            UiAction::FindNext => {
                if self.preview.is_search_open() { self.preview.find_next(); } else { self.preview.open_search(); }
            }
            UiAction::FindPrevious => {
                if self.preview.is_search_open() { self.preview.find_previous(); } else { self.preview.open_search(); }
            }
            UiAction::ToggleTheme => {
                let mode: ThemeMode = self.app.themes.toggle_theme(ctx, &mut self.app.preferences);
                self.status = format!("Theme: {}", mode.as_str());
            }
            UiAction::ZoomIn => {
                let level: i32 = self.preview.zoom_in();
                self.persist_zoom(level);
            }
            UiAction::ZoomOut => {
                let level: i32 = self.preview.zoom_out();
                self.persist_zoom(level);
            }
            UiAction::ResetZoom => {
                let level: i32 = self.preview.reset_zoom();
                self.persist_zoom(level);
            }
            UiAction::ShowHistory => self.notification_panel.open_history(),
            UiAction::About => self.show_about = true,
            UiAction::Exit => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        ctx.input_mut(|i: &mut egui::InputState| {
            if i.consume_key(egui::Modifiers::CTRL, egui::Key::O) { self.pending_actions.push(UiAction::Browse); }
            if i.consume_key(egui::Modifiers::CTRL, egui::Key::S) { self.pending_actions.push(UiAction::SaveAs); }
            if i.consume_key(egui::Modifiers::CTRL, egui::Key::F) { self.pending_actions.push(UiAction::Find); }
            if i.consume_key(egui::Modifiers::SHIFT, egui::Key::F3) { self.pending_actions.push(UiAction::FindPrevious); }
            if i.consume_key(egui::Modifiers::NONE, egui::Key::F3) { self.pending_actions.push(UiAction::FindNext); }
            if i.consume_key(egui::Modifiers::CTRL, egui::Key::Equals) || i.consume_key(egui::Modifiers::CTRL, egui::Key::Plus) {
                self.pending_actions.push(UiAction::ZoomIn);
            }
            if i.consume_key(egui::Modifiers::CTRL, egui::Key::Minus) { self.pending_actions.push(UiAction::ZoomOut); }
            if i.consume_key(egui::Modifiers::CTRL, egui::Key::Num0) { self.pending_actions.push(UiAction::ResetZoom); }
        });
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        let recent: Vec<PathBuf> = self.app.preferences.recent_files().iter().map(|f| f.path.clone()).collect();
        let has_result: bool = self.has_result;
        let theme: ThemeMode = self.theme();
        let zoom: i32 = self.preview.zoom_level();
        let actions: &mut Vec<UiAction> = &mut self.pending_actions;

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui: &mut egui::Ui| {
            egui::MenuBar::new().ui(ui, |ui: &mut egui::Ui| {
                ui.menu_button("File", |ui: &mut egui::Ui| {
                    if ui.button("Open... (Ctrl+O)").clicked() {
                        actions.push(UiAction::Browse);
                        ui.close();
                    }
                    ui.menu_button("Recent Files", |ui: &mut egui::Ui| {
                        if recent.is_empty() {
                            ui.weak("No recent files");
                        }
                        for path in &recent {
                            if ui.button(display_name(path)).on_hover_text(path.display().to_string()).clicked() {
                                actions.push(UiAction::OpenRecent(path.clone()));
                                ui.close();
                            }
                        }
                        ui.separator();
                        if ui.add_enabled(!recent.is_empty(), egui::Button::new("Clear Recent Files")).clicked() {
                            actions.push(UiAction::ClearRecent);
                            ui.close();
                        }
                    });
                    ui.separator();
                    if ui.add_enabled(has_result, egui::Button::new("Save As... (Ctrl+S)")).clicked() {
                        actions.push(UiAction::SaveAs);
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Exit").clicked() {
                        actions.push(UiAction::Exit);
                        ui.close();
                    }
                });

                ui.menu_button("Edit", |ui: &mut egui::Ui| {
                    if ui.add_enabled(has_result, egui::Button::new("Copy Markdown")).clicked() {
                        actions.push(UiAction::Copy);
                        ui.close();
                    }
                    if ui.button("Select All").clicked() {
                        actions.push(UiAction::SelectAll);
                        ui.close();
                    }
                    if ui.button("Clear").clicked() {
                        actions.push(UiAction::Clear);
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Find... (Ctrl+F)").clicked() {
                        actions.push(UiAction::Find);
                        ui.close();
                    }
                });

                ui.menu_button("View", |ui: &mut egui::Ui| {
                    let theme_label: &str = match theme { ThemeMode::Light => "Dark Theme", ThemeMode::Dark => "Light Theme" };
                    if ui.button(theme_label).clicked() {
                        actions.push(UiAction::ToggleTheme);
                        ui.close();
                    }
                    ui.separator();
                    ui.label(format!("Zoom: {zoom}"));
                    if ui.button("Zoom In (Ctrl+=)").clicked() {
                        actions.push(UiAction::ZoomIn);
                        ui.close();
                    }
                    if ui.button("Zoom Out (Ctrl+-)").clicked() {
                        actions.push(UiAction::ZoomOut);
                        ui.close();
                    }
                    if ui.button("Reset Zoom (Ctrl+0)").clicked() {
                        actions.push(UiAction::ResetZoom);
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Notification History").clicked() {
                        actions.push(UiAction::ShowHistory);
                        ui.close();
                    }
                });

                ui.menu_button("Help", |ui: &mut egui::Ui| {
                    if ui.button("About").clicked() {
                        actions.push(UiAction::About);
                        ui.close();
                    }
                });
            });
        });
    }

    fn parameter_panel(&mut self, ctx: &egui::Context) {
        let theme: ThemeMode = self.theme();
        let converting: bool = self.is_converting();
        let has_result: bool = self.has_result;

        egui::TopBottomPanel::top("parameters")
            .frame(style::toolbar_frame(theme))
            .show(ctx, |ui: &mut egui::Ui| {
                ui.horizontal(|ui: &mut egui::Ui| {
                    ui.label("File:");
                    let width: f32 = ui.available_width() - 90.0;
                    ui.add(egui::TextEdit::singleline(&mut self.form.file_path).hint_text("Choose a document to convert").desired_width(width));
                    if ui.button("Browse...").clicked() { self.pending_actions.push(UiAction::Browse); }
                });
                ui.add_space(4.0);

                egui::CollapsingHeader::new("Conversion Parameters")
                    .default_open(true)
                    .show(ui, |ui: &mut egui::Ui| {
                        egui::Grid::new("parameter_grid").num_columns(3).spacing([8.0, 4.0]).show(ui, |ui: &mut egui::Ui| {
                            ui.label("File Extension:");
                            ui.add(egui::TextEdit::singleline(&mut self.form.extension).desired_width(160.0));
                            ui.weak("(e.g., .pdf, .docx)");
                            ui.end_row();

                            ui.label("MIME Type:");
                            ui.add(egui::TextEdit::singleline(&mut self.form.mimetype).desired_width(160.0));
                            ui.weak("(e.g., application/pdf)");
                            ui.end_row();

                            ui.label("Charset:");
                            ui.add(egui::TextEdit::singleline(&mut self.form.charset).desired_width(160.0));
                            ui.weak("(e.g., UTF-8)");
                            ui.end_row();
                        });

                        ui.horizontal(|ui: &mut egui::Ui| {
                            ui.checkbox(&mut self.form.use_docintel, "Use Document Intelligence");
                            ui.add_enabled(
                                self.form.use_docintel,
                                egui::TextEdit::singleline(&mut self.form.docintel_endpoint).hint_text("https://<resource>.cognitiveservices.azure.com/").desired_width(320.0),
                            );
                        });
                        ui.horizontal(|ui: &mut egui::Ui| {
                            ui.checkbox(&mut self.form.use_plugins, "Use Plugins");
                            ui.checkbox(&mut self.form.keep_data_uris, "Keep Data URIs");
                        });
                    });

                ui.add_space(4.0);
                ui.horizontal(|ui: &mut egui::Ui| {
                    if style::primary_button(ui, "Convert", !converting).clicked() { self.pending_actions.push(UiAction::Convert); }
                    if ui.add_enabled(has_result, egui::Button::new("Copy to Clipboard")).clicked() { self.pending_actions.push(UiAction::Copy); }
                    if ui.add_enabled(has_result, egui::Button::new("Save As...")).clicked() { self.pending_actions.push(UiAction::SaveAs); }
                    if converting { ui.spinner(); }
                });
            });
    }

    fn status_bar(&mut self, ctx: &egui::Context) {
        let theme: ThemeMode = self.theme();
        egui::TopBottomPanel::bottom("status_bar")
            .frame(style::status_bar_frame(theme))
            .show(ctx, |ui: &mut egui::Ui| {
                ui.horizontal(|ui: &mut egui::Ui| {
                    ui.label(&self.status);
                    if let Some(progress) = self.progress.as_ref().filter(|p| !p.is_complete) {
                        ui.add(egui::ProgressBar::new(progress.progress).desired_width(160.0).show_percentage());
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui: &mut egui::Ui| {
                        self.notification_panel.status_indicator(ui, &self.app.notifications);
                        ui.separator();
                        ui.label(self.preview.stats_text());
                    });
                });
            });
    }

    fn about_window(&mut self, ctx: &egui::Context) {
        if !self.show_about {
            return;
        }
        let mut open: bool = self.show_about;
        egui::Window::new("About MarkItDown UI")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui: &mut egui::Ui| {
                ui.label(about_text());
            });
        self.show_about = open;
    }

    fn position_window(&mut self, ctx: &egui::Context) {
        if self.positioned {
            return;
        }
        self.positioned = true;
        if self.app.preferences.window_position().is_some() {
            return;
        }
        let (w, h) = self.app.preferences.window_size();
        if let Some(screen) = ctx.input(|i: &egui::InputState| i.viewport().monitor_size) {
            let (x, y) = centered_position((screen.x, screen.y), (w as f32, h as f32));
            ctx.send_viewport_cmd(egui::ViewportCommand::OuterPosition(egui::pos2(x, y)));
        }
    }

    fn handle_close(&mut self, ctx: &egui::Context) {
        if !ctx.input(|i: &egui::InputState| i.viewport().close_requested()) {
            return;
        }
        let (inner, outer) = ctx.input(|i: &egui::InputState| (i.viewport().inner_rect, i.viewport().outer_rect));
        let size: (u32, u32) = inner
            .map(|r| (r.width().round() as u32, r.height().round() as u32))
            .unwrap_or_else(|| self.app.preferences.window_size());
        let position: Option<(i32, i32)> = outer.map(|r| (r.min.x.round() as i32, r.min.y.round() as i32));
        self.app.preferences.set_window_geometry(size, position);

        if self.app.console.is_capturing() {
            self.app.console.stop_capture();
        }
        if let Err(e) = self.app.console.flush() {
            tracing::warn!("console flush failed: {e}");
        }
        tracing::info!(?size, ?position, "window closing");
    }
}

impl eframe::App for MarkItDownApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.position_window(ctx);
        self.drain_messages();

        let now: Instant = Instant::now();
        self.app.notifications.pump(now);
        if let Some(deadline) = self.app.notifications.next_deadline() {
            ctx.request_repaint_after(deadline.saturating_duration_since(now));
        }

        self.handle_shortcuts(ctx);
        self.top_bar(ctx);
        self.parameter_panel(ctx);
        self.status_bar(ctx);

        let colors = self.app.themes.get_theme_colors();
        egui::CentralPanel::default().show(ctx, |ui: &mut egui::Ui| {
            self.preview.show(ui, colors);
        });

        let theme: ThemeMode = self.theme();
        self.notification_panel.show(ctx, &mut self.app.notifications, theme);
        self.about_window(ctx);

        for action in std::mem::take(&mut self.pending_actions) {
            self.run_action(ctx, action);
        }
        self.handle_close(ctx);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialogKind {
    /// Bad input the user can correct.
    Validation,
    Failure,
}

impl DialogKind {
    fn log_level(self) -> tracing::Level {
        match self {
            DialogKind::Validation => tracing::Level::INFO,
            DialogKind::Failure => tracing::Level::ERROR,
        }
    }
}

fn show_error_dialog(kind: DialogKind, title: &str, message: &str) {
    // Failures are already notified by the caller.
    if kind.log_level() == tracing::Level::ERROR {
        tracing::error!(title, notify = false, "{message}");
    } else {
        tracing::info!(title, "{message}");
    }
    let _ = rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(title)
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

/// Status-bar form of an error, cut to a readable length.
fn error_status(message: &str) -> String {
    if message.chars().count() > STATUS_ERROR_CHARS {
        let head: String = message.chars().take(STATUS_ERROR_CHARS).collect();
        format!("Error: {head}...")
    } else {
        format!("Error: {message}")
    }
}

fn extension_hint(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn centered_position(screen: (f32, f32), window: (f32, f32)) -> (f32, f32) {
    (((screen.0 - window.0) / 2.0).max(0.0), ((screen.1 - window.1) / 2.0).max(0.0))
}

fn about_text() -> String {
    format!(
        "{APP_TITLE} v{}\n\nA graphical interface for MarkItDown, a tool for converting\nvarious file formats to Markdown.\n\n© 2024 Microsoft Corporation\nLicensed under the MIT License",
        env!("CARGO_PKG_VERSION")
    )
}
