use eframe::egui;
use egui::{Color32, Pos2, Rect, Stroke, TextureOptions, Vec2};
use redactfe::EditorSession;
use redactfe::components::tools::{
    InputEvent, MAX_BRUSH_SIZE, MIN_BRUSH_SIZE, PointerButton, Tool,
};
use redactfe::io;
use redactfe::logger;
use redactfe::ops::effects::{
    EffectKind, MAX_BLUR_RADIUS, MAX_PIXEL_STRENGTH, MIN_PIXEL_STRENGTH,
};
use redactfe::ops::mask::BrushShape;
use redactfe::log_err;
use std::time::Instant;

const PREVIEW_OUTLINE: Color32 = Color32::from_rgb(242, 107, 58);

/// Thin egui shell around [`EditorSession`]: toolbar, status line, and a
/// canvas that forwards raw input to the session's gesture machine.
pub struct RedactApp {
    session: EditorSession,
    texture: Option<egui::TextureHandle>,
    /// Session revision the texture was built from.
    uploaded_revision: Option<u64>,
    show_output: bool,
    status: String,
}

impl RedactApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self {
            session: EditorSession::new(),
            texture: None,
            uploaded_revision: None,
            show_output: false,
            status: "Open or paste an image to start".to_string(),
        }
    }

    fn report<T>(&mut self, what: &str, result: Result<T, redactfe::RedactError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                log_err!("{}: {}", what, e);
                self.status = e.to_string();
                None
            }
        }
    }

    fn open_file(&mut self) {
        let Some(path) = io::pick_image_file() else {
            return;
        };
        let result = self.session.load_from_path(&path);
        if self.report("open", result).is_some() {
            self.loaded(&logger::display_path(&path));
        }
    }

    fn paste(&mut self) {
        let result = io::read_clipboard_image().and_then(|img| self.session.load_image(img));
        if self.report("paste", result).is_some() {
            self.loaded("clipboard");
        }
    }

    fn loaded(&mut self, origin: &str) {
        self.session.fit_to_view();
        self.uploaded_revision = None;
        if let Some([w, h]) = self.session.image_size() {
            self.status = format!("Loaded {}x{} from {}", w, h, origin);
        }
    }

    fn export(&mut self) {
        if !self.session.has_image() {
            self.status = redactfe::RedactError::NoImage.to_string();
            return;
        }
        let Some(path) = io::pick_save_path() else {
            return;
        };
        let result = self.session.export_to_path(&path);
        if self.report("export", result).is_some() {
            self.status = format!("Exported {}", logger::display_path(&path));
        }
    }

    fn undo(&mut self) {
        let result = self.session.undo();
        if let Some(changed) = self.report("undo", result) {
            self.status = if changed { "Undone" } else { "Nothing to undo" }.to_string();
        }
    }

    fn redo(&mut self) {
        let result = self.session.redo();
        if let Some(changed) = self.report("redo", result) {
            self.status = if changed { "Redone" } else { "Nothing to redo" }.to_string();
        }
    }

    /// Tooltips naming the gesture undo/redo would act on.
    fn history_hints(&self) -> (String, String) {
        let history = self.session.document().map(|d| d.history());
        let undo = history.and_then(|h| h.undo_description());
        let redo = history.and_then(|h| h.redo_description());
        (
            undo.map_or_else(|| "Nothing to undo".to_string(), |d| format!("Undo {d} (Ctrl+Z)")),
            redo.map_or_else(|| "Nothing to redo".to_string(), |d| format!("Redo {d} (Ctrl+Y)")),
        )
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let (undo, redo, paste) = ctx.input(|i| {
            let cmd = i.modifiers.command;
            let undo = cmd && !i.modifiers.shift && i.key_pressed(egui::Key::Z);
            let redo = cmd
                && (i.key_pressed(egui::Key::Y)
                    || (i.modifiers.shift && i.key_pressed(egui::Key::Z)));
            // egui only reports Ctrl+V as a text paste; the image itself is
            // read from the OS clipboard.
            let paste = (cmd && i.key_pressed(egui::Key::V))
                || i.events.iter().any(|e| matches!(e, egui::Event::Paste(_)));
            (undo, redo, paste)
        });
        if undo {
            self.undo();
        }
        if redo {
            self.redo();
        }
        if paste {
            self.paste();
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            if ui.button("Open…").clicked() {
                self.open_file();
            }
            if ui.button("Paste").clicked() {
                self.paste();
            }
            let has_image = self.session.has_image();
            if ui.add_enabled(has_image, egui::Button::new("Export PNG…")).clicked() {
                self.export();
            }
            ui.separator();
            let (undo_hint, redo_hint) = self.history_hints();
            if ui
                .add_enabled(self.session.can_undo(), egui::Button::new("Undo"))
                .on_hover_text(undo_hint)
                .clicked()
            {
                self.undo();
            }
            if ui
                .add_enabled(self.session.can_redo(), egui::Button::new("Redo"))
                .on_hover_text(redo_hint)
                .clicked()
            {
                self.redo();
            }
            ui.separator();
            if ui.add_enabled(has_image, egui::Button::new("−")).clicked() {
                self.session.zoom_out();
            }
            ui.label(format!("{:.0}%", self.session.view().scale * 100.0));
            if ui.add_enabled(has_image, egui::Button::new("+")).clicked() {
                self.session.zoom_in();
            }
            if ui.add_enabled(has_image, egui::Button::new("Fit")).clicked() {
                self.session.fit_to_view();
            }
            if ui
                .add_enabled(has_image, egui::Button::new("Center rect"))
                .clicked()
            {
                let result = self.session.add_center_rect();
                self.report("center rect", result);
            }
        });

        let mut config = *self.session.tools();
        ui.horizontal_wrapped(|ui| {
            for tool in Tool::all() {
                ui.selectable_value(&mut config.tool, *tool, tool.label());
            }
            ui.separator();
            for shape in BrushShape::all() {
                ui.selectable_value(&mut config.shape, *shape, shape.label());
            }
            ui.add(
                egui::Slider::new(&mut config.brush_size, MIN_BRUSH_SIZE..=MAX_BRUSH_SIZE)
                    .text("Size"),
            );
            ui.separator();
            egui::ComboBox::from_id_source("effect_kind")
                .selected_text(config.effect.label())
                .show_ui(ui, |ui| {
                    for kind in EffectKind::all() {
                        ui.selectable_value(&mut config.effect, *kind, kind.label());
                    }
                });
            match config.effect {
                EffectKind::Pixelate => {
                    ui.add(
                        egui::Slider::new(
                            &mut config.pixel_strength,
                            MIN_PIXEL_STRENGTH..=MAX_PIXEL_STRENGTH,
                        )
                        .text("Strength"),
                    );
                }
                EffectKind::Blur => {
                    ui.add(
                        egui::Slider::new(&mut config.blur_radius, 0.0..=MAX_BLUR_RADIUS)
                            .text("Radius"),
                    );
                }
                EffectKind::SolidFill => {}
            }
            ui.separator();
            ui.checkbox(&mut config.strip_metadata, "Strip metadata");
            if ui.checkbox(&mut self.show_output, "Preview output").changed() {
                self.uploaded_revision = None;
            }
        });
        self.session.set_tool_config(config);
    }

    /// Translate this frame's raw egui input into session events.
    fn forward_input(&mut self, ctx: &egui::Context, canvas: Rect, hovered: bool) {
        let (events, scroll_y, hover_pos) =
            ctx.input(|i| (i.events.clone(), i.scroll_delta.y, i.pointer.hover_pos()));
        let now = Instant::now();
        let origin = canvas.min.to_vec2();
        let local = |p: Pos2| p - origin;
        // egui mirrors the first touch as mouse events; drop those while fingers are down.
        let touch_frame = events.iter().any(|e| matches!(e, egui::Event::Touch { .. }))
            || self.session.gestures().active_touches() > 0;

        let mut translated = Vec::new();
        for event in &events {
            match event {
                egui::Event::PointerButton {
                    pos,
                    button,
                    pressed,
                    modifiers,
                } if !touch_frame => {
                    let button = match button {
                        egui::PointerButton::Primary => PointerButton::Primary,
                        egui::PointerButton::Secondary => PointerButton::Secondary,
                        egui::PointerButton::Middle => PointerButton::Middle,
                        _ => continue,
                    };
                    if *pressed {
                        if hovered && canvas.contains(*pos) {
                            translated.push(InputEvent::PointerDown {
                                pos: local(*pos),
                                button,
                                pan_modifier: modifiers.ctrl,
                            });
                        }
                    } else {
                        translated.push(InputEvent::PointerUp { pos: local(*pos) });
                    }
                }
                egui::Event::PointerMoved(pos) if !touch_frame => {
                    translated.push(InputEvent::PointerMove { pos: local(*pos) });
                }
                egui::Event::PointerGone if !touch_frame => {
                    translated.push(InputEvent::PointerLeave);
                }
                egui::Event::Touch { id, phase, pos, .. } => {
                    let id = id.0;
                    translated.push(match phase {
                        egui::TouchPhase::Start => {
                            if !canvas.contains(*pos) {
                                continue;
                            }
                            InputEvent::TouchStart {
                                id,
                                pos: local(*pos),
                            }
                        }
                        egui::TouchPhase::Move => InputEvent::TouchMove {
                            id,
                            pos: local(*pos),
                        },
                        egui::TouchPhase::End => InputEvent::TouchEnd { id },
                        egui::TouchPhase::Cancel => InputEvent::TouchCancel { id },
                    });
                }
                _ => {}
            }
        }

        if hovered && scroll_y.abs() > 0.1
            && let Some(pos) = hover_pos.filter(|p| canvas.contains(*p))
        {
            translated.push(InputEvent::Wheel {
                pos: local(pos),
                zoom_in: scroll_y > 0.0,
            });
        }

        for event in translated {
            let result = self.session.handle_input(&event, now);
            self.report("input", result);
        }
        let result = self.session.tick(now);
        self.report("long press", result);
    }

    fn refresh_texture(&mut self, ctx: &egui::Context) {
        let revision = self.session.revision();
        if self.uploaded_revision == Some(revision) && self.texture.is_some() {
            return;
        }
        let frame = if self.show_output {
            self.session.output().cloned()
        } else {
            self.session.editing_view()
        };
        let Some(frame) = frame else {
            self.texture = None;
            return;
        };
        let size = [frame.width() as usize, frame.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, frame.as_raw());
        match &mut self.texture {
            Some(handle) => handle.set(color_image, TextureOptions::NEAREST),
            None => {
                self.texture =
                    Some(ctx.load_texture("canvas", color_image, TextureOptions::NEAREST));
            }
        }
        self.uploaded_revision = Some(revision);
    }

    fn paint_canvas(&self, painter: &egui::Painter, canvas: Rect) {
        let origin = canvas.min.to_vec2();
        if let (Some(texture), Some(size)) = (&self.texture, self.session.image_size()) {
            let rect = self.session.view().image_rect(size).translate(origin);
            painter.image(
                texture.id(),
                rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        } else {
            painter.text(
                canvas.center(),
                egui::Align2::CENTER_CENTER,
                "Open (Ctrl+O) or paste (Ctrl+V) an image",
                egui::FontId::proportional(18.0),
                Color32::GRAY,
            );
        }

        if let Some(preview) = self.session.rect_preview() {
            let r = preview.translate(origin);
            let points = [
                r.left_top(),
                r.right_top(),
                r.right_bottom(),
                r.left_bottom(),
                r.left_top(),
            ];
            painter.extend(egui::Shape::dashed_line(
                &points,
                Stroke::new(1.5, PREVIEW_OUTLINE),
                6.0,
                4.0,
            ));
        }
    }
}

impl eframe::App for RedactApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_shortcuts(ctx);
        if ctx.input(|i| i.modifiers.command && i.key_pressed(egui::Key::O)) {
            self.open_file();
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let status = ui.label(&self.status);
                if let Some(path) = logger::log_path() {
                    status.on_hover_text(format!("Session log: {}", logger::display_path(path)));
                }
                if let Some([w, h]) = self.session.image_size() {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let (undo, redo) = self
                            .session
                            .document()
                            .map(|d| (d.history().undo_count(), d.history().redo_count()))
                            .unwrap_or((0, 0));
                        ui.label(format!("{}x{}  •  {} undo / {} redo", w, h, undo, redo));
                    });
                }
            });
        });

        egui::CentralPanel::default()
            .frame(egui::Frame {
                fill: Color32::from_gray(32),
                ..Default::default()
            })
            .show(ctx, |ui| {
                let (response, painter) =
                    ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
                let canvas = response.rect;
                let first_viewport = self.session.viewport() == Vec2::ZERO;
                self.session.set_viewport(canvas.size());
                if first_viewport && self.session.has_image() {
                    self.session.fit_to_view();
                }

                let hovered = response.hovered() || self.session.gestures().has_capture();
                self.forward_input(ctx, canvas, hovered);
                self.refresh_texture(ctx);
                self.paint_canvas(&painter, canvas);
            });

        if self.session.take_redraw() {
            ctx.request_repaint();
        }
        if let Some(deadline) = self.session.next_deadline() {
            ctx.request_repaint_after(deadline.saturating_duration_since(Instant::now()));
        }
    }
}
