use eframe::egui::{Pos2, Vec2};
use image::{GrayImage, Rgba, RgbaImage};
use redactfe::EditorSession;
use redactfe::components::tools::{InputEvent, StrokeMode, ToolConfig};
use redactfe::io;
use redactfe::ops::effects::EffectKind;
use std::time::{Duration, Instant};

fn textured(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        Rgba([
            (x * 2 + 10) as u8,
            (y * 2 + 20) as u8,
            ((x + y) % 200 + 30) as u8,
            if (x + y) % 2 == 0 { 255 } else { 77 },
        ])
    })
}

fn session_with(img: RgbaImage, effect: EffectKind) -> EditorSession {
    let mut s = EditorSession::new();
    s.load_image(img).unwrap();
    s.set_tool_config(ToolConfig {
        effect,
        ..ToolConfig::default()
    });
    s
}

fn all_zero(mask: &GrayImage) -> bool {
    mask.pixels().all(|p| p.0[0] == 0)
}

#[test]
fn brush_dab_changes_output_only_inside_its_disc() {
    let source = textured(100, 100);
    let mut s = session_with(source.clone(), EffectKind::SolidFill);
    let mut config = *s.tools();
    config.set_brush_size(20.0);
    s.set_tool_config(config);

    s.begin_stroke_at(Pos2::new(50.0, 50.0), StrokeMode::Brush, false)
        .unwrap();
    assert!(s.commit_stroke().unwrap());

    let output = s.output().unwrap().clone();
    assert_ne!(output.get_pixel(50, 50), source.get_pixel(50, 50));
    for (x, y, px) in output.enumerate_pixels() {
        let d = Pos2::new(x as f32 + 0.5, y as f32 + 0.5).distance(Pos2::new(50.0, 50.0));
        if d > 11.0 {
            assert_eq!(px, source.get_pixel(x, y), "pixel ({x},{y}) at distance {d}");
        }
    }
}

#[test]
fn reversed_rectangle_corners_normalize() {
    let mut s = session_with(textured(50, 50), EffectKind::Pixelate);
    s.begin_stroke_at(Pos2::new(10.0, 10.0), StrokeMode::Rectangle, false)
        .unwrap();
    s.extend_stroke(Pos2::new(5.0, 5.0)).unwrap();
    assert!(s.commit_stroke().unwrap());

    let mask = s.mask().unwrap();
    for (x, y, p) in mask.enumerate_pixels() {
        let inside = (5..10).contains(&x) && (5..10).contains(&y);
        assert_eq!(p.0[0], if inside { 255 } else { 0 }, "pixel ({x},{y})");
    }
}

#[test]
fn zoom_in_and_back_out_restores_view() {
    let mut s = session_with(textured(100, 100), EffectKind::Blur);
    assert_eq!(s.view().scale, 1.0);
    s.zoom_at_point(Pos2::new(50.0, 50.0), 2.0);
    s.zoom_at_point(Pos2::new(50.0, 50.0), 0.5);
    assert!((s.view().scale - 1.0).abs() < 1e-5);
    assert!(s.view().offset.length() < 1e-4);
}

#[test]
fn flood_erase_clears_fully_redacted_mask() {
    let mut s = session_with(textured(100, 100), EffectKind::SolidFill);
    s.flood_fill_at(Pos2::new(30.0, 70.0), false).unwrap();
    assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 255));

    let filled = s.flood_fill_at(Pos2::ZERO, true).unwrap();
    assert_eq!(filled, 100 * 100);
    assert!(all_zero(s.mask().unwrap()));
}

#[test]
fn undo_after_single_stroke_restores_blank_mask() {
    let mut s = session_with(textured(64, 64), EffectKind::Pixelate);
    s.begin_stroke_at(Pos2::new(10.0, 10.0), StrokeMode::Brush, false)
        .unwrap();
    s.extend_stroke(Pos2::new(50.0, 40.0)).unwrap();
    s.commit_stroke().unwrap();
    assert!(!all_zero(s.mask().unwrap()));

    assert!(s.undo().unwrap());
    assert!(all_zero(s.mask().unwrap()));
    assert!(!s.undo().unwrap());

    assert!(s.redo().unwrap());
    assert!(!all_zero(s.mask().unwrap()));
}

#[test]
fn export_scrubs_alpha_lsb_only_when_enabled() {
    let mut s = session_with(textured(40, 30), EffectKind::Pixelate);
    s.begin_stroke_at(Pos2::new(20.0, 15.0), StrokeMode::Brush, false)
        .unwrap();
    s.commit_stroke().unwrap();

    let stripped = s.export_image().unwrap();
    assert!(stripped.pixels().all(|p| p.0[3] & 1 == 0));
    let decoded = io::decode_image(&s.export_png().unwrap()).unwrap();
    assert!(decoded.pixels().all(|p| p.0[3] & 1 == 0));

    let mut config = *s.tools();
    config.strip_metadata = false;
    s.set_tool_config(config);
    let composited = s.output().unwrap().clone();
    let raw = s.export_image().unwrap();
    assert_eq!(raw, composited);
    assert!(raw.pixels().any(|p| p.0[3] & 1 == 1));
    assert_eq!(raw.dimensions(), stripped.dimensions());
}

#[test]
fn export_writes_png_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("redacted.png");
    let mut s = session_with(textured(25, 25), EffectKind::SolidFill);
    s.flood_fill_at(Pos2::ZERO, false).unwrap();
    s.export_to_path(&path).unwrap();

    let written = io::open_image(&path).unwrap();
    assert_eq!(written, s.export_image().unwrap());
    assert!(written.pixels().all(|p| p.0 == [0, 0, 0, 254]));
}

#[test]
fn history_is_bounded_to_thirty_gestures() {
    let mut s = session_with(textured(20, 20), EffectKind::SolidFill);
    for i in 0..35 {
        s.flood_fill_at(Pos2::ZERO, i % 2 == 1).unwrap();
    }
    assert_eq!(s.document().unwrap().history().undo_count(), 30);
    for _ in 0..30 {
        assert!(s.undo().unwrap());
    }
    assert!(!s.undo().unwrap());
    // oldest kept snapshot is the mask right after fill #4, a paint
    assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 255));
}

#[test]
fn second_finger_aborts_touch_stroke() {
    let mut s = session_with(textured(100, 100), EffectKind::Pixelate);
    let now = Instant::now();
    s.handle_input(
        &InputEvent::TouchStart {
            id: 1,
            pos: Pos2::new(20.0, 20.0),
        },
        now,
    )
    .unwrap();
    s.handle_input(
        &InputEvent::TouchMove {
            id: 1,
            pos: Pos2::new(60.0, 20.0),
        },
        now,
    )
    .unwrap();
    assert!(s.document().unwrap().is_stroking());

    s.handle_input(
        &InputEvent::TouchStart {
            id: 2,
            pos: Pos2::new(80.0, 80.0),
        },
        now,
    )
    .unwrap();
    let doc = s.document().unwrap();
    assert!(!doc.is_stroking());
    assert!(all_zero(doc.mask()));
    assert!(!doc.history().can_undo());

    // spreading the fingers zooms in about their midpoint
    s.handle_input(
        &InputEvent::TouchMove {
            id: 2,
            pos: Pos2::new(140.0, 140.0),
        },
        now,
    )
    .unwrap();
    assert!(s.view().scale > 1.0);
    s.handle_input(&InputEvent::TouchEnd { id: 2 }, now).unwrap();
    s.handle_input(&InputEvent::TouchEnd { id: 1 }, now).unwrap();
    assert!(s.gestures().is_idle());
    assert!(all_zero(s.mask().unwrap()));
}

#[test]
fn long_press_erases_region_under_finger() {
    let mut s = session_with(textured(60, 60), EffectKind::SolidFill);
    s.flood_fill_at(Pos2::ZERO, false).unwrap();
    let now = Instant::now();
    s.handle_input(
        &InputEvent::TouchStart {
            id: 3,
            pos: Pos2::new(30.0, 30.0),
        },
        now,
    )
    .unwrap();
    s.tick(now + Duration::from_millis(300)).unwrap();
    assert!(s.document().unwrap().is_stroking());

    s.tick(now + Duration::from_millis(1000)).unwrap();
    assert!(all_zero(s.mask().unwrap()));
    s.handle_input(&InputEvent::TouchEnd { id: 3 }, now).unwrap();

    // one undo brings the redacted area back
    assert!(s.undo().unwrap());
    assert!(s.mask().unwrap().pixels().all(|p| p.0[0] == 255));
}

#[test]
fn wheel_zoom_keeps_image_point_under_cursor() {
    let mut s = EditorSession::new();
    s.set_viewport(Vec2::new(400.0, 300.0));
    s.load_image(textured(200, 100)).unwrap();
    let cursor = Pos2::new(123.0, 77.0);
    let before = s.view().to_world(cursor);
    s.handle_input(
        &InputEvent::Wheel {
            pos: cursor,
            zoom_in: true,
        },
        Instant::now(),
    )
    .unwrap();
    let after = s.view().to_world(cursor);
    assert!((before - after).length() < 1e-3);
}

#[test]
fn reload_resets_mask_and_history() {
    let mut s = session_with(textured(30, 30), EffectKind::Blur);
    s.flood_fill_at(Pos2::ZERO, false).unwrap();
    s.load_image(textured(10, 12)).unwrap();
    assert_eq!(s.image_size(), Some([10, 12]));
    assert!(all_zero(s.mask().unwrap()));
    assert!(!s.can_undo());
}
