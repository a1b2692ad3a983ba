#![windows_subsystem = "windows"]

mod app;

use app::RedactApp;
use eframe::egui;
use redactfe::logger;

fn main() -> Result<(), eframe::Error> {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([480.0, 320.0])
            .with_title("RedactFE"),
        ..Default::default()
    };

    eframe::run_native(
        "RedactFE",
        options,
        Box::new(|cc| Box::new(RedactApp::new(cc))),
    )
}
