//! Shell overlay panels
//!
//! The prompt panel drives the config generator; the camera panel shows the
//! mirrored camera feed with the tracker's view of the hand.

use egui::{Align2, Color32, RichText};

use crate::appearance::AppearanceConfig;
use crate::state::{HandSample, TrackerStatus};

/// One-click prompts offered under the text field
pub const QUICK_PROMPTS: [&str; 4] = ["Fire", "Ocean", "Galaxy", "Forest"];

/// Displayed width of the camera preview in points
const PREVIEW_WIDTH: f32 = 240.0;
const ERROR_COLOR: Color32 = Color32::from_rgb(255, 110, 110);

/// Something the user asked the shell to do
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Generate(String),
    Reset,
}

/// Read-only data the panels display this frame
pub struct UiSnapshot<'a> {
    pub hand: HandSample,
    pub tracker_status: &'a TrackerStatus,
    pub appearance: &'a AppearanceConfig,
    pub loading: bool,
    /// Camera texture and its pixel size, once the first frame arrived
    pub camera_texture: Option<(egui::TextureId, [u32; 2])>,
    pub fps: f64,
}

/// Panel state that survives between frames
#[derive(Debug)]
pub struct ShellUi {
    prompt: String,
    panel_open: bool,
    error: Option<String>,
}

impl Default for ShellUi {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            panel_open: true,
            error: None,
        }
    }
}

impl ShellUi {
    pub fn toggle_panel(&mut self) {
        self.panel_open = !self.panel_open;
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Build both panels and return what the user asked for
    pub fn show(&mut self, ctx: &egui::Context, snapshot: &UiSnapshot<'_>) -> Vec<UiAction> {
        let mut actions = Vec::new();
        self.prompt_panel(ctx, snapshot, &mut actions);
        camera_panel(ctx, snapshot);
        actions
    }

    fn prompt_panel(&mut self, ctx: &egui::Context, snapshot: &UiSnapshot<'_>, actions: &mut Vec<UiAction>) {
        let loading = snapshot.loading;

        egui::SidePanel::left("prompt_panel")
            .resizable(false)
            .default_width(260.0)
            .show_animated(ctx, self.panel_open, |ui| {
                ui.heading("Gesture Cloud");
                ui.label("Describe a theme and the cloud will take on its colors and motion.");
                ui.add_space(8.0);

                let response = ui.add_enabled(
                    !loading,
                    egui::TextEdit::singleline(&mut self.prompt)
                        .hint_text("e.g. Cyberpunk Rain")
                        .desired_width(f32::INFINITY),
                );
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                ui.horizontal_wrapped(|ui| {
                    for label in QUICK_PROMPTS {
                        if ui.add_enabled(!loading, egui::Button::new(label).small()).clicked() {
                            self.prompt = label.to_string();
                            self.request(actions);
                        }
                    }
                });

                ui.add_space(4.0);
                ui.horizontal(|ui| {
                    let can_generate = !loading && !self.prompt.trim().is_empty();
                    if ui.add_enabled(can_generate, egui::Button::new("Generate")).clicked()
                        || (submitted && can_generate)
                    {
                        self.request(actions);
                    }
                    if ui.add_enabled(!loading, egui::Button::new("Reset")).clicked() {
                        self.error = None;
                        actions.push(UiAction::Reset);
                    }
                    if loading {
                        ui.spinner();
                        ui.label("Generating...");
                    }
                });

                let mut dismiss = false;
                if let Some(message) = &self.error {
                    ui.add_space(4.0);
                    ui.horizontal(|ui| {
                        ui.colored_label(ERROR_COLOR, message);
                        dismiss = ui.small_button("x").clicked();
                    });
                }
                if dismiss {
                    self.error = None;
                }

                ui.separator();
                appearance_summary(ui, snapshot.appearance);
                ui.add_space(8.0);
                ui.label(RichText::new("Tab hides this panel, F11 fullscreen, Esc quits").small().weak());
            });
    }

    fn request(&mut self, actions: &mut Vec<UiAction>) {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return;
        }
        self.error = None;
        actions.push(UiAction::Generate(prompt.to_string()));
    }
}

fn appearance_summary(ui: &mut egui::Ui, appearance: &AppearanceConfig) {
    ui.horizontal(|ui| {
        ui.label("Colors");
        ui.label(RichText::new("\u{25CF}").color(appearance.color1.to_color32()));
        ui.monospace(appearance.color1.to_string());
        ui.label(RichText::new("\u{25CF}").color(appearance.color2.to_color32()));
        ui.monospace(appearance.color2.to_string());
    });
    egui::Grid::new("appearance_grid").num_columns(2).show(ui, |ui| {
        ui.label("Size");
        ui.label(format!("{:.2}", appearance.particle_size));
        ui.end_row();
        ui.label("Speed");
        ui.label(format!("{:.2}", appearance.speed));
        ui.end_row();
        ui.label("Noise");
        ui.label(format!("{:.2}", appearance.noise_scale));
        ui.end_row();
        ui.label("Radius");
        ui.label(format!("{:.2}", appearance.interaction_radius));
        ui.end_row();
        ui.label("Particles");
        ui.label(appearance.particle_count.to_string());
        ui.end_row();
    });
}

/// Label for the gesture line under the preview
pub fn gesture_text(hand: &HandSample) -> String {
    match hand.gesture {
        Some(gesture) if hand.detected => format!("Gesture: {}", gesture.label()),
        _ => "No hand".to_string(),
    }
}

fn camera_panel(ctx: &egui::Context, snapshot: &UiSnapshot<'_>) {
    egui::Window::new("camera_panel")
        .title_bar(false)
        .resizable(false)
        .collapsible(false)
        .anchor(Align2::RIGHT_BOTTOM, [-12.0, -12.0])
        .show(ctx, |ui| {
            match snapshot.camera_texture {
                Some((texture_id, [width, height])) => {
                    let aspect = height.max(1) as f32 / width.max(1) as f32;
                    let size = egui::vec2(PREVIEW_WIDTH, PREVIEW_WIDTH * aspect);
                    // Mirror horizontally so the preview moves like a mirror
                    let uv = egui::Rect::from_min_max(egui::pos2(1.0, 0.0), egui::pos2(0.0, 1.0));
                    ui.add(egui::Image::new((texture_id, size)).uv(uv));
                }
                None => {
                    ui.allocate_ui(egui::vec2(PREVIEW_WIDTH, PREVIEW_WIDTH * 0.75), |ui| {
                        ui.centered_and_justified(|ui| {
                            ui.label("Starting camera...");
                        });
                    });
                }
            }

            ui.horizontal(|ui| {
                ui.label(gesture_text(&snapshot.hand));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(RichText::new(format!("{:.0} fps", snapshot.fps)).small().weak());
                });
            });

            if let TrackerStatus::Failed(message) = snapshot.tracker_status {
                ui.colored_label(ERROR_COLOR, message);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Gesture;
    use glam::Vec3;

    fn run(ui_state: &mut ShellUi, status: &TrackerStatus, loading: bool) -> Vec<UiAction> {
        let ctx = egui::Context::default();
        let appearance = AppearanceConfig::default();
        let snapshot = UiSnapshot {
            hand: HandSample::NONE,
            tracker_status: status,
            appearance: &appearance,
            loading,
            camera_texture: None,
            fps: 60.0,
        };
        let mut actions = Vec::new();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            actions = ui_state.show(ctx, &snapshot);
        });
        actions
    }

    #[test]
    fn test_gesture_text() {
        assert_eq!(gesture_text(&HandSample::NONE), "No hand");
        assert_eq!(
            gesture_text(&HandSample::detected(Vec3::ZERO, Gesture::Closed)),
            "Gesture: CLOSED"
        );
    }

    #[test]
    fn test_panels_build_without_input() {
        let mut ui_state = ShellUi::default();
        let failed = TrackerStatus::Failed("camera unavailable".to_string());
        assert!(run(&mut ui_state, &failed, false).is_empty());
        assert!(run(&mut ui_state, &TrackerStatus::Running, true).is_empty());
    }

    #[test]
    fn test_request_trims_and_clears_error() {
        let mut ui_state = ShellUi::default();
        ui_state.set_error("Failed to generate configuration.");
        ui_state.prompt = "  Northern Lights ".to_string();

        let mut actions = Vec::new();
        ui_state.request(&mut actions);
        assert_eq!(actions, vec![UiAction::Generate("Northern Lights".to_string())]);
        assert!(ui_state.error().is_none());
    }

    #[test]
    fn test_blank_prompt_not_requested() {
        let mut ui_state = ShellUi::default();
        ui_state.prompt = "   ".to_string();
        let mut actions = Vec::new();
        ui_state.request(&mut actions);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_toggle_panel() {
        let mut ui_state = ShellUi::default();
        assert!(ui_state.is_panel_open());
        ui_state.toggle_panel();
        assert!(!ui_state.is_panel_open());
        assert!(run(&mut ui_state, &TrackerStatus::Starting, false).is_empty());
    }
}
