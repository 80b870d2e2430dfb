//! UI panels for the application
//!
//! Panels only read the controller; everything the user does is returned as a
//! [`UiAction`] and applied by the app after drawing.

use egui::{Color32, RichText, Ui};
use instant::Instant;
use taxi_track_lib::{Mode, ModeController, SPEED_MAX, SPEED_MIN, Selection, speed_multiplier};

/// A user request collected while drawing
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Select(Selection),
    Start,
    Stop,
    Reset,
    SetSpeed(u32),
    DismissNotification,
    /// Allow (`true`) or refuse the use of the device position
    AnswerLocationPrompt(bool),
}

/// Selector entries: live first, then every known period
fn selector_options(controller: &ModeController) -> Vec<Selection> {
    let mut options = vec![Selection::Live];
    options.extend(
        controller
            .periods()
            .iter()
            .cloned()
            .map(Selection::Historical),
    );
    // The active period stays selectable even when the listing failed
    if !options.contains(controller.selection()) {
        options.push(controller.selection().clone());
    }
    options
}

/// Render the controls panel on the right
pub fn control_panel(
    ctx: &egui::Context,
    controller: &ModeController,
    actions: &mut Vec<UiAction>,
) {
    egui::SidePanel::right("controls")
        .default_width(260.0)
        .min_width(220.0)
        .resizable(true)
        .show(ctx, |ui| {
            ui.heading("🚕 Taxi Track");
            ui.add_space(8.0);

            mode_selector(ui, controller, actions);
            ui.separator();

            match controller.mode() {
                Mode::Historical => playback_controls(ui, controller, actions),
                Mode::Live => live_status(ui, controller),
            }
        });
}

fn mode_selector(ui: &mut Ui, controller: &ModeController, actions: &mut Vec<UiAction>) {
    let current = controller.selection().clone();
    let mut choice = current.clone();

    egui::ComboBox::from_label("View")
        .selected_text(current.label())
        .show_ui(ui, |ui| {
            for option in selector_options(controller) {
                let label = option.label();
                ui.selectable_value(&mut choice, option, label);
            }
        });

    if choice != current {
        actions.push(UiAction::Select(choice));
    }
}

fn playback_controls(ui: &mut Ui, controller: &ModeController, actions: &mut Vec<UiAction>) {
    let animation = controller.animation();

    let mut speed = controller.speed_value();
    ui.horizontal(|ui| {
        ui.label("Speed");
        let slider = egui::Slider::new(&mut speed, SPEED_MIN..=SPEED_MAX).show_value(false);
        let response = ui.add(slider);
        ui.label(format!("{:.1}x", speed_multiplier(speed)));
        if response.changed() {
            actions.push(UiAction::SetSpeed(speed));
        }
    });

    ui.add_space(4.0);
    ui.horizontal(|ui| {
        if ui
            .add_enabled(!animation.running, egui::Button::new("▶ Start"))
            .clicked()
        {
            actions.push(UiAction::Start);
        }
        if ui
            .add_enabled(animation.running, egui::Button::new("⏸ Stop"))
            .clicked()
        {
            actions.push(UiAction::Stop);
        }
        if ui.button("⟲ Reset").clicked() {
            actions.push(UiAction::Reset);
        }
    });

    ui.add_space(8.0);
    if controller.is_loading() {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label("Loading route...");
        });
    } else if let Some(len) = controller.path_len() {
        let shown = animation.current_index + 1;
        ui.label(format!("Point {shown} of {len}"));
        ui.add(egui::ProgressBar::new(shown as f32 / len.max(1) as f32));
        ui.label(format!(
            "Distance: {:.2} km",
            animation.cumulative_distance_km
        ));
    }
    ui.label(
        RichText::new("Click the taxi for details")
            .small()
            .color(ui.visuals().weak_text_color()),
    );
}

fn live_status(ui: &mut Ui, controller: &ModeController) {
    if controller.awaiting_location_consent() {
        ui.label("Waiting for location access...");
        return;
    }
    match controller.live_fix() {
        Some(fix) => {
            ui.label(format!("Position: {}", fix.point.format_short()));
            ui.label(format!("Accuracy: ±{:.0} m", fix.accuracy_m));
        }
        None => {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Waiting for position...");
            });
        }
    }
}

/// Ask whether the device position may be used, while live mode waits for an answer
pub fn location_prompt(
    ctx: &egui::Context,
    controller: &ModeController,
    actions: &mut Vec<UiAction>,
) {
    if !controller.awaiting_location_consent() {
        return;
    }

    egui::Window::new("Location access")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            ui.label("Allow Taxi Track Viewer to use your location for live tracking?");
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.button("Allow").clicked() {
                    actions.push(UiAction::AnswerLocationPrompt(true));
                }
                if ui.button("Don't allow").clicked() {
                    actions.push(UiAction::AnswerLocationPrompt(false));
                }
            });
        });
}

/// Show the current notification at the top of the window
pub fn notification_toast(
    ctx: &egui::Context,
    controller: &ModeController,
    now: Instant,
    actions: &mut Vec<UiAction>,
) {
    let Some(notification) = controller.notification() else {
        return;
    };
    let remaining = 1.0 - notification.progress(now, controller.notification_duration());

    egui::Area::new(egui::Id::new("notification_toast"))
        .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 12.0))
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style())
                .fill(Color32::from_rgb(200, 60, 50))
                .show(ui, |ui| {
                    ui.set_max_width(420.0);
                    ui.horizontal(|ui| {
                        ui.label(RichText::new(&notification.message).color(Color32::WHITE));
                        if ui.small_button("✕").clicked() {
                            actions.push(UiAction::DismissNotification);
                        }
                    });
                    ui.add(egui::ProgressBar::new(remaining).desired_height(3.0));
                });
        });
}

/// Tile attribution along the bottom of the map
pub fn attribution(ui: &Ui) {
    let rect = ui.max_rect();
    ui.painter().text(
        rect.center_bottom() + egui::vec2(0.0, -5.0),
        egui::Align2::CENTER_BOTTOM,
        "© OpenStreetMap contributors",
        egui::FontId::proportional(10.0),
        Color32::from_black_alpha(180),
    );
}
