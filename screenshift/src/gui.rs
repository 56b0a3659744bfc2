/*!
GUI implementation for the screenshift application.
*/

use crate::config::AppConfig;
use crate::offset::{LinkStatus, LoopCounters, OffsetReader, StatusReader};
use crate::pointer::{PointerFeed, SharedPointer, SystemPointer};
use crate::session::{SessionOptions, SessionPointer, ShiftSession};
use eframe::egui;
use shared::Point;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

/// Handles into a session running on its own thread
struct RunningSession {
    thread: thread::JoinHandle<()>,
    running_flag: Arc<AtomicBool>,
    offset: OffsetReader,
    status: StatusReader,
    counters: Arc<LoopCounters>,
    /// Present when the pointer pad stands in for the system pointer
    pointer_feed: Option<PointerFeed>,
}

/// Main GUI application state
pub struct ScreenshiftGui {
    config: AppConfig,
    config_path: PathBuf,

    session: Option<RunningSession>,
    debug_mode: bool,

    // Status
    status_message: String,
    last_status: LinkStatus,

    // Temporary UI values
    temp_port: String,
    temp_baud: String,
}

impl ScreenshiftGui {
    /// Create a new GUI instance
    pub fn new(config: AppConfig, config_path: PathBuf, cc: &eframe::CreationContext<'_>) -> Self {
        if config.gui.dark_mode {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
        } else {
            cc.egui_ctx.set_visuals(egui::Visuals::light());
        }

        Self {
            temp_port: config.link.port_path.clone().unwrap_or_default(),
            temp_baud: config.link.baud_rate.to_string(),
            config,
            config_path,
            session: None,
            debug_mode: false,
            status_message: "Ready".to_string(),
            last_status: LinkStatus::Idle,
        }
    }

    /// Copy the editable fields back into the configuration
    fn apply_temp_values(&mut self) {
        let port = self.temp_port.trim();
        self.config.link.port_path = (!port.is_empty()).then(|| port.to_string());
        if let Ok(baud) = self.temp_baud.trim().parse::<u32>() {
            self.config.link.baud_rate = baud;
        }
    }

    /// Start the controller
    fn start_session(&mut self) {
        if self.session.is_some() {
            return;
        }

        self.apply_temp_values();
        if let Err(e) = self.config.validate() {
            self.status_message = format!("Invalid configuration: {:#}", e);
            return;
        }

        let mut session = ShiftSession::new(
            self.config.clone(),
            SessionOptions {
                live_output: false,
                debug_mode: self.debug_mode,
            },
        );
        let displays = self.config.pointer.displays.clone();
        let (pointer_feed, pointer) = if self.debug_mode {
            let (feed, pointer) = SharedPointer::new(displays);
            (Some(feed), SessionPointer::Shared(pointer))
        } else {
            (None, SessionPointer::System(SystemPointer::new(displays)))
        };

        let running_flag = session.get_running_flag();
        let offset = session.offset_reader();
        let status = session.status_reader();
        let counters = session.counters();

        // Start the session in a background thread
        let handle = thread::spawn(move || match session.start(pointer) {
            Ok(stats) => {
                info!("Session completed successfully ({} commands sent)", stats.commands_sent);
            }
            Err(e) => {
                error!("Session failed: {:#}", e);
            }
        });

        self.session = Some(RunningSession {
            thread: handle,
            running_flag,
            offset,
            status,
            counters,
            pointer_feed,
        });
        self.status_message = "Session started".to_string();
    }

    /// Stop the controller
    fn stop_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        // Signal the session to stop
        session.running_flag.store(false, Ordering::SeqCst);

        if session.thread.join().is_err() {
            error!("Session thread panicked");
        }

        self.last_status = session.status.observe();
        self.status_message = "Session stopped".to_string();
    }

    fn status_label(ui: &mut egui::Ui, status: &LinkStatus) {
        let color = if status.is_running() {
            egui::Color32::GREEN
        } else if matches!(status, LinkStatus::Failed(_)) {
            egui::Color32::RED
        } else {
            egui::Color32::GRAY
        };
        ui.colored_label(color, status.to_string());
    }

    /// Screen outline with the virtual display drawn where it currently sits
    fn preview(&self, ui: &mut egui::Ui, offset_px: f64) {
        let render = &self.config.render;
        let available = ui.available_width().max(100.0);
        let scale = available / render.screen_width.max(1.0) as f32;
        let screen_size = egui::vec2(available, 80.0);

        let (response, painter) = ui.allocate_painter(screen_size, egui::Sense::hover());
        let screen = response.rect;

        let origin = render.preview_origin(offset_px) as f32 * scale;
        let virtual_rect = egui::Rect::from_min_size(
            egui::pos2(screen.min.x - origin, screen.min.y + 4.0),
            egui::vec2(render.virtual_display_width as f32 * scale, screen.height() - 8.0),
        );

        let painter = painter.with_clip_rect(screen);
        painter.rect_filled(virtual_rect, 0.0, egui::Color32::from_rgb(40, 70, 110));
        painter.line_segment(
            [
                egui::pos2(virtual_rect.center().x, virtual_rect.min.y),
                egui::pos2(virtual_rect.center().x, virtual_rect.max.y),
            ],
            egui::Stroke::new(1.0, egui::Color32::WHITE),
        );
        painter.rect_stroke(
            screen,
            0.0,
            egui::Stroke::new(1.0, egui::Color32::LIGHT_GRAY),
            egui::StrokeKind::Inside,
        );
    }

    /// Area standing in for the first display; hovering it moves the pointer
    fn pointer_pad(ui: &mut egui::Ui, config: &AppConfig, feed: &PointerFeed) {
        let Some(display) = config.pointer.displays.first().copied() else {
            ui.label("No displays configured");
            return;
        };

        let width = ui.available_width().max(100.0);
        let aspect = (display.height / display.width) as f32;
        let size = egui::vec2(width, (width * aspect).min(160.0));
        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let pad = response.rect;

        painter.rect_filled(pad, 0.0, egui::Color32::from_gray(30));
        painter.text(
            pad.center(),
            egui::Align2::CENTER_CENTER,
            "Move the pointer here",
            egui::FontId::proportional(14.0),
            egui::Color32::GRAY,
        );

        match response.hover_pos() {
            Some(pos) => {
                let x = display.x + ((pos.x - pad.min.x) / pad.width()) as f64 * display.width;
                let y = display.y + ((pos.y - pad.min.y) / pad.height()) as f64 * display.height;
                feed.update(Point::new(x, y));
                painter.circle_filled(pos, 4.0, egui::Color32::YELLOW);
            }
            None => feed.clear(),
        }
    }
}

impl eframe::App for ScreenshiftGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Check if the session thread has finished on its own
        if let Some(session) = &self.session {
            if session.thread.is_finished() {
                self.last_status = session.status.observe();
                self.session = None;
                self.status_message = if self.last_status.is_terminal() {
                    "Session finished".to_string()
                } else {
                    "Session ended before the link opened".to_string()
                };
            }
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("🖥️ Screenshift");
            ui.separator();

            // Link configuration
            ui.group(|ui| {
                ui.label("🔌 Link Configuration");

                ui.add_enabled_ui(self.session.is_none(), |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Serial Port:");
                        ui.text_edit_singleline(&mut self.temp_port);
                        ui.label(format!("(empty: discover {}*)", self.config.link.port_prefix));
                    });

                    ui.horizontal(|ui| {
                        ui.label("Baud Rate:");
                        ui.text_edit_singleline(&mut self.temp_baud);
                    });

                    ui.checkbox(&mut self.debug_mode, "Simulated mechanism (debug)");
                });
            });

            ui.separator();

            // Control buttons
            ui.horizontal(|ui| {
                if self.session.is_some() {
                    if ui.button("🛑 Stop").clicked() {
                        self.stop_session();
                    }
                } else if ui.button("▶️ Start").clicked() {
                    self.start_session();
                }

                if ui.button("💾 Save Config").clicked() {
                    self.apply_temp_values();
                    match self.config.save_to_file(&self.config_path) {
                        Ok(_) => {
                            self.status_message = "Configuration saved".to_string();
                        }
                        Err(e) => {
                            self.status_message = format!("Failed to save config: {:#}", e);
                        }
                    }
                }

                if ui.button("🔄 Load Config").clicked() {
                    match AppConfig::load_from_file(&self.config_path) {
                        Ok(config) => {
                            self.config = config;
                            self.temp_port = self.config.link.port_path.clone().unwrap_or_default();
                            self.temp_baud = self.config.link.baud_rate.to_string();
                            self.status_message = "Configuration loaded".to_string();
                        }
                        Err(e) => {
                            self.status_message = format!("Failed to load config: {:#}", e);
                        }
                    }
                }
            });

            ui.separator();

            // Status section
            let (status, offset_px, stats) = match &self.session {
                Some(session) => (
                    session.status.observe(),
                    session.offset.observe(),
                    session.counters.snapshot(),
                ),
                None => (self.last_status.clone(), 0.0, Default::default()),
            };

            ui.group(|ui| {
                ui.label("📊 Status");

                ui.horizontal(|ui| {
                    ui.label("Link:");
                    Self::status_label(ui, &status);
                });

                ui.horizontal(|ui| {
                    ui.label("Message:");
                    ui.label(&self.status_message);
                });

                ui.horizontal(|ui| {
                    ui.label("Visual Offset:");
                    ui.label(format!("{:.1} px", offset_px));
                });

                ui.horizontal(|ui| {
                    ui.label("Frames:");
                    ui.label(format!(
                        "{} received, {} discarded",
                        stats.frames_received, stats.frames_discarded
                    ));
                });

                ui.horizontal(|ui| {
                    ui.label("Commands:");
                    ui.label(format!("{}", stats.commands_sent));
                });
            });

            ui.separator();

            ui.label("🪟 Preview");
            self.preview(ui, offset_px);

            if let Some(feed) = self.session.as_ref().and_then(|s| s.pointer_feed.as_ref()) {
                ui.separator();
                ui.label("🖱️ Pointer");
                Self::pointer_pad(ui, &self.config, feed);
            }

            ui.separator();

            // Advanced options (collapsible)
            ui.collapsing("🔧 Advanced Options", |ui| {
                ui.add_enabled_ui(self.session.is_none(), |ui| {
                    let calibration = &mut self.config.calibration;
                    ui.horizontal(|ui| {
                        ui.label("Screen Width (px):");
                        ui.add(egui::DragValue::new(&mut calibration.screen_width_px).range(1.0..=16384.0));
                    });

                    ui.horizontal(|ui| {
                        ui.label("Travel Range (steps):");
                        ui.add(egui::DragValue::new(&mut calibration.travel_range_steps).range(1.0..=32767.0));
                    });

                    ui.horizontal(|ui| {
                        ui.label("Velocity Lead:");
                        ui.add(egui::DragValue::new(&mut calibration.lead_seconds).speed(0.001).range(0.0..=1.0));
                    });

                    let mut clamp = calibration.travel_clamp == shared::TravelClamp::Enabled;
                    if ui.checkbox(&mut clamp, "Clamp targets to travel range").changed() {
                        calibration.travel_clamp = if clamp {
                            shared::TravelClamp::Enabled
                        } else {
                            shared::TravelClamp::Disabled
                        };
                    }

                    ui.horizontal(|ui| {
                        ui.label("Shutdown Poll (ms):");
                        ui.add(egui::DragValue::new(&mut self.config.link.shutdown_poll_ms).range(1..=1000));
                    });
                });
            });
        });

        // Request repaint for real-time updates
        if self.session.is_some() {
            ctx.request_repaint_after(self.config.render.repaint_interval());
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Stop the session if running
        self.stop_session();

        // Auto-save configuration if enabled
        if self.config.gui.auto_save_config {
            let _ = self.config.save_to_file(&self.config_path);
        }
    }
}
