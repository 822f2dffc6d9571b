//! Interactive gyrification viewer built with eframe/egui.
//!
//! This module defines [`Viewer`], which owns a [`Simulation`] and
//! implements [`eframe::App`] to render the evolving surface and control
//! the run through an egui UI.

use eframe::App;
use glam::Vec2;
use gyri_core::config::Config;
use gyri_core::reference::ReferenceMap;
use gyri_core::{Simulation, StepReport};
use ndarray::ArrayView2;
use rand::Rng;

/// Scalar field used to colour the height map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    Height,
    Curvature,
}

/// Main application state for the interactive viewer.
///
/// [`Viewer`] glues together:
/// - The simulation core: [`Simulation`] plus the reference map it was
///   built from, kept for rebuilds.
/// - UI configuration (pan/zoom of the cross-section, colour mode, timing).
/// - eframe/egui callbacks for drawing and user interaction.
///
/// The per-frame update is:
/// 1. Handle UI interactions / input.
/// 2. If `running` is `true` and enough time has passed, call [`Viewer::step_once`].
/// 3. Render the height map and the mid-row cross-section.
///
/// A step is always finished before the frame that shows it is drawn, so
/// rendering never observes a half-applied constraint.
pub struct Viewer {
    sim: Simulation,
    reference: Option<ReferenceMap>,
    /// Edited in the side panel; applied on rebuild.
    pending_cfg: Config,

    running: bool,
    color_mode: ColorMode,
    zoom: f32,
    pan: egui::Vec2,

    last_report: Option<StepReport>,
    /// Set when a step or rebuild failed; stops auto-running.
    error: Option<String>,

    step_interval: f64,
    last_step_time: f64,
    last_step_dt: f64,
}

/// Viridis control points, low to high.
const VIRIDIS: [[u8; 3]; 5] = [
    [68, 1, 84],
    [59, 82, 139],
    [33, 145, 140],
    [94, 201, 98],
    [253, 231, 37],
];

/// Maps `t` in `[0, 1]` onto a piecewise-linear viridis ramp.
pub fn viridis(t: f32) -> egui::Color32 {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (VIRIDIS.len() - 1) as f32;
    let lo = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - lo as f32;
    let channel = |c: usize| {
        let a = VIRIDIS[lo][c] as f32;
        let b = VIRIDIS[lo + 1][c] as f32;
        (a + (b - a) * frac).round() as u8
    };
    egui::Color32::from_rgb(channel(0), channel(1), channel(2))
}

/// Returns `(min, max)` of a field; a flat field gets a unit span.
fn value_range(field: ArrayView2<'_, f64>) -> (f64, f64) {
    let (lo, hi) = field
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if hi > lo { (lo, hi) } else { (lo, lo + 1.0) }
}

impl Viewer {
    /// Creates a paused viewer around an already-built simulation.
    pub fn new(sim: Simulation, reference: Option<ReferenceMap>) -> Self {
        let pending_cfg = sim.config().clone();
        Self {
            sim,
            reference,
            pending_cfg,
            running: false,
            color_mode: ColorMode::Curvature,
            zoom: 120.0,
            pan: egui::vec2(0.0, 0.0),
            last_report: None,
            error: None,
            step_interval: 0.01,
            last_step_time: 0.0,
            last_step_dt: 0.0,
        }
    }

    /// Restarts the running configuration from step 0. Side-panel edits
    /// are left pending.
    fn reset(&mut self) {
        self.rebuild(self.sim.config().clone());
    }

    /// Rebuilds the simulation from the side-panel configuration.
    fn apply(&mut self) {
        self.rebuild(self.pending_cfg.clone());
    }

    /// On failure the current simulation is kept and the error is shown.
    fn rebuild(&mut self, cfg: Config) {
        match Simulation::from_seed(cfg, self.reference.as_ref()) {
            Ok(sim) => {
                self.sim = sim;
                self.last_report = None;
                self.error = None;
            }
            Err(e) => {
                tracing::error!(error = %e, "rebuild failed");
                self.error = Some(e.to_string());
            }
        }
        self.running = false;
    }

    /// Advances the simulation by a single step.
    ///
    /// Stops auto-running at the last step or on a numerical failure; the
    /// report of a committed step is kept for the status bar.
    fn step_once(&mut self) {
        match self.sim.advance() {
            Ok(Some(report)) => {
                tracing::info!(step = report.step, max_z = report.max_height, "step");
                if let Some(sample) = report.fractal
                    && let Some(value) = sample.dimension
                {
                    tracing::info!(step = sample.step, fractal_dimension = value, "fractal");
                }
                self.last_report = Some(report);
            }
            Ok(None) => self.running = false,
            Err(e) => {
                tracing::error!(error = %e, "simulation halted");
                self.error = Some(e.to_string());
                self.running = false;
            }
        }
    }

    /// Converts a cross-section position `(x, z)` to screen-space.
    ///
    /// World coordinates are scaled by `zoom`, offset by `pan`, and then
    /// centered inside the given `rect`. The y-axis is flipped so that
    /// positive heights go up.
    fn world_to_screen(&self, p: Vec2, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        egui::pos2(
            center.x + p.x * self.zoom + self.pan.x,
            center.y - p.y * self.zoom + self.pan.y,
        )
    }

    /// Inverse of [`Viewer::world_to_screen`] up to rounding.
    fn screen_to_world(&self, p: egui::Pos2, rect: egui::Rect) -> Vec2 {
        let center = rect.center();
        let x = (p.x - center.x - self.pan.x) / self.zoom;
        let y = (center.y - p.y + self.pan.y) / self.zoom;
        Vec2::new(x, y)
    }

    fn labeled_drag_usize(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut usize,
        range: std::ops::RangeInclusive<usize>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    fn labeled_drag_f64(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut f64,
        range: std::ops::RangeInclusive<f64>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Builds the top panel UI (run controls, stepping, reset).
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let can_run = !self.sim.is_finished() && self.error.is_none();
                if ui
                    .add_enabled(
                        can_run,
                        egui::Button::new(if self.running { "⏸ Pause" } else { "▶ Run" }),
                    )
                    .clicked()
                {
                    self.running = !self.running;
                }

                ui.add(
                    egui::DragValue::new(&mut self.step_interval)
                        .prefix("dt target = ")
                        .range(0.0..=1.0)
                        .speed(0.01),
                );

                if ui.add_enabled(can_run, egui::Button::new("Step")).clicked() {
                    let now = ctx.input(|i| i.time);
                    if self.last_step_time > 0.0 {
                        self.last_step_dt = now - self.last_step_time;
                    }
                    self.step_once();
                    self.last_step_time = now;
                }

                if ui.button("Reset").clicked() {
                    self.reset();
                }

                ui.separator();
                ui.add(egui::Slider::new(&mut self.zoom, 20.0..=600.0).text("Zoom"));
            });
        });
    }

    /// Builds the bottom status bar (step, max height, fractal estimate).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("dt last = {:.3} s", self.last_step_dt));
                ui.separator();
                ui.label(format!(
                    "step = {}/{}",
                    self.sim.step(),
                    self.sim.config().run.total_steps
                ));
                if let Some(report) = &self.last_report {
                    ui.label(format!("max z = {:.4}", report.max_height));
                    ui.label(format!("clamped = {}", report.clamped_points));
                }
                let latest = self.sim.fractal_log().last();
                match latest.and_then(|s| s.dimension.map(|d| (s.step, d))) {
                    Some((step, d)) => ui.label(format!("fractal = {d:.4} (step {step})")),
                    None => ui.label("fractal = n/a"),
                };
                if let Some(err) = &self.error {
                    ui.colored_label(egui::Color32::RED, err);
                }
            });
        });
    }

    /// Builds the right-hand panel for editing the configuration.
    fn ui_config_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("config_panel")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                ui.heading("Config");
                let cfg = &mut self.pending_cfg;

                ui.separator();
                ui.label("Run");
                Self::labeled_drag_usize(ui, "points:", &mut cfg.grid.points, 2..=200, 1.0);
                Self::labeled_drag_usize(ui, "steps:", &mut cfg.run.total_steps, 1..=2000, 1.0);
                ui.horizontal(|ui| {
                    ui.label(format!("seed: {}", cfg.run.seed));
                    if ui.button("Reseed").clicked() {
                        cfg.run.seed = rand::rng().random();
                    }
                });

                ui.separator();
                ui.label("Growth");
                Self::labeled_drag_f64(ui, "outer rate:", &mut cfg.growth.max_rate_outer, 0.0..=1.0, 0.005);
                Self::labeled_drag_f64(ui, "inner rate:", &mut cfg.growth.max_rate_inner, 0.0..=1.0, 0.005);
                ui.checkbox(&mut cfg.growth.inner_layer, "inner layer");
                Self::labeled_drag_f64(
                    ui,
                    "genetic std:",
                    &mut cfg.growth.genetic_variation_std,
                    0.0..=1.0,
                    0.005,
                );

                ui.separator();
                ui.label("Folding");
                Self::labeled_drag_f64(ui, "strength:", &mut cfg.folding.strength_base, 0.0..=0.5, 0.002);
                Self::labeled_drag_f64(ui, "fine amp:", &mut cfg.folding.fine_amplitude, 0.0..=0.2, 0.002);
                for (k, label) in cfg.folding.wavenumbers.iter_mut().zip(["k1:", "k2:", "k3:"]) {
                    Self::labeled_drag_f64(ui, label, k, 0.0..=60.0, 0.5);
                }

                ui.separator();
                ui.label("Boundary");
                Self::labeled_drag_f64(ui, "radius:", &mut cfg.boundary.base_radius, 0.1..=3.0, 0.01);
                Self::labeled_drag_f64(ui, "max radius:", &mut cfg.boundary.max_radius, 0.1..=4.0, 0.01);
                Self::labeled_drag_f64(
                    ui,
                    "pressure:",
                    &mut cfg.boundary.pressure_increase,
                    -0.5..=0.5,
                    0.001,
                );

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Apply & reset").clicked() {
                        self.apply();
                    }
                    if ui.button("Defaults").clicked() {
                        self.pending_cfg = Config::default();
                    }
                });
            });
    }

    /// Floating toolbar for choosing the colour field.
    fn ui_toolbar(&mut self, ctx: &egui::Context) {
        egui::Area::new("toolbar".into())
            .anchor(egui::Align2::LEFT_TOP, egui::vec2(10.0, 40.0))
            .movable(false)
            .show(ctx, |ui| {
                egui::Frame::new()
                    .fill(egui::Color32::from_rgba_unmultiplied(0, 0, 0, 32))
                    .show(ui, |ui| {
                        ui.vertical(|ui| {
                            if ui
                                .selectable_label(self.color_mode == ColorMode::Height, "▲ Height")
                                .clicked()
                            {
                                self.color_mode = ColorMode::Height;
                            }
                            if ui
                                .selectable_label(
                                    self.color_mode == ColorMode::Curvature,
                                    "◠ Curvature",
                                )
                                .clicked()
                            {
                                self.color_mode = ColorMode::Curvature;
                            }
                        });
                    });
            });
    }

    /// Draws the grid as a top-down colour map into `rect`.
    fn draw_height_map(&self, painter: &egui::Painter, rect: egui::Rect) {
        let field = match self.color_mode {
            ColorMode::Height => self.sim.heights(),
            ColorMode::Curvature => self.sim.curvature(),
        };
        let (lo, hi) = value_range(field);
        let (rows, cols) = field.dim();

        let side = rect.width().min(rect.height());
        let origin = rect.center() - egui::vec2(side, side) * 0.5;
        let cell = egui::vec2(side / cols as f32, side / rows as f32);

        for ((i, j), &v) in field.indexed_iter() {
            // Row 0 is y = -h; draw it at the bottom.
            let min = origin + egui::vec2(j as f32 * cell.x, (rows - 1 - i) as f32 * cell.y);
            let t = ((v - lo) / (hi - lo)) as f32;
            painter.rect_filled(egui::Rect::from_min_size(min, cell), 0.0, viridis(t));
        }
    }

    /// Draws the middle row as a profile `(x, z)` together with the
    /// constraint radius along the same row.
    fn draw_cross_section(&self, painter: &egui::Painter, rect: egui::Rect) {
        let grid = self.sim.grid();
        let row = grid.len() / 2;
        let step = self.sim.step().min(self.sim.config().run.total_steps - 1);

        let h = grid.half_extent() as f32;
        let axis = [
            self.world_to_screen(Vec2::new(-h, 0.0), rect),
            self.world_to_screen(Vec2::new(h, 0.0), rect),
        ];
        painter.line_segment(axis, egui::Stroke::new(1.0, egui::Color32::DARK_GRAY));

        // Ceiling the constraint radius is clamped to.
        let ceiling = self.sim.boundary().max_radius() as f32;
        let ceiling = [
            self.world_to_screen(Vec2::new(-h, ceiling), rect),
            self.world_to_screen(Vec2::new(h, ceiling), rect),
        ];
        painter.line_segment(ceiling, egui::Stroke::new(1.0, egui::Color32::from_gray(70)));

        let heights = self.sim.heights();
        let surface: Vec<egui::Pos2> = (0..grid.len())
            .map(|j| {
                let p = Vec2::new(grid.x()[[row, j]] as f32, heights[[row, j]] as f32);
                self.world_to_screen(p, rect)
            })
            .collect();
        painter.add(egui::Shape::line(
            surface,
            egui::Stroke::new(2.0, egui::Color32::LIGHT_GREEN),
        ));

        if let Some(inner) = self.sim.inner_heights() {
            let points: Vec<egui::Pos2> = (0..grid.len())
                .map(|j| {
                    let p = Vec2::new(grid.x()[[row, j]] as f32, inner[[row, j]] as f32);
                    self.world_to_screen(p, rect)
                })
                .collect();
            painter.add(egui::Shape::line(
                points,
                egui::Stroke::new(1.0, egui::Color32::LIGHT_BLUE),
            ));
        }

        let boundary = self.sim.boundary();
        let limit: Vec<egui::Pos2> = (0..grid.len())
            .map(|j| {
                let r = boundary.radius_at(row, j, step);
                let planar = grid.planar_distance(row, j);
                let z = (r * r - planar * planar).max(0.0).sqrt();
                self.world_to_screen(Vec2::new(grid.x()[[row, j]] as f32, z as f32), rect)
            })
            .collect();
        painter.add(egui::Shape::dashed_line(
            &limit,
            egui::Stroke::new(1.0, egui::Color32::LIGHT_RED),
            6.0,
            4.0,
        ));
    }

    /// Builds the central panel with the height map and the cross-section.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
            let rect = response.rect;
            let painter = ui.painter_at(rect);

            let split = rect.top() + rect.height() * 0.65;
            let map_rect = egui::Rect::from_min_max(rect.min, egui::pos2(rect.right(), split));
            let section_rect = egui::Rect::from_min_max(egui::pos2(rect.left(), split), rect.max);

            // Pan the cross-section with drag.
            if response.dragged() {
                self.pan += response.drag_delta();
            }

            // Zoom the cross-section around the mouse cursor.
            let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let pointer_screen = response.hover_pos().unwrap_or(section_rect.center());
                let world_before = self.screen_to_world(pointer_screen, section_rect);

                let factor = (1.0 + scroll * 0.001).clamp(0.5, 2.0);
                self.zoom = (self.zoom * factor).clamp(20.0, 600.0);

                let screen_after = self.world_to_screen(world_before, section_rect);
                self.pan += pointer_screen - screen_after;
            }

            self.draw_height_map(&painter, map_rect);
            self.draw_cross_section(&painter.with_clip_rect(section_rect), section_rect);

            // Auto-run simulation if requested.
            if self.running {
                let now = ctx.input(|i| i.time);
                let elapsed = now - self.last_step_time;
                if elapsed >= self.step_interval {
                    if self.last_step_time > 0.0 {
                        self.last_step_dt = elapsed;
                    }
                    self.step_once();
                    self.last_step_time = now;
                }

                ctx.request_repaint();
            }
        });
    }
}

impl App for Viewer {
    /// eframe callback that builds all UI panels for each frame.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_config_panel(ctx);
        self.ui_central_panel(ctx);
        self.ui_toolbar(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rect() -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::new(0.0, 0.0), egui::vec2(800.0, 600.0))
    }

    fn test_viewer(steps: usize) -> Viewer {
        let mut cfg = Config::default();
        cfg.grid.points = 12;
        cfg.run.total_steps = steps;
        cfg.diagnostics.fractal_layers = 6;
        let sim = Simulation::from_seed(cfg, None).expect("simulation");
        Viewer::new(sim, None)
    }

    #[test]
    fn world_to_screen_and_back_is_roundtrip() {
        let mut viewer = test_viewer(3);
        viewer.zoom = 150.0;
        viewer.pan = egui::vec2(15.0, -7.0);
        let rect = test_rect();

        let eps = 1e-4;
        for p in [Vec2::new(0.0, 0.0), Vec2::new(1.0, -0.5), Vec2::new(-0.35, 1.25)] {
            let back = viewer.screen_to_world(viewer.world_to_screen(p, rect), rect);
            assert!(
                (back.x - p.x).abs() < eps && (back.y - p.y).abs() < eps,
                "roundtrip mismatch: p={:?}, back={:?}",
                p,
                back
            );
        }
    }

    #[test]
    fn step_once_records_report_and_stops_at_end() {
        let mut viewer = test_viewer(2);
        viewer.running = true;

        viewer.step_once();
        assert_eq!(viewer.last_report.map(|r| r.step), Some(0));
        viewer.step_once();
        assert_eq!(viewer.last_report.map(|r| r.step), Some(1));
        assert!(viewer.running);

        viewer.step_once();
        assert!(!viewer.running, "finished run must stop auto-running");
        assert!(viewer.error.is_none());
    }

    #[test]
    fn reset_restarts_running_config_and_keeps_edits_pending() {
        let mut viewer = test_viewer(4);
        viewer.step_once();
        viewer.running = true;
        viewer.pending_cfg.grid.points = 8;

        viewer.reset();

        assert_eq!(viewer.sim.step(), 0);
        assert_eq!(viewer.sim.heights().dim(), (12, 12));
        assert_eq!(viewer.pending_cfg.grid.points, 8);
        assert!(viewer.last_report.is_none());
        assert!(!viewer.running);
    }

    #[test]
    fn apply_rebuilds_from_pending_config() {
        let mut viewer = test_viewer(4);
        viewer.step_once();
        viewer.running = true;
        viewer.pending_cfg.grid.points = 8;

        viewer.apply();

        assert_eq!(viewer.sim.step(), 0);
        assert_eq!(viewer.sim.heights().dim(), (8, 8));
        assert!(viewer.last_report.is_none());
        assert!(!viewer.running);
    }

    #[test]
    fn invalid_pending_config_keeps_current_simulation() {
        let mut viewer = test_viewer(4);
        viewer.pending_cfg.boundary.base_radius = 0.5;

        viewer.apply();

        assert!(viewer.error.is_some());
        assert_eq!(viewer.sim.heights().dim(), (12, 12));
    }

    #[test]
    fn viridis_endpoints_and_clamping() {
        assert_eq!(viridis(0.0), egui::Color32::from_rgb(68, 1, 84));
        assert_eq!(viridis(1.0), egui::Color32::from_rgb(253, 231, 37));
        assert_eq!(viridis(-3.0), viridis(0.0));
        assert_eq!(viridis(7.0), viridis(1.0));
        assert_eq!(viridis(f32::NAN), viridis(0.0));
    }

    #[test]
    fn value_range_gives_flat_fields_a_unit_span() {
        let flat = ndarray::Array2::from_elem((3, 3), 2.0);
        assert_eq!(value_range(flat.view()), (2.0, 3.0));

        let ramp = ndarray::array![[0.0, 1.0], [-2.0, 5.0]];
        assert_eq!(value_range(ramp.view()), (-2.0, 5.0));
    }
}
