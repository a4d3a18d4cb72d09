// SPDX-License-Identifier: GPL-3.0-only

//! Terminal reconstruction viewer
//!
//! Renders the shaded ray-cast of the live volume, or a reloaded mesh, to the
//! terminal using Unicode half-block characters for double vertical
//! resolution.

use crate::backends::engine::{Mesh, ShadedImage};
use crate::config::Config;
use crate::constants::timing;
use crate::pipelines::mesh::{self, MeshStats, Orbit, render_mesh_preview, save_image_png};
use crate::pipelines::reconstruction::{
    CommandOutcome, FrameUpdate, SessionCommand, SessionEvent, SessionRunner, SessionState,
    TickOutcome, open_session,
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

type TerminalBackend = Terminal<CrosstermBackend<io::Stdout>>;

/// Run the live reconstruction viewer
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let session = open_session(&config)?;
    let runner = SessionRunner::spawn(session, config.tick_interval(), 4)?;
    with_terminal(|terminal| run_live(terminal, runner, &config))
}

/// Show a saved mesh file in the orbit viewer
pub fn view_mesh(path: &Path, flip_yz: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mesh = mesh::import_mesh(path, flip_yz)?;
    info!(path = %path.display(), stats = %MeshStats::of(&mesh), "Viewing mesh");
    let mut view = MeshView::new(path.to_path_buf(), mesh);
    with_terminal(|terminal| {
        loop {
            terminal.draw(|f| {
                let (image_area, status_area) = split_status(f.area());
                let image = view.render(image_area);
                f.render_widget(&FrameWidget::new(Some(image)), image_area);
                f.render_widget(StatusBar { message: &view.status() }, status_area);
            })?;

            if let Some(key) = poll_key()? {
                if is_quit(&key) {
                    return Ok(());
                }
                view.handle_key(key.code);
            }
        }
    })
}

fn with_terminal<F>(body: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut TerminalBackend) -> Result<(), Box<dyn std::error::Error>>,
{
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = body(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn poll_key() -> io::Result<Option<KeyEvent>> {
    if event::poll(timing::UI_POLL_INTERVAL)?
        && let Event::Key(key) = event::read()?
        && key.kind == KeyEventKind::Press
    {
        return Ok(Some(key));
    }
    Ok(None)
}

fn is_quit(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('q')
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

fn split_status(area: Rect) -> (Rect, Rect) {
    let image_area = Rect {
        x: area.x,
        y: area.y,
        width: area.width,
        height: area.height.saturating_sub(1),
    };
    let status_area = Rect {
        x: area.x,
        y: area.y + area.height.saturating_sub(1),
        width: area.width,
        height: 1,
    };
    (image_area, status_area)
}

/// Reloaded mesh with its orbit camera
struct MeshView {
    path: PathBuf,
    mesh: Mesh,
    orbit: Orbit,
}

impl MeshView {
    fn new(path: PathBuf, mesh: Mesh) -> Self {
        Self {
            path,
            mesh,
            orbit: Orbit::default(),
        }
    }

    fn render(&self, area: Rect) -> Arc<ShadedImage> {
        let width = u32::from(area.width).max(1);
        let height = u32::from(area.height).max(1) * 2;
        Arc::new(render_mesh_preview(&self.mesh, width, height, &self.orbit))
    }

    fn handle_key(&mut self, code: KeyCode) {
        const STEP: f32 = 0.15;
        match code {
            KeyCode::Left => self.orbit.rotate(-STEP, 0.0),
            KeyCode::Right => self.orbit.rotate(STEP, 0.0),
            KeyCode::Up => self.orbit.rotate(0.0, -STEP),
            KeyCode::Down => self.orbit.rotate(0.0, STEP),
            KeyCode::Char('+') | KeyCode::Char('=') => self.orbit.zoom_by(0.9),
            KeyCode::Char('-') => self.orbit.zoom_by(1.1),
            KeyCode::Char('0') => self.orbit = Orbit::default(),
            _ => {}
        }
    }

    fn status(&self) -> String {
        format!(
            "{} | {} | arrows rotate, +/- zoom, 0 recenter, q quit",
            self.path.display(),
            MeshStats::of(&self.mesh)
        )
    }
}

fn run_live<E>(
    terminal: &mut TerminalBackend,
    mut runner: SessionRunner<E>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>>
where
    E: crate::backends::engine::ReconstructionEngine + 'static,
{
    let commands = runner.commands();
    let snapshot_dir = config.mesh.output_dir();

    let mut latest: Option<FrameUpdate> = None;
    let mut mesh_view: Option<MeshView> = None;
    let mut show_help = false;
    let mut status_message = build_status_message();

    loop {
        // Drain everything queued so the newest frame wins
        while let Some(event) = runner.try_next_event() {
            match event {
                SessionEvent::Frame(update) => latest = Some(update),
                SessionEvent::CommandCompleted(outcome) => {
                    status_message = describe_outcome(&outcome);
                    if let CommandOutcome::MeshReloaded(reloaded) = outcome {
                        mesh_view = Some(MeshView::new(reloaded.path, reloaded.mesh));
                    }
                }
                SessionEvent::CommandFailed(e) => status_message = format!("Error: {}", e),
                SessionEvent::Failed(e) => {
                    error!(error = %e, "Session stopped");
                    status_message = format!("Session stopped: {} | 'q' quit", e);
                }
            }
        }

        terminal.draw(|f| {
            let (image_area, status_area) = split_status(f.area());
            let image = match &mesh_view {
                Some(view) => Some(view.render(image_area)),
                None => latest.as_ref().map(|u| Arc::clone(&u.image)),
            };
            f.render_widget(&FrameWidget::new(image), image_area);

            let status = match (&mesh_view, show_help) {
                (_, true) => build_help_message(),
                (Some(view), false) => view.status(),
                (None, false) => format!("{} | {}", tracking_summary(latest.as_ref()), status_message),
            };
            f.render_widget(StatusBar { message: &status }, status_area);
        })?;

        let Some(key) = poll_key()? else {
            continue;
        };
        if is_quit(&key) {
            break;
        }

        if mesh_view.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('m')) {
                mesh_view = None;
            } else if let Some(view) = mesh_view.as_mut() {
                view.handle_key(key.code);
            }
            continue;
        }

        let command = match key.code {
            KeyCode::Char('s') => Some(SessionCommand::SaveMesh(None)),
            KeyCode::Char('r') => Some(SessionCommand::Reset),
            KeyCode::Char('l') => Some(SessionCommand::ReloadLastMesh),
            KeyCode::Char('p') => {
                status_message = match latest.as_ref() {
                    Some(update) => match save_snapshot(&update.image, &snapshot_dir) {
                        Ok(path) => format!("Snapshot: {}", path.display()),
                        Err(e) => format!("Error: {}", e),
                    },
                    None => "No frame yet".to_string(),
                };
                None
            }
            KeyCode::Char('h') => {
                show_help = !show_help;
                None
            }
            _ => None,
        };

        if let Some(command) = command {
            show_help = false;
            status_message = match &command {
                SessionCommand::SaveMesh(_) => "Saving mesh...".to_string(),
                SessionCommand::Reset => "Resetting...".to_string(),
                SessionCommand::ReloadLastMesh => "Loading last mesh...".to_string(),
            };
            if commands.send(command).is_err() {
                status_message = "Session is not running | 'q' quit".to_string();
            }
        }
    }

    runner.stop();
    Ok(())
}

fn describe_outcome(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::MeshSaved(saved) => format!(
            "Saved {} ({} triangles): {}",
            saved.format,
            saved.triangles,
            saved.path.display()
        ),
        CommandOutcome::Reset => "Reconstruction reset".to_string(),
        CommandOutcome::MeshReloaded(reloaded) => {
            format!("Loaded {}", reloaded.path.display())
        }
    }
}

fn tracking_summary(update: Option<&FrameUpdate>) -> String {
    let Some(update) = update else {
        return "Waiting for depth...".to_string();
    };
    let frame = update
        .report
        .frame
        .map(|f| f.frame_number.to_string())
        .unwrap_or_else(|| "-".to_string());
    match (update.state, update.report.outcome) {
        (SessionState::TrackingLost, _) | (_, TickOutcome::TrackingLost) => format!(
            "frame {} | tracking lost ({}), align camera to last position",
            frame, update.tracking.consecutive_lost_frames
        ),
        (state, _) => format!("frame {} | {}", frame, state),
    }
}

fn build_status_message() -> String {
    "'s' save mesh | 'r' reset | 'l' last mesh | 'p' snapshot | 'h' help | 'q' quit".to_string()
}

fn build_help_message() -> String {
    "s: Save mesh | r: Reset volume | l: View last mesh (Esc back) | p: PNG snapshot | h: Toggle help | q/Ctrl+C: Quit".to_string()
}

/// Save the shaded image as a PNG next to the meshes
fn save_snapshot(image: &ShadedImage, dir: &Path) -> Result<PathBuf, String> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("snapshot_{}.png", timestamp));
    save_image_png(image, &path)?;
    info!(path = %path.display(), "Snapshot saved");
    Ok(path)
}

/// Widget that renders a shaded image using half-block characters
struct FrameWidget {
    image: Option<Arc<ShadedImage>>,
}

impl FrameWidget {
    fn new(image: Option<Arc<ShadedImage>>) -> Self {
        Self { image }
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(image) = self.image.as_deref().filter(|i| i.width > 0 && i.height > 0) else {
            let msg = "Waiting for depth sensor...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        // Each cell shows two vertical pixels
        let aspect = image.width as f64 / image.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > aspect {
            let h = term_height;
            ((h * aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / aspect / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;
        let x_scale = image.width as f64 / display_width as f64;
        let y_scale = image.height as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(image, src_x, src_top));
                    cell.set_bg(sample_pixel(image, src_x, src_bottom));
                }
            }
        }
    }
}

fn sample_pixel(image: &ShadedImage, x: u32, y: u32) -> Color {
    let [r, g, b, _] = image.pixel(x.min(image.width - 1), y.min(image.height - 1));
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_widget_fills_area() {
        let mut image = ShadedImage::new(4, 4);
        image.set_pixel(0, 0, [255, 0, 0, 255]);
        let widget = FrameWidget::new(Some(Arc::new(image)));
        let area = Rect::new(0, 0, 4, 2);
        let mut buf = Buffer::empty(area);
        (&widget).render(area, &mut buf);
        let cell = &buf[(0, 0)];
        assert_eq!(cell.symbol(), "▀");
        assert_eq!(cell.fg, Color::Rgb(255, 0, 0));
    }

    #[test]
    fn test_placeholder_without_image() {
        let area = Rect::new(0, 0, 40, 3);
        let mut buf = Buffer::empty(area);
        (&FrameWidget::new(None)).render(area, &mut buf);
        let row: String = (0..40u16).map(|x| buf[(x, 1)].symbol().to_string()).collect();
        assert!(row.contains("Waiting for depth sensor"));
    }

    #[test]
    fn test_status_bar_truncates() {
        let area = Rect::new(0, 0, 5, 1);
        let mut buf = Buffer::empty(area);
        StatusBar { message: "abcdefgh" }.render(area, &mut buf);
        let row: String = (0..5u16).map(|x| buf[(x, 0)].symbol().to_string()).collect();
        assert_eq!(row, "abcde");
    }
}
