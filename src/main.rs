#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use clap::{Parser, Subcommand};
#[cfg(feature = "gui")]
use crossbeam_channel::Receiver;
#[cfg(feature = "gui")]
use std::path::PathBuf;
#[cfg(feature = "gui")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "gui")]
use std::time::Duration;

#[cfg(feature = "gui")]
use tileseq::{
    config::{MAX_BPM, MIN_BPM},
    lock_sequencer, AssistReply, Assistant, AudioOutput, CommandService, CompletionService,
    Config, PlaybackEngine, PlaybackEvent, Sequencer,
};

#[cfg(feature = "gui")]
#[derive(Parser)]
#[command(name = "tileseq")]
#[command(author, version, about = "Grid step sequencer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (default: ~/.config/tileseq/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grid size (4-64)
    #[arg(short, long)]
    grid_size: Option<usize>,

    /// Tempo in beats per minute (20-400)
    #[arg(short, long)]
    bpm: Option<u32>,

    /// Write the effective settings back to the config file
    #[arg(long)]
    save: bool,
}

#[cfg(feature = "gui")]
#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init,
    /// Show the configuration file path
    ConfigPath,
}

#[cfg(feature = "gui")]
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => {
            let path = Config::create_default_config_file()?;
            println!("Created default config at: {}", path.display());
            return Ok(());
        }
        Some(Commands::ConfigPath) => {
            println!("{}", Config::config_path()?.display());
            return Ok(());
        }
        None => {}
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default(),
    };
    if let Some(size) = cli.grid_size {
        config.sequencer.grid_size = size;
    }
    if let Some(bpm) = cli.bpm {
        config.sequencer.bpm = bpm;
    }
    let config = config.sanitized();

    if cli.save {
        let path = match &cli.config {
            Some(path) => {
                config.save_to(path)?;
                path.clone()
            }
            None => config.save()?,
        };
        log::info!("saved settings to {}", path.display());
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 820.0])
            .with_title("tileseq - Grid Step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "tileseq",
        options,
        Box::new(move |_cc| Ok(Box::new(SequencerApp::new(config)))),
    )
    .map_err(|e| anyhow::anyhow!("{}", e))
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
#[derive(Clone, Copy)]
enum Speaker {
    You,
    Assistant,
    Notice,
}

#[cfg(feature = "gui")]
struct SequencerApp {
    sequencer: Arc<Mutex<Sequencer>>,
    playback_engine: PlaybackEngine,
    _audio_output: Option<AudioOutput>,
    audio_error: Option<String>,
    repaint_interval: Duration,

    assistant: Assistant,
    service: Option<Arc<dyn CompletionService>>,
    pending_reply: Option<Receiver<tileseq::Result<String>>>,

    // UI state
    chat_log: Vec<(Speaker, String)>,
    chat_input: String,
    grid_size_input: usize,
    current_visual_step: Option<usize>,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(config: Config) -> Self {
        // An engine failure is reported once here; the transport then refuses
        // to start for the rest of the session.
        let (audio_output, audio_error) = match AudioOutput::new() {
            Ok(output) => (Some(output), None),
            Err(e) => {
                log::error!("{}", e);
                (None, Some(e.to_string()))
            }
        };

        let mut sequencer = Sequencer::new(&config);
        if let Some(output) = &audio_output {
            sequencer = sequencer.with_engine(Arc::new(output.handle()));
        }

        let mut playback_engine = PlaybackEngine::new();
        sequencer.set_observer(Box::new(playback_engine.observer()));
        let grid_size_input = sequencer.grid_size();
        let sequencer = Arc::new(Mutex::new(sequencer));
        if audio_output.is_some() {
            playback_engine.start(Arc::clone(&sequencer));
        }

        let service = CommandService::from_argv(&config.assist.command)
            .map(|s| Arc::new(s) as Arc<dyn CompletionService>);

        Self {
            sequencer,
            playback_engine,
            _audio_output: audio_output,
            audio_error,
            repaint_interval: config.scheduling.poll_interval(),
            assistant: Assistant::new(config.assist.history_limit),
            service,
            pending_reply: None,
            chat_log: Vec::new(),
            chat_input: String::new(),
            grid_size_input,
            current_visual_step: None,
        }
    }

    fn handle_playback_events(&mut self) {
        for event in self.playback_engine.poll_events() {
            match event {
                PlaybackEvent::StepAdvanced(step) => self.current_visual_step = Some(step),
                PlaybackEvent::Started => {}
                PlaybackEvent::Stopped => self.current_visual_step = None,
            }
        }
    }

    fn send_chat(&mut self) {
        let request = self.chat_input.trim().to_string();
        if request.is_empty() || self.pending_reply.is_some() {
            return;
        }
        let Some(service) = self.service.clone() else {
            return;
        };
        self.chat_input.clear();
        self.chat_log.push((Speaker::You, request.clone()));

        let messages = {
            let seq = lock_sequencer(&self.sequencer);
            self.assistant
                .prepare(&request, seq.grid_size(), seq.pitches())
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            let _ = tx.send(service.complete(&messages));
        });
        self.pending_reply = Some(rx);
    }

    fn poll_assistant(&mut self) {
        let Some(rx) = &self.pending_reply else {
            return;
        };
        let result = match rx.try_recv() {
            Ok(result) => result,
            Err(crossbeam_channel::TryRecvError::Empty) => return,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(tileseq::Error::Assist("request was abandoned".to_string()))
            }
        };
        self.pending_reply = None;

        match result.and_then(|reply| self.assistant.finish(&reply)) {
            Ok(AssistReply::Chat(text)) => self.chat_log.push((Speaker::Assistant, text)),
            Ok(AssistReply::Pattern { description, cells }) => {
                if let Some(text) = description {
                    self.chat_log.push((Speaker::Assistant, text));
                }
                let applied = lock_sequencer(&self.sequencer).load_pattern(&cells);
                self.chat_log.push((
                    Speaker::Notice,
                    format!("Pattern ready: {} tiles. Press Play to listen!", applied),
                ));
            }
            Err(e) => {
                log::warn!("assistant request failed: {}", e);
                self.chat_log
                    .push((Speaker::Notice, format!("Oops! {}", e)));
            }
        }
    }

    fn assistant_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Assistant");
        if self.service.is_none() {
            ui.label("Set [assist] command in the config file to enable pattern requests.");
        }
        ui.separator();

        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .max_height(ui.available_height() - 40.0)
            .show(ui, |ui| {
                for (speaker, text) in &self.chat_log {
                    let (prefix, color) = match speaker {
                        Speaker::You => ("You", egui::Color32::LIGHT_BLUE),
                        Speaker::Assistant => ("AI", egui::Color32::LIGHT_GREEN),
                        Speaker::Notice => ("", egui::Color32::YELLOW),
                    };
                    if prefix.is_empty() {
                        ui.colored_label(color, text);
                    } else {
                        ui.colored_label(color, format!("{}: {}", prefix, text));
                    }
                }
                if self.pending_reply.is_some() {
                    ui.label("Thinking about your request...");
                }
            });

        let mut send = false;
        ui.horizontal(|ui| {
            let enabled = self.service.is_some() && self.pending_reply.is_none();
            let input = ui.add_enabled(
                enabled,
                egui::TextEdit::singleline(&mut self.chat_input).hint_text("Describe a beat..."),
            );
            if input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send = true;
            }
            if ui.add_enabled(enabled, egui::Button::new("Send")).clicked() {
                send = true;
            }
        });
        if send {
            self.send_chat();
        }
    }
}

#[cfg(feature = "gui")]
fn row_color(row: usize, size: usize) -> egui::Color32 {
    let hue = row as f32 / (size.max(2) - 1) as f32 * 300.0;
    egui::ecolor::Hsva::new(hue / 360.0, 0.75, 0.95, 1.0).into()
}

#[cfg(feature = "gui")]
fn draw_grid(ui: &mut egui::Ui, seq: &mut Sequencer, playhead: Option<usize>) {
    let n = seq.grid_size();
    let label_width = 40.0;
    let available = ui.available_size();
    let side = (available.x - label_width).min(available.y).max(n as f32 * 6.0);
    let cell = side / n as f32;

    let (response, painter) = ui.allocate_painter(
        egui::vec2(label_width + side, side),
        egui::Sense::click_and_drag(),
    );
    let origin = response.rect.min + egui::vec2(label_width, 0.0);

    // note labels
    let font = egui::FontId::monospace((cell * 0.5).clamp(6.0, 13.0));
    for row in 0..n {
        if let Some(name) = seq.pitches().name(row) {
            painter.text(
                egui::pos2(origin.x - 6.0, origin.y + (row as f32 + 0.5) * cell),
                egui::Align2::RIGHT_CENTER,
                name,
                font.clone(),
                egui::Color32::GRAY,
            );
        }
    }

    for row in 0..n {
        for col in 0..n {
            let rect = egui::Rect::from_min_size(
                origin + egui::vec2(col as f32 * cell, row as f32 * cell),
                egui::vec2(cell, cell),
            )
            .shrink(1.0);
            let color = if seq.grid().is_active(row, col) {
                row_color(row, n)
            } else if playhead == Some(col) {
                egui::Color32::from_gray(70)
            } else {
                egui::Color32::from_gray(35)
            };
            painter.rect_filled(rect, 2.0, color);
        }
    }

    let pointer_cell = response.interact_pointer_pos().and_then(|pos| {
        let local = pos - origin;
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let (row, col) = ((local.y / cell) as usize, (local.x / cell) as usize);
        (row < n && col < n).then_some((row, col))
    });

    if response.is_pointer_button_down_on() {
        if let Some((row, col)) = pointer_cell {
            if seq.is_dragging() {
                seq.drag_over(row, col);
            } else {
                seq.begin_drag(row, col);
            }
        }
    } else if seq.is_dragging() {
        seq.end_drag();
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(self.repaint_interval);

        self.handle_playback_events();
        self.poll_assistant();

        egui::SidePanel::right("assistant")
            .min_width(280.0)
            .show(ctx, |ui| self.assistant_panel(ui));

        let sequencer = Arc::clone(&self.sequencer);
        egui::CentralPanel::default().show(ctx, |ui| {
            let mut seq = lock_sequencer(&sequencer);

            ui.heading("tileseq - Grid Step Sequencer");
            ui.add_space(10.0);

            if let Some(err) = &self.audio_error {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    format!("⚠ Audio unavailable, playback disabled: {}", err),
                );
                ui.add_space(10.0);
            }

            // Transport controls
            ui.horizontal(|ui| {
                let label = if seq.is_playing() { "⏸ Stop" } else { "▶ Play" };
                if ui
                    .add_enabled(seq.has_audio(), egui::Button::new(label))
                    .clicked()
                {
                    seq.toggle_playback();
                }

                if ui.button("Clear").clicked() {
                    seq.clear();
                }

                ui.add_space(20.0);

                ui.label("BPM:");
                let mut bpm = seq.bpm();
                if ui
                    .add(egui::Slider::new(&mut bpm, MIN_BPM..=MAX_BPM))
                    .changed()
                {
                    seq.set_bpm(bpm);
                }

                ui.add_space(20.0);

                ui.label("Grid:");
                ui.add(egui::DragValue::new(&mut self.grid_size_input).speed(0.2));
                if ui.button("Resize").clicked() {
                    self.grid_size_input = seq.set_grid_size(self.grid_size_input);
                    self.current_visual_step = None;
                }
            });

            ui.add_space(16.0);

            let playhead = if seq.is_playing() {
                self.current_visual_step
            } else {
                None
            };
            draw_grid(ui, &mut seq, playhead);

            ui.separator();
            ui.label("Click or drag across tiles to paint notes; start a drag on a lit tile to erase");
        });
    }
}
