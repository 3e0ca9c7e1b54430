use iced::widget::button as button_widget;
use iced::widget::canvas::{Canvas, Frame, Geometry, Path, Program, Stroke};
use iced::widget::container as container_widget;
use iced::widget::{button, column, container, pick_list, row, text, Column};
use iced::theme;
use iced::{Alignment, Background, Color, Command, Element, Length, Renderer, Theme};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Instant;

use serial_wave::animator::Animator;
use serial_wave::config::Settings;
use serial_wave::params::WaveParameters;
use serial_wave::render::{effective_lines, wave_traces};
use serial_wave::serial_link::{available_ports, ConnectionState, Readout, SerialLink};
use serial_wave::snapshot::{save_png, BACKGROUND};

fn color_bg() -> Color {
    Color::from_rgb8(10, 12, 16)
}

fn color_surface() -> Color {
    Color::from_rgb8(20, 26, 34)
}

fn color_surface_alt() -> Color {
    Color::from_rgb8(26, 34, 44)
}

fn color_border() -> Color {
    Color::from_rgb8(40, 52, 66)
}

fn color_text() -> Color {
    Color::from_rgb8(236, 242, 248)
}

fn color_muted() -> Color {
    Color::from_rgb8(150, 168, 186)
}

fn color_accent() -> Color {
    Color::from_rgb8(34, 211, 238)
}

fn color_live() -> Color {
    Color::from_rgb8(40, 167, 69)
}

fn color_danger() -> Color {
    Color::from_rgb8(220, 53, 69)
}

#[derive(Debug, Clone)]
pub enum Message {
    Frame,
    RefreshPorts,
    PortSelected(String),
    ToggleConnection,
    SaveSnapshot,
    SnapshotPathPicked(Option<PathBuf>),
}

pub struct App {
    settings: Settings,
    ports: Vec<String>,
    selected_port: Option<String>,
    link: Option<SerialLink>,
    animator: Animator,
    readout: Option<Readout>,
    last_state: ConnectionState,
    status: String,
}

impl App {
    fn with_settings(settings: Settings) -> Self {
        let animator = Animator::new(
            WaveParameters::new(settings.frequency),
            settings.fallback_window(),
            Instant::now(),
        );
        App {
            selected_port: settings.port.clone(),
            settings,
            ports: Vec::new(),
            link: None,
            animator,
            readout: None,
            last_state: ConnectionState::Disconnected,
            status: "Idle".to_string(),
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.link.as_ref().map_or(ConnectionState::Disconnected, |l| l.state())
    }

    fn refresh_ports(&mut self) {
        match available_ports() {
            Ok(ports) => {
                if self.selected_port.is_none() && !ports.is_empty() {
                    self.selected_port = Some(ports[0].clone());
                }
                self.ports = ports;
            }
            Err(e) => {
                warn!("port listing failed: {}", e);
                self.status = format!("Port error: {}", e);
            }
        }
    }

    fn connect(&mut self) {
        if let Some(mut old) = self.link.take() {
            old.disconnect();
        }
        let port = match self.selected_port.clone() {
            Some(p) => p,
            None => {
                self.status = "Select a serial port".to_string();
                return;
            }
        };
        match SerialLink::connect(&port, &self.settings) {
            Ok(link) => {
                self.link = Some(link);
                self.status = format!("Opening {}", port);
            }
            Err(e) => {
                self.status = format!("Link error: {}", e);
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.disconnect();
            info!("disconnected from {}", link.port_name());
        }
        self.last_state = ConnectionState::Disconnected;
        self.status = "Disconnected".to_string();
    }

    fn on_frame(&mut self) {
        let now = Instant::now();
        if let Some(link) = self.link.as_mut() {
            let records = link.drain();
            self.animator.ingest_all(records, now);
            if let Some(r) = link.readout() {
                self.readout = Some(r);
            }
            let state = link.state();
            if state != self.last_state {
                self.status = match state {
                    ConnectionState::Connected => format!("Streaming from {}", link.port_name()),
                    ConnectionState::Error => "Connection lost, reconnect".to_string(),
                    other => other.to_string(),
                };
                self.last_state = state;
            }
        }
        if self.animator.tick(now) {
            debug!("no input for {} ms, idle animation", self.settings.fallback_ms);
        }
    }

    fn toggle_button(&self) -> iced::widget::Button<'_, Message> {
        match self.connection_state() {
            ConnectionState::Disconnected => button("Connect")
                .on_press(Message::ToggleConnection)
                .padding(10)
                .style(theme::Button::Custom(Box::new(PrimaryButton))),
            ConnectionState::Connecting => button("Connecting...")
                .padding(10)
                .style(theme::Button::Custom(Box::new(GhostButton))),
            ConnectionState::Connected => button("Connected")
                .on_press(Message::ToggleConnection)
                .padding(10)
                .style(theme::Button::Custom(Box::new(SolidButton { bg: color_live() }))),
            ConnectionState::Error => button("Reconnect")
                .on_press(Message::ToggleConnection)
                .padding(10)
                .style(theme::Button::Custom(Box::new(SolidButton { bg: color_danger() }))),
        }
    }
}

impl iced::Application for App {
    type Executor = iced::executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = Settings;

    fn new(settings: Settings) -> (Self, Command<Self::Message>) {
        let mut app = App::with_settings(settings);
        app.refresh_ports();
        (app, Command::none())
    }

    fn title(&self) -> String {
        "Serial Wave".to_string()
    }

    fn subscription(&self) -> iced::Subscription<Self::Message> {
        iced::window::frames().map(|_| Message::Frame)
    }

    fn update(&mut self, message: Self::Message) -> Command<Self::Message> {
        match message {
            Message::Frame => {
                self.on_frame();
                Command::none()
            }
            Message::RefreshPorts => {
                self.refresh_ports();
                Command::none()
            }
            Message::PortSelected(port) => {
                self.selected_port = Some(port);
                Command::none()
            }
            Message::ToggleConnection => {
                match self.connection_state() {
                    ConnectionState::Connected => self.disconnect(),
                    ConnectionState::Connecting => {}
                    ConnectionState::Disconnected | ConnectionState::Error => self.connect(),
                }
                Command::none()
            }
            Message::SaveSnapshot => Command::perform(
                async {
                    rfd::AsyncFileDialog::new()
                        .add_filter("PNG image", &["png"])
                        .set_file_name("serial-wave.png")
                        .save_file()
                        .await
                        .map(|f| f.path().to_path_buf())
                },
                Message::SnapshotPathPicked,
            ),
            Message::SnapshotPathPicked(path) => {
                if let Some(path) = path {
                    let result = save_png(
                        &path,
                        self.animator.params(),
                        self.animator.phase(),
                        self.settings.snapshot_width,
                        self.settings.snapshot_height,
                        self.settings.max_lines,
                    );
                    self.status = match result {
                        Ok(()) => format!("Saved {}", path.display()),
                        Err(e) => format!("Snapshot failed: {}", e),
                    };
                }
                Command::none()
            }
        }
    }

    fn view(&self) -> Element<'_, Self::Message> {
        let params = self.animator.params();

        let (complexity, speed, received) = match &self.readout {
            Some(r) => (
                r.record.complexity().to_string(),
                format!("{:.2}", r.record.speed),
                r.received_at.format("%H:%M:%S").to_string(),
            ),
            None => ("-".to_string(), "-".to_string(), "never".to_string()),
        };

        let connection_card = card(
            "Device",
            column![
                row![
                    text("Port:"),
                    pick_list(self.ports.clone(), self.selected_port.clone(), Message::PortSelected),
                    button("Refresh")
                        .on_press(Message::RefreshPorts)
                        .style(theme::Button::Custom(Box::new(GhostButton))),
                    text(format!("{} baud, {} framing", self.settings.baud_rate, self.settings.framing))
                        .style(color_muted()),
                ]
                .spacing(10)
                .align_items(Alignment::Center),
                row![self.toggle_button(), text(&self.status).style(color_muted()),]
                    .spacing(10)
                    .align_items(Alignment::Center),
            ],
        );

        let mode = if self.animator.in_fallback() { "idle" } else { "live" };
        let quiet_ms = self.animator.quiet_for(Instant::now()).as_millis();
        let readout_card = card(
            "Input",
            column![
                row![
                    text(format!("Complexity: {}", complexity)),
                    text(format!("Speed: {}", speed)),
                    text(format!("Last record: {}", received)).style(color_muted()),
                ]
                .spacing(18),
                row![
                    text(format!("Lines drawn: {}", effective_lines(params.lines, self.settings.max_lines)))
                        .style(color_muted()),
                    text(format!("Mode: {}, last input {} ms ago", mode, quiet_ms)).style(color_muted()),
                    button("Save PNG")
                        .on_press(Message::SaveSnapshot)
                        .style(theme::Button::Custom(Box::new(GhostButton))),
                ]
                .spacing(18)
                .align_items(Alignment::Center),
            ],
        );

        let wave = Canvas::new(WaveView {
            params: params.clone(),
            phase: self.animator.phase(),
            max_lines: self.settings.max_lines,
        })
        .width(Length::Fill)
        .height(Length::Fill);

        let body = column![row![connection_card, readout_card].spacing(14), wave]
            .spacing(14)
            .padding(14);

        container(body)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(theme::Container::from(body_style))
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn card<'a>(title: &str, content: Column<'a, Message>) -> Element<'a, Message> {
    container(
        column![
            container(text(title).size(15).style(color_text()))
                .padding([6, 10])
                .width(Length::Fill)
                .style(theme::Container::from(header_style)),
            content.spacing(12),
        ]
        .spacing(12),
    )
    .padding(14)
    .width(Length::Fill)
    .style(theme::Container::from(card_style))
    .into()
}

fn header_style(_theme: &Theme) -> container_widget::Appearance {
    container_widget::Appearance {
        background: Some(Background::Color(color_surface_alt())),
        text_color: Some(color_text()),
        border_radius: 10.0.into(),
        border_width: 1.0,
        border_color: color_border(),
    }
}

fn card_style(_theme: &Theme) -> container_widget::Appearance {
    container_widget::Appearance {
        background: Some(Background::Color(color_surface())),
        text_color: Some(color_text()),
        border_radius: 14.0.into(),
        border_width: 1.0,
        border_color: color_border(),
    }
}

fn body_style(_theme: &Theme) -> container_widget::Appearance {
    container_widget::Appearance {
        background: Some(Background::Color(color_bg())),
        text_color: Some(color_text()),
        ..Default::default()
    }
}

struct PrimaryButton;

impl button_widget::StyleSheet for PrimaryButton {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> button_widget::Appearance {
        button_widget::Appearance {
            background: Some(Background::Color(color_accent())),
            text_color: Color::from_rgb8(6, 16, 20),
            border_radius: 10.0.into(),
            border_width: 1.0,
            border_color: color_accent(),
            ..Default::default()
        }
    }

    fn hovered(&self, style: &Self::Style) -> button_widget::Appearance {
        let mut active = self.active(style);
        active.background = Some(Background::Color(Color::from_rgb8(74, 222, 239)));
        active
    }

    fn pressed(&self, style: &Self::Style) -> button_widget::Appearance {
        let mut active = self.active(style);
        active.background = Some(Background::Color(Color::from_rgb8(22, 189, 214)));
        active
    }
}

struct GhostButton;

impl button_widget::StyleSheet for GhostButton {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> button_widget::Appearance {
        button_widget::Appearance {
            background: Some(Background::Color(color_surface_alt())),
            text_color: color_text(),
            border_radius: 10.0.into(),
            border_width: 1.0,
            border_color: color_border(),
            ..Default::default()
        }
    }

    fn hovered(&self, style: &Self::Style) -> button_widget::Appearance {
        let mut active = self.active(style);
        active.background = Some(Background::Color(Color::from_rgb8(36, 46, 60)));
        active
    }

    fn pressed(&self, style: &Self::Style) -> button_widget::Appearance {
        let mut active = self.active(style);
        active.background = Some(Background::Color(Color::from_rgb8(28, 38, 50)));
        active
    }
}

/// Filled button in a state colour (green when live, red when the link failed).
struct SolidButton {
    bg: Color,
}

impl button_widget::StyleSheet for SolidButton {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> button_widget::Appearance {
        button_widget::Appearance {
            background: Some(Background::Color(self.bg)),
            text_color: Color::WHITE,
            border_radius: 10.0.into(),
            border_width: 1.0,
            border_color: self.bg,
            ..Default::default()
        }
    }

    fn hovered(&self, style: &Self::Style) -> button_widget::Appearance {
        let mut active = self.active(style);
        active.background = Some(Background::Color(Color { a: 0.85, ..self.bg }));
        active
    }
}

struct WaveView {
    params: WaveParameters,
    phase: f64,
    max_lines: u32,
}

impl<Message> Program<Message, Renderer> for WaveView {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: iced::Rectangle,
        _cursor: iced::mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        let [r, g, b] = BACKGROUND;
        let bg = Path::rectangle(iced::Point::ORIGIN, frame.size());
        frame.fill(&bg, Color::from_rgb8(r, g, b));

        let width = frame.size().width;
        let height = frame.size().height;

        for trace in wave_traces(&self.params, self.phase, width, height, self.max_lines) {
            if trace.points.len() < 2 {
                continue;
            }
            let path = Path::new(|builder| {
                for (i, &(x, y)) in trace.points.iter().enumerate() {
                    if i == 0 {
                        builder.move_to(iced::Point::new(x, y));
                    } else {
                        builder.line_to(iced::Point::new(x, y));
                    }
                }
            });
            let color = Color::from_rgba(trace.color.r, trace.color.g, trace.color.b, trace.color.a);
            frame.stroke(&path, Stroke::default().with_width(self.params.line_width).with_color(color));
        }

        vec![frame.into_geometry()]
    }
}
