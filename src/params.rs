pub const DEFAULT_FREQUENCY: f64 = 0.002;
pub const SPEED_SCALE: f64 = 0.003;
pub const FALLBACK_VALUE: f64 = 0.5;
pub const FALLBACK_SPEED: f64 = 0.5;

const STARTUP_VALUE: f64 = 1.0;
const STARTUP_SPEED: f64 = 0.5;

/// Readings are clamped to `[-INPUT_LIMIT, INPUT_LIMIT]` before mapping.
pub const INPUT_LIMIT: f64 = 1e6;

/// Visual parameters shared by every trace in a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveParameters {
    pub base_amplitude: f64,
    pub frequency: f64,
    pub speed: f64,
    pub lines: u32,
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
    pub line_width: f32,
    pub alpha: f32,
}

impl WaveParameters {
    pub fn new(frequency: f64) -> Self {
        let mut params = WaveParameters {
            base_amplitude: 50.0,
            frequency,
            speed: 0.002,
            lines: 1,
            hue: 0.0,
            saturation: 70.0,
            lightness: 60.0,
            line_width: 2.0,
            alpha: 0.6,
        };
        params.update(STARTUP_VALUE, STARTUP_SPEED);
        params
    }

    /// Maps one sensor reading onto the derived parameters.
    ///
    /// `value` is nominally in `[0, 1]`. Non-finite inputs are treated as zero and
    /// finite ones are clamped to [`INPUT_LIMIT`], so every derived field is finite.
    pub fn update(&mut self, value: f64, speed_input: f64) {
        let value = bounded_input(value);
        let speed_input = bounded_input(speed_input);

        self.lines = line_count(value);
        self.base_amplitude = 20.0 + value * 80.0;
        self.speed = speed_input * SPEED_SCALE;
        self.hue = (value * 360.0).rem_euclid(360.0);
    }

    pub fn apply_fallback(&mut self) {
        self.update(FALLBACK_VALUE, FALLBACK_SPEED);
    }
}

impl Default for WaveParameters {
    fn default() -> Self {
        WaveParameters::new(DEFAULT_FREQUENCY)
    }
}

fn bounded_input(raw: f64) -> f64 {
    if raw.is_finite() {
        raw.clamp(-INPUT_LIMIT, INPUT_LIMIT)
    } else {
        0.0
    }
}

/// `floor(value * 8) + 1`, replaced by 1 when the result is not a usable count.
pub fn line_count(value: f64) -> u32 {
    sanitize_lines((value * 8.0).floor() + 1.0)
}

pub fn sanitize_lines(raw: f64) -> u32 {
    if !raw.is_finite() || raw < 1.0 {
        1
    } else if raw >= u32::MAX as f64 {
        u32::MAX
    } else {
        raw as u32
    }
}
