/// Short-time RMS energy, one value per analysis frame.
///
/// Timestamps are evenly spaced by `hop_length / sample_rate` and strictly
/// increasing; energies are never negative.
#[derive(Clone, Debug)]
pub struct EnergyCurve {
    /// Frame start times in seconds
    pub times: Vec<f64>,
    /// RMS amplitude per frame (linear)
    pub energy: Vec<f64>,
    /// Seconds between consecutive frames
    pub hop_seconds: f64,
}

impl EnergyCurve {
    pub fn len(&self) -> usize {
        self.energy.len()
    }

    /// Time of the last frame, i.e. the span the curve covers.
    pub fn span(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }

    pub fn peak(&self) -> f64 {
        self.energy.iter().copied().fold(0.0f64, f64::max)
    }
}

/// The highest-energy fixed-width window found on a curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnergyWindow {
    pub start_time: f64,
    pub end_time: f64,
    /// Window width in analysis frames after clamping to the curve length
    pub window_frames: usize,
    /// Summed energy inside the window
    pub score: f64,
}
