use std::path::Path;
use std::process::{Command, Stdio};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::SignalAnalysisError;
use crate::tools;

/// Mono samples plus their rate. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct WaveForm {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl WaveForm {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Pull the audio track out of a video into a temporary WAV and decode it.
///
/// The WAV lives only for the duration of this call.
pub fn extract_waveform(video_path: &Path) -> Result<WaveForm, SignalAnalysisError> {
    let ffmpeg = tools::ffmpeg().map_err(|e| SignalAnalysisError::Extraction(e.to_string()))?;

    let wav = tempfile::Builder::new()
        .prefix("pulsepoint-audio-")
        .suffix(".wav")
        .tempfile()?;

    log::info!("Extracting audio from {}", video_path.display());

    let output = Command::new(ffmpeg)
        .args(["-y", "-v", "error", "-i"])
        .arg(video_path)
        .args(["-vn", "-map", "0:a:0", "-c:a", "pcm_s16le"])
        .arg(wav.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("matches no streams") {
            return Err(SignalAnalysisError::NoAudioTrack);
        }
        return Err(SignalAnalysisError::Extraction(stderr.trim().to_string()));
    }

    decode_audio(wav.path())
}

pub fn decode_audio(path: &Path) -> Result<WaveForm, SignalAnalysisError> {
    let file = std::fs::File::open(path)?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SignalAnalysisError::Decode(format!("failed to probe audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or(SignalAnalysisError::NoAudioTrack)?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(SignalAnalysisError::InvalidSampleRate(0))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SignalAnalysisError::Decode(format!("failed to create decoder: {}", e)))?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(SignalAnalysisError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(SignalAnalysisError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();

        // Downmix to mono
        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                let mono: f32 = frame_samples.iter().sum::<f32>() / channels as f32;
                all_samples.push(mono);
            }
        }
    }

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        all_samples.len(),
        sample_rate,
        all_samples.len() as f32 / sample_rate as f32
    );

    Ok(WaveForm::new(all_samples, sample_rate))
}
