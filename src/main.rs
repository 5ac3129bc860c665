mod audio;
mod batch;
mod cli;
mod config;
mod encode;
mod error;
mod propose;
mod reframe;
mod render;
mod tools;
mod transcribe;
mod video;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;

use audio::decode::WaveForm;
use audio::energy::{score_or_default, score_windows, EnergyConfig};
use cli::{Cli, ProposerKind};
use encode::ffmpeg::EncodeSettings;
use error::SignalAnalysisError;
use propose::energy::EnergyProposer;
use propose::gemini::GeminiProposer;
use propose::manual::ManualProposer;
use propose::{propose_or_fallback, Segment};
use reframe::crop::TARGET_ASPECT;
use reframe::subject::SubjectLocator;
use render::overlay::{OverlayCompositor, OverlayStyle};
use render::segment::{RenderSettings, SegmentRenderer};
use render::text::load_font;
use transcribe::{FileTranscript, Transcriber};
use video::probe::SourceVideo;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let mut style = OverlayStyle::default();
    let mut energy = EnergyConfig::default();
    let mut pix_fmt = "yuv420p".to_string();
    let mut audio_bitrate = "192k".to_string();
    let mut api_key = None;

    if let Some(path) = config::discover(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                // Config values apply only where the CLI is at its default
                if cli.height == 1920 { cli.height = cfg.output.height; }
                if cli.fps == 24 { cli.fps = cfg.output.fps; }
                if cli.codec == "libx264" { cli.codec = cfg.output.codec; }
                if cli.preset == "ultrafast" { cli.preset = cfg.output.preset; }
                if cli.crf == 23 { cli.crf = cfg.output.crf; }
                if cli.threads == 4 { cli.threads = cfg.output.threads; }
                if cli.window == 60.0 { cli.window = cfg.analysis.window; }
                if cli.model == propose::gemini::DEFAULT_MODEL { cli.model = cfg.proposer.model; }
                if cli.max_segments == 3 { cli.max_segments = cfg.proposer.max_segments; }
                if cli.whisper_model == "base" { cli.whisper_model = cfg.transcribe.model; }
                if cli.language.is_none() { cli.language = cfg.transcribe.language; }
                if cli.font.is_none() { cli.font = cfg.output.font; }
                if cli.font_url.is_none() { cli.font_url = cfg.output.font_url; }
                pix_fmt = cfg.output.pix_fmt;
                audio_bitrate = cfg.output.audio_bitrate;
                energy = EnergyConfig {
                    frame_length: cfg.analysis.frame_length,
                    hop_length: cfg.analysis.hop_length,
                };
                style = cfg.overlay;
                api_key = cfg.proposer.api_key;
            }
            Err(e) => log::warn!("Failed to load config from {}: {:#}", path.display(), e),
        }
    }

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("pulsepoint - vertical highlight clips");
    log::info!("Input: {}", cli.input.display());

    let source = SourceVideo::open(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;

    let kind = cli.proposer_kind();
    let waveform = if cli.analyze || kind != ProposerKind::Manual {
        let extracted = audio::decode::extract_waveform(&source.path);
        if let Err(ref e) = extracted {
            log::warn!("Audio unavailable: {}", e);
        }
        extracted
    } else {
        Err(SignalAnalysisError::Extraction("not needed".into()))
    };

    if cli.analyze {
        return analyze(waveform.as_ref(), cli.window, &energy);
    }

    let segments = propose(&cli, kind, waveform, energy, api_key);
    for (i, s) in segments.iter().enumerate() {
        log::info!(
            "  [{}] {:.2}s - {:.2}s  {:?} ({})",
            i + 1,
            s.start_time,
            s.end_time,
            s.headline,
            s.reason
        );
    }

    let font = load_font(cli.font.as_deref(), cli.font_url.as_deref())
        .context("Caption font is required")?;
    style.font_size = style.font_size.max(1.0);
    let compositor = OverlayCompositor::new(Arc::new(font), style);

    let settings = RenderSettings {
        output_height: cli.height,
        target_aspect: TARGET_ASPECT,
        encode: EncodeSettings {
            fps: cli.fps,
            codec: cli.codec.clone(),
            preset: Some(cli.preset.clone()).filter(|p| !p.is_empty()),
            crf: Some(cli.crf),
            pix_fmt,
            threads: cli.threads,
            audio_bitrate,
            ..EncodeSettings::default()
        },
        show_progress: !cli.no_progress,
        ..RenderSettings::default()
    };
    let renderer = SegmentRenderer::new(SubjectLocator::default(), compositor, settings);

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;
    let run_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let report = batch::render_all(&renderer, &source, &segments, &cli.output, run_id)?;
    let manifest = batch::write_manifest(&report, &cli.output)?;

    for clip in &report.clips {
        println!(
            "{}  {:.1}s-{:.1}s  {}",
            clip.path.display(),
            clip.segment.start_time,
            clip.segment.end_time,
            clip.segment.headline
        );
    }
    for failure in &report.failures {
        println!("segment {} failed: {}", failure.index + 1, failure.error);
    }

    if report.is_empty() {
        anyhow::bail!("No clips were produced");
    }
    log::info!("Done! Manifest: {}", manifest.display());
    Ok(())
}

fn analyze(
    waveform: Result<&WaveForm, &SignalAnalysisError>,
    window: f64,
    energy: &EnergyConfig,
) -> Result<()> {
    match waveform.map(|w| score_windows(w, window, energy)) {
        Ok(Ok(w)) => println!(
            "{:.2}\t{:.2}\tscore={:.4}\tframes={}",
            w.start_time, w.end_time, w.score, w.window_frames
        ),
        _ => {
            let (start, end) = score_or_default(waveform, window, energy);
            println!("{:.2}\t{:.2}\tdefault", start, end);
        }
    }
    Ok(())
}

/// Pick the proposer, obtain a transcript if it needs one, and apply the
/// fallback contract. Never returns an empty list.
fn propose(
    cli: &Cli,
    kind: ProposerKind,
    waveform: Result<WaveForm, SignalAnalysisError>,
    energy: EnergyConfig,
    api_key: Option<String>,
) -> Vec<Segment> {
    let energy_proposer = |waveform| EnergyProposer::new(waveform, cli.window, energy);

    match kind {
        ProposerKind::Manual => match ManualProposer::parse(&cli.segments) {
            Ok(p) => propose_or_fallback(&p, ""),
            Err(e) => {
                log::warn!("{}; using fallback", e);
                vec![Segment::fallback()]
            }
        },
        ProposerKind::Energy => propose_or_fallback(&energy_proposer(waveform), ""),
        ProposerKind::Gemini => {
            let transcript = match transcript(cli, waveform.as_ref().ok()) {
                Ok(Some(text)) => text,
                Ok(None) => {
                    log::warn!(
                        "No transcript source (pass --transcript or build with --features transcribe); \
                         proposing the loudest window instead"
                    );
                    return propose_or_fallback(&energy_proposer(waveform), "");
                }
                Err(e) => {
                    log::warn!("Transcription failed: {:#}; proposing the loudest window instead", e);
                    return propose_or_fallback(&energy_proposer(waveform), "");
                }
            };

            let gemini = match api_key {
                Some(key) => GeminiProposer::new(key, cli.model.clone()),
                None => GeminiProposer::from_env(cli.model.clone()),
            };
            match gemini {
                Ok(p) => {
                    let p = p.with_max_segments(cli.max_segments);
                    propose_or_fallback(&p, &transcript)
                }
                Err(e) => {
                    log::warn!("Gemini unavailable: {}; using fallback", e);
                    vec![Segment::fallback()]
                }
            }
        }
    }
}

fn transcript(cli: &Cli, waveform: Option<&WaveForm>) -> Result<Option<String>> {
    if let Some(ref path) = cli.transcript {
        let empty = WaveForm::new(Vec::new(), 0);
        return FileTranscript::new(path)
            .transcribe(waveform.unwrap_or(&empty))
            .map(Some);
    }

    #[cfg(feature = "transcribe")]
    {
        let Some(audio) = waveform else {
            return Ok(None);
        };
        let model_path = transcribe::model::resolve(&cli.whisper_model)?;
        let whisper =
            transcribe::whisper::WhisperTranscriber::new(&model_path, cli.language.as_deref())?;
        return whisper.transcribe(audio).map(Some);
    }

    #[cfg(not(feature = "transcribe"))]
    {
        let _ = waveform;
        Ok(None)
    }
}
