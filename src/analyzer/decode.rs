use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("symphonia decode error: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("no audio track found")]
    NoTrack,
    #[error("unknown sample rate")]
    UnknownSampleRate,
    #[error("file decoded to zero samples")]
    Empty,
}

/// Decoded mono PCM.
#[derive(Debug, Clone)]
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Samples covering `[offset, offset + length)` seconds, clipped to the signal.
    pub fn window(&self, offset_secs: f64, length_secs: f64) -> &[f32] {
        let rate = self.sample_rate as f64;
        let start = ((offset_secs.max(0.0) * rate) as usize).min(self.samples.len());
        let end = (((offset_secs + length_secs).max(0.0) * rate) as usize)
            .clamp(start, self.samples.len());
        &self.samples[start..end]
    }

    /// Same audio at another rate.
    pub fn resampled(&self, target_rate: u32) -> MonoAudio {
        MonoAudio {
            samples: resample(&self.samples, self.sample_rate, target_rate),
            sample_rate: target_rate,
        }
    }
}

/// Decode any symphonia-supported file to mono f32 at its native rate.
/// Channels are averaged.
pub fn load_mono(path: &Path) -> Result<MonoAudio, DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let (track_id, codec_params) = {
        let track = format.default_track().ok_or(DecodeError::NoTrack)?;
        (track.id, track.codec_params.clone())
    };
    let sample_rate = codec_params.sample_rate.ok_or(DecodeError::UnknownSampleRate)?;

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut mono = Vec::<f32>::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frame: skip it, keep the rest of the file
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);

        if sample_buf
            .as_ref()
            .map(|b| b.capacity() < decoded.capacity() * channels)
            .unwrap_or(true)
        {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        mono.extend(
            buf.samples()
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    if mono.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(MonoAudio {
        samples: mono,
        sample_rate,
    })
}

/// Change sample rate.
///
/// Downsampling averages each output sample's source span (a box low-pass that
/// keeps aliasing out of the RMS and onset envelopes); upsampling interpolates linearly.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize).max(1);

    if ratio > 1.0 {
        (0..out_len)
            .map(|i| {
                let start = ((i as f64 * ratio) as usize).min(samples.len() - 1);
                let end = (((i + 1) as f64 * ratio) as usize).clamp(start + 1, samples.len());
                let span = &samples[start..end];
                span.iter().sum::<f32>() / span.len() as f32
            })
            .collect()
    } else {
        (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = pos as usize;
                let frac = (pos - idx as f64) as f32;
                let a = samples[idx.min(samples.len() - 1)];
                let b = samples[(idx + 1).min(samples.len() - 1)];
                a + (b - a) * frac
            })
            .collect()
    }
}
