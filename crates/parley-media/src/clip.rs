use crate::buffers::BufferSnapshot;
use crate::MediaError;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const WAV_SAMPLE_RATE: u32 = 16_000;

/// Filesystem artefacts produced for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipArtifacts {
    pub wav: Option<PathBuf>,
    pub frames_dir: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

impl ClipArtifacts {
    /// The single path attached to the Answer record: the muxed clip when it
    /// exists, otherwise the best remaining artefact.
    pub fn best_path(&self) -> Option<&Path> {
        self.video
            .as_deref()
            .or(self.wav.as_deref())
            .or(self.frames_dir.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.wav.is_none() && self.frames_dir.is_none()
    }
}

/// Writes question media to disk and muxes it with the external encoder.
///
/// File names are a pure function of (session, question) so re-running a
/// flush overwrites in place instead of accumulating variants.
pub struct ClipMuxer {
    root: PathBuf,
    ffmpeg: Option<PathBuf>,
}

impl ClipMuxer {
    /// Locates the external encoder once. A missing binary is a degraded
    /// mode, not an error: WAV and frames are still written.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let ffmpeg = which::which("ffmpeg").ok();
        if ffmpeg.is_none() {
            tracing::warn!("ffmpeg not found; clips will not be muxed to mp4");
        }
        Self {
            root: root.into(),
            ffmpeg,
        }
    }

    #[cfg(test)]
    pub fn without_encoder(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ffmpeg: None,
        }
    }

    /// Persist one question's media. Returns the artefact set; empty buffers
    /// yield no artefacts at all.
    pub async fn finalize(
        &self,
        session_id: &str,
        question_no: usize,
        snapshot: BufferSnapshot,
    ) -> Result<ClipArtifacts, MediaError> {
        if snapshot.audio.is_empty() && snapshot.frames.is_empty() {
            return Ok(ClipArtifacts::default());
        }
        tokio::fs::create_dir_all(&self.root).await?;

        let stem = format!("{session_id}_q{question_no}");
        let mut artifacts = ClipArtifacts::default();

        if !snapshot.audio.is_empty() {
            let wav_path = self.root.join(format!("{stem}.wav"));
            write_wav(&wav_path, &snapshot.audio)?;
            artifacts.wav = Some(wav_path);
        }

        if !snapshot.frames.is_empty() {
            let frames_dir = self.root.join(format!("{stem}_frames"));
            tokio::fs::create_dir_all(&frames_dir).await?;
            for (i, jpeg) in snapshot.frames.iter().enumerate() {
                let frame_path = frames_dir.join(format!("frame_{i:04}.jpg"));
                tokio::fs::write(&frame_path, jpeg).await?;
            }
            artifacts.frames_dir = Some(frames_dir);
        }

        match (&artifacts.wav, &artifacts.frames_dir) {
            (Some(wav), Some(frames_dir)) => {
                let video_path = self.root.join(format!("{stem}_av.mp4"));
                match self.mux_av(frames_dir, wav, &video_path).await {
                    Ok(()) => artifacts.video = Some(video_path),
                    Err(e) => {
                        tracing::warn!(session_id, question_no, error = %e, "clip mux failed, keeping wav")
                    }
                }
            }
            (None, Some(frames_dir)) => {
                let video_path = self.root.join(format!("{stem}_video.mp4"));
                match self.mux_silent(frames_dir, &video_path).await {
                    Ok(()) => artifacts.video = Some(video_path),
                    Err(e) => {
                        tracing::warn!(session_id, question_no, error = %e, "silent clip mux failed, keeping frames")
                    }
                }
            }
            _ => {}
        }

        Ok(artifacts)
    }

    async fn mux_av(
        &self,
        frames_dir: &Path,
        wav: &Path,
        output: &Path,
    ) -> Result<(), MediaError> {
        let ffmpeg = self.encoder()?;
        let status = Command::new(ffmpeg)
            .arg("-y")
            .args(["-framerate", "1"])
            .arg("-i")
            .arg(frames_dir.join("frame_%04d.jpg"))
            .arg("-i")
            .arg(wav)
            .args(["-c:v", "libx264", "-c:a", "aac", "-pix_fmt", "yuv420p", "-shortest"])
            .arg(output)
            .output()
            .await?;
        if status.status.success() {
            Ok(())
        } else {
            Err(MediaError::Encoder(
                String::from_utf8_lossy(&status.stderr).trim().to_string(),
            ))
        }
    }

    async fn mux_silent(&self, frames_dir: &Path, output: &Path) -> Result<(), MediaError> {
        let ffmpeg = self.encoder()?;
        let status = Command::new(ffmpeg)
            .arg("-y")
            .args(["-framerate", "1"])
            .arg("-i")
            .arg(frames_dir.join("frame_%04d.jpg"))
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(output)
            .output()
            .await?;
        if status.status.success() {
            Ok(())
        } else {
            Err(MediaError::Encoder(
                String::from_utf8_lossy(&status.stderr).trim().to_string(),
            ))
        }
    }

    fn encoder(&self) -> Result<&Path, MediaError> {
        self.ffmpeg
            .as_deref()
            .ok_or_else(|| MediaError::Encoder("ffmpeg unavailable".to_string()))
    }
}

/// Concatenate PCM chunks into a mono 16-bit LE 16 kHz WAV file.
fn write_wav(path: &Path, chunks: &[Vec<u8>]) -> Result<(), MediaError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: WAV_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for chunk in chunks {
        for sample in chunk.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
        }
    }
    writer.finalize()?;
    Ok(())
}
