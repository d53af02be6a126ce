//! Audio tools. Inputs resolve through the audio store, except
//! `extract_audio` which reads a video.

use super::{
    audio_codec, check_positive, check_time_range, secs, OutputTarget, Produced,
    VideoEditHandler, DEFAULT_AUDIO_EXT,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use video_edit_mcp_common::error::Error;

/// Sample rate used when audio from different sources is combined.
pub const MIX_SAMPLE_RATE: u32 = 44_100;

// =============================================================================
// Output Types
// =============================================================================

/// Summary reported by `audio_info`.
#[derive(Debug, Clone, Serialize)]
pub struct AudioInfo {
    pub duration: f64,
    /// Sample rate in Hz.
    pub fps: Option<u32>,
    pub channels: Option<u32>,
    pub codec: String,
}

// =============================================================================
// Parameter Types
// =============================================================================

/// Parameters for describing an audio clip.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct AudioInfoParams {
    /// Audio file path or stored audio reference.
    pub audio_path: String,
}

/// Parameters for pulling the soundtrack out of a video.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ExtractAudioParams {
    /// Video file path or stored video reference.
    pub video_path: String,
    /// Output file name, e.g. "soundtrack.mp3".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result in
    /// the audio store.
    pub return_path: bool,
}

/// Parameters for cutting a time range out of an audio clip.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct TrimAudioParams {
    /// Audio file path or stored audio reference.
    pub audio_path: String,
    /// Start of the kept range in seconds.
    pub start_time: f64,
    /// End of the kept range in seconds.
    pub end_time: f64,
    /// Output file name, e.g. "trimmed_audio.mp3".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for joining two audio clips.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ConcatenateAudioParams {
    /// First audio file path or stored audio reference.
    pub audio_path_1: String,
    /// Second audio file path or stored audio reference.
    pub audio_path_2: String,
    /// Output file name, e.g. "joined_audio.mp3".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for looping an audio clip to a length.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct LoopAudioParams {
    /// Audio file path or stored audio reference.
    pub audio_path: String,
    /// Target length in seconds.
    pub duration: f64,
    /// Output file name, e.g. "looped_audio.mp3".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for scaling volume.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct AdjustVolumeParams {
    /// Audio file path or stored audio reference.
    pub audio_path: String,
    /// Volume multiplier, e.g. 1.0 for unchanged, 2.0 for double.
    pub volume_level: f64,
    /// Output file name, e.g. "louder_audio.mp3".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for fading audio in or out.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct FadeAudioParams {
    /// Audio file path or stored audio reference.
    pub audio_path: String,
    /// Fade length in seconds.
    pub fade_duration: f64,
    /// Output file name, e.g. "fadein_audio.mp3".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

/// Parameters for mixing tracks on top of each other.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct MixAudioParams {
    /// Audio file paths or stored audio references.
    pub audio_paths: Vec<String>,
    /// Output file name, e.g. "mixed_audio.mp3".
    pub output_name: String,
    /// true writes the file and returns its path; false stores the result.
    pub return_path: bool,
}

// =============================================================================
// Filter Construction
// =============================================================================

/// Filtergraph resampling `inputs` tracks to a common format and joining
/// them end to end into `[out]`.
pub fn concat_graph(inputs: usize) -> String {
    let mut filters: Vec<String> = (0..inputs)
        .map(|i| {
            format!(
                "[{i}:a]aresample={rate},aformat=channel_layouts=stereo[a{i}]",
                i = i,
                rate = MIX_SAMPLE_RATE
            )
        })
        .collect();
    let labels: String = (0..inputs).map(|i| format!("[a{}]", i)).collect();
    filters.push(format!("{}concat=n={}:v=0:a=1[out]", labels, inputs));
    filters.join(";")
}

/// Filtergraph layering `inputs` tracks into `[out]`, as long as the longest.
pub fn mix_graph(inputs: usize) -> String {
    let labels: String = (0..inputs).map(|i| format!("[{}:a]", i)).collect();
    if inputs == 1 {
        return format!("{}anull[out]", labels);
    }
    format!("{}amix=inputs={}:duration=longest[out]", labels, inputs)
}

// =============================================================================
// Tool Implementations
// =============================================================================

impl VideoEditHandler {
    /// Run ffmpeg with `args` into an audio-only `target`, then deliver it.
    async fn render_audio(&self, mut args: Vec<String>, target: OutputTarget) -> Result<Produced, Error> {
        args.push("-vn".to_string());
        if let Some(codec) = audio_codec(&target.extension()) {
            args.extend(["-c:a".to_string(), codec.to_string()]);
        }
        args.push(target.arg());
        self.ffmpeg().run_owned(&args).await?;
        self.deliver_audio(target).await
    }

    /// Apply a single `-af` chain to an audio clip.
    async fn filter_audio(
        &self,
        audio_path: &str,
        filter: impl FnOnce(f64) -> String,
        output_name: &str,
        return_path: bool,
    ) -> Result<Produced, Error> {
        let clip = self.registry.audios.load(audio_path).await?;
        let target = self.output_target(output_name, return_path, DEFAULT_AUDIO_EXT).await?;
        let args = vec![
            "-i".to_string(),
            clip.input_arg(),
            "-af".to_string(),
            filter(clip.duration),
        ];
        self.render_audio(args, target).await
    }

    /// Describe an audio clip.
    #[instrument(level = "info", skip(self))]
    pub async fn audio_info(&self, params: AudioInfoParams) -> Result<AudioInfo, Error> {
        let clip = self.registry.audios.load(&params.audio_path).await?;
        Ok(AudioInfo {
            duration: clip.duration,
            fps: clip.sample_rate,
            channels: clip.channels,
            codec: clip.codec.clone(),
        })
    }

    /// Pull the soundtrack out of a video.
    #[instrument(level = "info", skip(self))]
    pub async fn extract_audio(&self, params: ExtractAudioParams) -> Result<Produced, Error> {
        let clip = self.registry.videos.load(&params.video_path).await?;
        if !clip.has_audio() {
            return Err(Error::validation("Video has no audio track"));
        }

        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_AUDIO_EXT)
            .await?;
        let args = vec![
            "-i".to_string(),
            clip.input_arg(),
            "-map".to_string(),
            "0:a:0".to_string(),
        ];

        let produced = self.render_audio(args, target).await?;
        info!(output = %produced.value(), "Extracted audio");
        Ok(produced)
    }

    /// Keep `[start_time, end_time)` of an audio clip.
    #[instrument(level = "info", skip(self))]
    pub async fn trim_audio(&self, params: TrimAudioParams) -> Result<Produced, Error> {
        let clip = self.registry.audios.load(&params.audio_path).await?;
        check_time_range(params.start_time, params.end_time, clip.duration)?;

        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_AUDIO_EXT)
            .await?;
        let args = vec![
            "-ss".to_string(),
            secs(params.start_time),
            "-i".to_string(),
            clip.input_arg(),
            "-t".to_string(),
            secs(params.end_time - params.start_time),
        ];

        let produced = self.render_audio(args, target).await?;
        info!(output = %produced.value(), "Trimmed audio");
        Ok(produced)
    }

    /// Play one audio clip after another.
    #[instrument(level = "info", skip(self))]
    pub async fn concatenate_audio(&self, params: ConcatenateAudioParams) -> Result<Produced, Error> {
        let first = self.registry.audios.load(&params.audio_path_1).await?;
        let second = self.registry.audios.load(&params.audio_path_2).await?;

        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_AUDIO_EXT)
            .await?;
        let args = vec![
            "-i".to_string(),
            first.input_arg(),
            "-i".to_string(),
            second.input_arg(),
            "-filter_complex".to_string(),
            concat_graph(2),
            "-map".to_string(),
            "[out]".to_string(),
        ];

        let produced = self.render_audio(args, target).await?;
        info!(
            output = %produced.value(),
            duration = first.duration + second.duration,
            "Concatenated audio"
        );
        Ok(produced)
    }

    /// Repeat an audio clip until it lasts `duration` seconds.
    #[instrument(level = "info", skip(self))]
    pub async fn loop_audio(&self, params: LoopAudioParams) -> Result<Produced, Error> {
        check_positive("Duration", params.duration)?;

        let clip = self.registry.audios.load(&params.audio_path).await?;
        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_AUDIO_EXT)
            .await?;
        let args = vec![
            "-stream_loop".to_string(),
            "-1".to_string(),
            "-i".to_string(),
            clip.input_arg(),
            "-t".to_string(),
            secs(params.duration),
        ];

        let produced = self.render_audio(args, target).await?;
        info!(output = %produced.value(), duration = params.duration, "Looped audio");
        Ok(produced)
    }

    /// Scale the volume of an audio clip.
    #[instrument(level = "info", skip(self))]
    pub async fn adjust_vol(&self, params: AdjustVolumeParams) -> Result<Produced, Error> {
        if !(params.volume_level.is_finite() && params.volume_level > 0.0) {
            return Err(Error::validation(
                "Volume level must be positive (e.g., 1.0 for normal, 2.0 for double)",
            ));
        }

        let level = params.volume_level;
        let produced = self
            .filter_audio(
                &params.audio_path,
                |_| format!("volume={}", level),
                &params.output_name,
                params.return_path,
            )
            .await?;
        info!(output = %produced.value(), level, "Adjusted volume");
        Ok(produced)
    }

    /// Fade audio in from silence.
    #[instrument(level = "info", skip(self))]
    pub async fn fadein_audio(&self, params: FadeAudioParams) -> Result<Produced, Error> {
        check_positive("Fade duration", params.fade_duration)?;

        let fade = params.fade_duration;
        self.filter_audio(
            &params.audio_path,
            |_| format!("afade=t=in:st=0:d={}", secs(fade)),
            &params.output_name,
            params.return_path,
        )
        .await
    }

    /// Fade audio out to silence.
    #[instrument(level = "info", skip(self))]
    pub async fn fadeout_audio(&self, params: FadeAudioParams) -> Result<Produced, Error> {
        check_positive("Fade duration", params.fade_duration)?;

        let fade = params.fade_duration;
        self.filter_audio(
            &params.audio_path,
            |duration| format!("afade=t=out:st={}:d={}", secs((duration - fade).max(0.0)), secs(fade)),
            &params.output_name,
            params.return_path,
        )
        .await
    }

    /// Layer audio tracks on top of each other.
    #[instrument(level = "info", skip(self))]
    pub async fn mix_audio_tracks(&self, params: MixAudioParams) -> Result<Produced, Error> {
        if params.audio_paths.is_empty() {
            return Err(Error::validation("At least one audio track is required"));
        }

        let mut clips = Vec::with_capacity(params.audio_paths.len());
        for path in &params.audio_paths {
            clips.push(self.registry.audios.load(path).await?);
        }

        let mut args = Vec::new();
        for clip in &clips {
            args.extend(["-i".to_string(), clip.input_arg()]);
        }

        let target = self
            .output_target(&params.output_name, params.return_path, DEFAULT_AUDIO_EXT)
            .await?;
        args.extend([
            "-filter_complex".to_string(),
            mix_graph(clips.len()),
            "-map".to_string(),
            "[out]".to_string(),
            "-ar".to_string(),
            MIX_SAMPLE_RATE.to_string(),
        ]);

        let produced = self.render_audio(args, target).await?;
        info!(output = %produced.value(), tracks = clips.len(), "Mixed audio tracks");
        Ok(produced)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
