//! ffmpeg/ffprobe subprocess backend.
//!
//! Media bytes are spooled to a temp directory, processed by the CLI tools,
//! and read back. Chunk splitting uses the segment muxer with stream copy so
//! chunks cut at keyframes and stay independently decodable.

use crate::{Error, MediaCodec, Result, SourceChunk, TranscodedSegment};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use vodforge_common::{Resolution, SourceMetadata, WatermarkPosition, WatermarkSpec};

const PROBE_TIMEOUT_SECS: u64 = 60;
const SPLIT_TIMEOUT_SECS: u64 = 300;
const TRANSCODE_TIMEOUT_SECS: u64 = 120;
const SCENE_TIMEOUT_SECS: u64 = 300;

/// Codec backend shelling out to ffmpeg and ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegCodec {
    /// Locate ffmpeg and ffprobe on PATH.
    ///
    /// # Errors
    ///
    /// Returns an error if either tool is missing.
    pub fn new() -> Result<Self> {
        Ok(Self {
            ffmpeg: crate::tools::require_tool("ffmpeg")?,
            ffprobe: crate::tools::require_tool("ffprobe")?,
        })
    }

    /// Use explicit tool paths instead of PATH lookup.
    pub fn with_paths(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    async fn run(
        &self,
        tool: &Path,
        name: &'static str,
        args: &[String],
        timeout_secs: u64,
    ) -> Result<std::process::Output> {
        tracing::debug!("{} args: {:?}", name, args);
        let child = Command::new(tool)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child)
            .await
            .map_err(|_| Error::ToolTimeout {
                tool: name.to_string(),
                secs: timeout_secs,
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::tool_failed(name, tail));
        }
        Ok(output)
    }

    async fn probe_path(&self, path: &Path) -> Result<SourceMetadata> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = self
            .run(&self.ffprobe, "ffprobe", &args, PROBE_TIMEOUT_SECS)
            .await?;

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        parsed.into_metadata()
    }

    async fn duration_of(&self, path: &Path) -> Result<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = self
            .run(&self.ffprobe, "ffprobe", &args, PROBE_TIMEOUT_SECS)
            .await?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<f64>()
            .map_err(|e| Error::parse("ffprobe", format!("bad duration '{}': {e}", text.trim())))
    }

    async fn spool(&self, dir: &Path, name: &str, data: &Bytes) -> Result<PathBuf> {
        let path = dir.join(name);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }
}

#[async_trait]
impl MediaCodec for FfmpegCodec {
    async fn probe(&self, source: &Bytes) -> Result<SourceMetadata> {
        let dir = tempfile::tempdir()?;
        let input = self.spool(dir.path(), "source.mp4", source).await?;
        self.probe_path(&input).await
    }

    async fn split(&self, source: &Bytes, chunk_secs: f64) -> Result<Vec<SourceChunk>> {
        let dir = tempfile::tempdir()?;
        let input = self.spool(dir.path(), "source.mp4", source).await?;
        let pattern = dir.path().join("chunk_%04d.mp4");

        // Stream-copy split at keyframes: chunks stay independently
        // decodable without a re-encode.
        let args = vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "segment".to_string(),
            "-segment_time".to_string(),
            chunk_secs.to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-y".to_string(),
            pattern.to_string_lossy().to_string(),
        ];
        self.run(&self.ffmpeg, "ffmpeg", &args, SPLIT_TIMEOUT_SECS)
            .await?;

        let mut chunk_paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("chunk_") {
                chunk_paths.push(entry.path());
            }
        }
        chunk_paths.sort();

        if chunk_paths.is_empty() {
            return Err(Error::tool_failed("ffmpeg", "segment muxer produced no chunks"));
        }

        let mut chunks = Vec::with_capacity(chunk_paths.len());
        for path in chunk_paths {
            let duration_secs = self.duration_of(&path).await?;
            let data = Bytes::from(tokio::fs::read(&path).await?);
            chunks.push(SourceChunk {
                data,
                duration_secs,
            });
        }
        Ok(chunks)
    }

    async fn transcode(
        &self,
        chunk: &Bytes,
        resolution: Resolution,
        watermark: Option<&WatermarkSpec>,
    ) -> Result<TranscodedSegment> {
        let dir = tempfile::tempdir()?;
        let input = self.spool(dir.path(), "chunk.mp4", chunk).await?;
        let output = dir.path().join(format!("seg_{resolution}.ts"));

        let mut filters = vec![format!("scale=-2:{}", resolution.height())];
        if let Some(wm) = watermark {
            filters.push(build_watermark_filter(wm));
        }

        let args = vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vf".to_string(),
            filters.join(","),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "medium".to_string(),
            "-crf".to_string(),
            "23".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
            // MPEG-TS output with clean timestamps so segments can be
            // concatenated by an HLS player across discontinuities.
            "-f".to_string(),
            "mpegts".to_string(),
            "-muxdelay".to_string(),
            "0".to_string(),
            "-muxpreload".to_string(),
            "0".to_string(),
            "-avoid_negative_ts".to_string(),
            "make_zero".to_string(),
            "-fflags".to_string(),
            "+genpts+igndts".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ];
        self.run(&self.ffmpeg, "ffmpeg", &args, TRANSCODE_TIMEOUT_SECS)
            .await?;

        let duration_secs = self.duration_of(&output).await?;
        let data = Bytes::from(tokio::fs::read(&output).await?);
        Ok(TranscodedSegment {
            data,
            duration_secs,
        })
    }

    async fn detect_scenes(
        &self,
        source: &Bytes,
        threshold: f32,
        min_scene_secs: f64,
    ) -> Result<Vec<f64>> {
        let dir = tempfile::tempdir()?;
        let input = self.spool(dir.path(), "source.mp4", source).await?;

        let args = vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-filter:v".to_string(),
            format!("select='gt(scene,{threshold})',showinfo"),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];
        let output = self
            .run(&self.ffmpeg, "ffmpeg", &args, SCENE_TIMEOUT_SECS)
            .await?;

        // showinfo reports matched frames on stderr.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut boundaries = parse_showinfo_times(&stderr);
        boundaries.sort_by(|a, b| a.total_cmp(b));
        boundaries.dedup();

        let mut kept: Vec<f64> = Vec::new();
        for t in boundaries {
            let previous = kept.last().copied().unwrap_or(0.0);
            if t - previous >= min_scene_secs {
                kept.push(t);
            }
        }
        Ok(kept)
    }

    async fn extract_frame(&self, source: &Bytes, at_secs: f64) -> Result<Bytes> {
        let dir = tempfile::tempdir()?;
        let input = self.spool(dir.path(), "source.mp4", source).await?;

        let metadata = self.probe_path(&input).await?;
        if at_secs < 0.0 || at_secs >= metadata.duration_secs {
            return Err(Error::InvalidInput(format!(
                "frame timestamp {at_secs}s outside source duration {}s",
                metadata.duration_secs
            )));
        }

        let output = dir.path().join("thumbnail.jpg");
        let args = vec![
            "-ss".to_string(),
            at_secs.to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ];
        self.run(&self.ffmpeg, "ffmpeg", &args, PROBE_TIMEOUT_SECS)
            .await?;

        Ok(Bytes::from(tokio::fs::read(&output).await?))
    }
}

/// Escape text for the ffmpeg drawtext filter.
///
/// drawtext treats colons, quotes, backslashes, and percent signs specially.
fn escape_drawtext(text: &str) -> String {
    let mut cleaned = text.replace('\n', " ").replace('\t', " ");
    cleaned.retain(|c| c != '\r');
    cleaned
        .replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

/// Build the drawtext filter for a watermark overlay.
fn build_watermark_filter(wm: &WatermarkSpec) -> String {
    let pos = match wm.position {
        WatermarkPosition::TopLeft => "x=10:y=10",
        WatermarkPosition::TopRight => "x=w-tw-10:y=10",
        WatermarkPosition::BottomLeft => "x=10:y=h-th-10",
        WatermarkPosition::BottomRight => "x=w-tw-10:y=h-th-10",
        WatermarkPosition::Center => "x=(w-tw)/2:y=(h-th)/2",
    };
    format!(
        "drawtext=text='{}':fontcolor=white:fontsize={}:box=1:boxcolor=black@{}:boxborderw=5:{}",
        escape_drawtext(&wm.text),
        wm.font_size,
        wm.opacity,
        pos
    )
}

/// Pull `pts_time:` values out of showinfo filter output.
fn parse_showinfo_times(stderr: &str) -> Vec<f64> {
    let mut times = Vec::new();
    for line in stderr.lines() {
        let mut rest = line;
        while let Some(pos) = rest.find("pts_time:") {
            rest = &rest[pos + "pts_time:".len()..];
            let value: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if let Ok(t) = value.parse::<f64>() {
                times.push(t);
            }
        }
    }
    times
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl FfprobeOutput {
    fn into_metadata(self) -> Result<SourceMetadata> {
        let duration_secs = self
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| Error::parse("ffprobe", "missing format duration"))?;

        let video = self
            .streams
            .into_iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| Error::parse("ffprobe", "no video stream"))?;

        Ok(SourceMetadata {
            width: video
                .width
                .ok_or_else(|| Error::parse("ffprobe", "video stream missing width"))?,
            height: video
                .height
                .ok_or_else(|| Error::parse("ffprobe", "video stream missing height"))?,
            duration_secs,
            codec: video.codec_name.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("plain"), "plain");
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
        assert_eq!(escape_drawtext("50% off"), "50\\% off");
        assert_eq!(escape_drawtext("line\nbreak"), "line break");
    }

    #[test]
    fn test_watermark_filter_positions() {
        let wm = WatermarkSpec {
            text: "demo".to_string(),
            position: WatermarkPosition::TopLeft,
            font_size: 24,
            opacity: 0.5,
        };
        let filter = build_watermark_filter(&wm);
        assert!(filter.starts_with("drawtext=text='demo'"));
        assert!(filter.ends_with("x=10:y=10"));
        assert!(filter.contains("fontsize=24"));
        assert!(filter.contains("boxcolor=black@0.5"));
    }

    #[test]
    fn test_parse_showinfo_times() {
        let stderr = "\
[Parsed_showinfo_1 @ 0x55] n:   0 pts:  12012 pts_time:3.5035 pos: 100\n\
[Parsed_showinfo_1 @ 0x55] n:   1 pts:  24024 pts_time:8.25 pos: 200\n\
frame= 120 fps= 30\n";
        let times = parse_showinfo_times(stderr);
        assert_eq!(times, vec![3.5035, 8.25]);
    }

    #[test]
    fn test_ffprobe_parse() {
        let json = r#"{
            "format": {"duration": "12.000000"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
            ]
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let meta = parsed.into_metadata().unwrap();
        assert_eq!(meta.width, 1920);
        assert_eq!(meta.height, 1080);
        assert_eq!(meta.codec, "h264");
        assert!((meta.duration_secs - 12.0).abs() < f64::EPSILON);
    }
}
