//! libav-backed encoder variants.
//!
//! All three compiled-in backends go through the same thin wrapper;
//! only the libav encoder name differs (`libx264`/`libx265`,
//! `h264_nvenc`/`hevc_nvenc`, `h264_vaapi`/`hevc_vaapi`).

use bytes::{Bytes, BytesMut};
use ffmpeg_next as ffmpeg;

use super::{Codec, EncoderBackend, EncoderSettings};
use crate::error::VideoError;
use crate::sink::ShardSink;

fn encode_err(e: ffmpeg::Error) -> VideoError {
    VideoError::EncodeFailed(e.to_string())
}

/// Thin wrapper over one libav video encoder.
pub struct FfmpegBackend {
    encoder: ffmpeg::encoder::video::Encoder,
    codec: Codec,
    pending: Option<ffmpeg::frame::Video>,
    pts: i64,
}

impl FfmpegBackend {
    /// Software x264/x265 encoder.
    #[cfg(feature = "x264")]
    pub fn software(
        settings: &EncoderSettings,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Self, VideoError> {
        let name = match settings.codec {
            Codec::H264 => "libx264",
            Codec::H265 => "libx265",
        };
        Self::open(name, settings, width, height, fps, ffmpeg::format::Pixel::YUV420P)
    }

    /// NVIDIA hardware encoder.
    #[cfg(feature = "nvenc")]
    pub fn nvenc(
        settings: &EncoderSettings,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Self, VideoError> {
        let name = match settings.codec {
            Codec::H264 => "h264_nvenc",
            Codec::H265 => "hevc_nvenc",
        };
        Self::open(name, settings, width, height, fps, ffmpeg::format::Pixel::NV12)
    }

    /// VAAPI hardware encoder.
    #[cfg(feature = "vaapi")]
    pub fn vaapi(
        settings: &EncoderSettings,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Self, VideoError> {
        let name = match settings.codec {
            Codec::H264 => "h264_vaapi",
            Codec::H265 => "hevc_vaapi",
        };
        Self::open(name, settings, width, height, fps, ffmpeg::format::Pixel::NV12)
    }

    fn open(
        name: &str,
        settings: &EncoderSettings,
        width: u32,
        height: u32,
        fps: f32,
        format: ffmpeg::format::Pixel,
    ) -> Result<Self, VideoError> {
        ffmpeg::init().map_err(encode_err)?;
        let codec = ffmpeg::encoder::find_by_name(name)
            .ok_or_else(|| VideoError::UnsupportedEncoder(name.to_string()))?;

        let mut enc = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(encode_err)?;
        enc.set_width(width);
        enc.set_height(height);
        enc.set_format(format);
        enc.set_bit_rate(settings.bitrate as usize);
        enc.set_time_base(ffmpeg::Rational::new(1, fps.round() as i32));
        enc.set_max_b_frames(0);
        // Keyframes are driven by the orchestrator's IDR requests, not
        // a fixed GOP cadence.
        enc.set_gop(u32::MAX);

        let encoder = enc.open().map_err(encode_err)?;
        Ok(Self {
            encoder,
            codec: settings.codec,
            pending: None,
            pts: 0,
        })
    }

    /// Hand over the next raw frame to encode. Pixel acquisition
    /// (GPU download, capture, test pattern) is the embedder's job.
    pub fn submit_frame(&mut self, frame: ffmpeg::frame::Video) {
        self.pending = Some(frame);
    }
}

impl EncoderBackend for FfmpegBackend {
    fn codec(&self) -> Codec {
        self.codec
    }

    fn encode(
        &mut self,
        _sink: &ShardSink,
        idr: bool,
        _target_timestamp_ns: u64,
    ) -> Result<Option<Bytes>, VideoError> {
        let Some(mut frame) = self.pending.take() else {
            // Nothing submitted since the last call; frame dropped.
            return Ok(None);
        };

        frame.set_pts(Some(self.pts));
        self.pts += 1;
        frame.set_kind(if idr {
            ffmpeg::picture::Type::I
        } else {
            ffmpeg::picture::Type::None
        });

        self.encoder.send_frame(&frame).map_err(encode_err)?;

        let mut out = BytesMut::new();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            if let Some(data) = packet.data() {
                out.extend_from_slice(data);
            }
        }
        Ok((!out.is_empty()).then(|| out.freeze()))
    }
}
