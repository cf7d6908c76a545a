// crates/sync-decode/src/formats.rs
//
// ffmpeg <-> host format tag mapping (spec.md §4.3/§4.4, ported from
// kitavutils.c's Kit_FindPixelFormat / Kit_FindAudioFormat and their
// inverses). This is the only module in the crate allowed to know both
// `ffmpeg_the_third` types and `sync_types::Host*Format` tags.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::util::format::sample::Sample as AvSampleFormat;
use sync_types::{ChannelLayout, HostPixelFormat, HostSampleFormat};

/// `Kit_FindPixelFormat`: every 8-to-16-bit-depth YUV420P variant maps to
/// planar YV12; the two common packed 4:2:2 layouts map straight across;
/// everything else falls back to packed ABGR8888 (spec.md §4.4).
pub fn host_pixel_format_for(fmt: Pixel) -> HostPixelFormat {
    match fmt {
        Pixel::YUV420P
        | Pixel::YUV420P9
        | Pixel::YUV420P10
        | Pixel::YUV420P12
        | Pixel::YUV420P14
        | Pixel::YUV420P16 => HostPixelFormat::Yv12,
        Pixel::YUYV422 => HostPixelFormat::Yuy2,
        Pixel::UYVY422 => HostPixelFormat::Uyvy,
        _ => HostPixelFormat::Abgr8888,
    }
}

/// Inverse of `host_pixel_format_for`, used to pick the `swscale` target
/// format. Partial — only the formats `host_pixel_format_for` can produce
/// are defined, satisfying the round-trip law in spec.md §8 on that subset.
pub fn av_pixel_format_for(fmt: HostPixelFormat) -> Pixel {
    match fmt {
        HostPixelFormat::Yv12 => Pixel::YUV420P,
        HostPixelFormat::Yuy2 => Pixel::YUYV422,
        HostPixelFormat::Uyvy => Pixel::UYVY422,
        HostPixelFormat::Abgr8888 => Pixel::RGBA,
    }
}

/// `Kit_FindAudioFormat`: u8 -> unsigned 8-bit, s16/s32 -> signed
/// system-endian, anything else (float, planar variants, ...) -> signed
/// 16-bit (spec.md §4.3).
pub fn host_sample_format_for(fmt: AvSampleFormat) -> (u8, bool, HostSampleFormat) {
    match fmt {
        AvSampleFormat::U8 | AvSampleFormat::U8P => (1, false, HostSampleFormat::U8),
        AvSampleFormat::I16 | AvSampleFormat::I16P => (2, true, HostSampleFormat::S16Sys),
        AvSampleFormat::I32 | AvSampleFormat::I32P => (4, true, HostSampleFormat::S32Sys),
        _ => (2, true, HostSampleFormat::S16Sys),
    }
}

/// Inverse of `host_sample_format_for`'s format tag, used to configure the
/// `swresample` target format.
pub fn av_sample_format_for(fmt: HostSampleFormat) -> AvSampleFormat {
    match fmt {
        HostSampleFormat::U8 => AvSampleFormat::U8,
        HostSampleFormat::S16Sys => AvSampleFormat::I16,
        HostSampleFormat::S32Sys => AvSampleFormat::I32,
    }
}

/// `Kit_FindAVChannelLayout`: channel count -> ffmpeg channel layout,
/// downmixing anything unusual to stereo (spec.md §4.3).
pub fn av_channel_layout_for(layout: ChannelLayout) -> ffmpeg::util::channel_layout::ChannelLayout {
    use ffmpeg::util::channel_layout::ChannelLayout as AvLayout;
    match layout {
        ChannelLayout::Mono => AvLayout::MONO,
        ChannelLayout::Stereo => AvLayout::STEREO,
        ChannelLayout::Quad => AvLayout::QUAD,
        ChannelLayout::FivePointOne => AvLayout::_5POINT1,
        ChannelLayout::StereoDownmix => AvLayout::STEREO_DOWNMIX,
    }
}

/// Best-effort PTS in seconds from a decoded frame and the stream's time
/// base. A packet with no DTS (`AV_NOPTS_VALUE`) contributes `0.0` rather
/// than propagating `None` — matches the original's
/// `packet->dts != AV_NOPTS_VALUE` guard (see SPEC_FULL.md §3).
pub fn pts_seconds(best_effort_ts: Option<i64>, time_base: ffmpeg::Rational) -> f64 {
    match best_effort_ts {
        Some(ts) => ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64,
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_round_trips_on_the_supported_set() {
        for host in [
            HostPixelFormat::Yv12,
            HostPixelFormat::Yuy2,
            HostPixelFormat::Uyvy,
            HostPixelFormat::Abgr8888,
        ] {
            let av = av_pixel_format_for(host);
            assert_eq!(host_pixel_format_for(av), host);
        }
    }

    #[test]
    fn sample_format_round_trips_on_the_supported_set() {
        for host in [
            HostSampleFormat::U8,
            HostSampleFormat::S16Sys,
            HostSampleFormat::S32Sys,
        ] {
            let av = av_sample_format_for(host);
            let (_, _, back) = host_sample_format_for(av);
            assert_eq!(back, host);
        }
    }

    #[test]
    fn unsupported_yuv_depths_collapse_to_yv12() {
        assert_eq!(host_pixel_format_for(Pixel::YUV420P10), HostPixelFormat::Yv12);
        assert_eq!(host_pixel_format_for(Pixel::YUV420P16), HostPixelFormat::Yv12);
    }

    #[test]
    fn pts_with_no_dts_is_zero_not_panic() {
        assert_eq!(
            pts_seconds(None, ffmpeg::Rational::new(1, 90000)),
            0.0
        );
    }
}
