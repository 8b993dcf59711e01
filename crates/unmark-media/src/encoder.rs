//! Encoder output arguments per encoder family.
//!
//! Hardware encoders take bitrate or quantizer parameters; the software
//! fallback takes a CRF/preset pair. The quality hint scales whichever
//! knob the family uses.

use unmark_models::Quality;

use crate::capability::SOFTWARE_ENCODER;

fn bitrate(quality: Quality) -> &'static str {
    match quality {
        Quality::Low => "2500k",
        Quality::Medium => "5M",
        Quality::High => "8M",
    }
}

fn quantizer(quality: Quality) -> &'static str {
    match quality {
        Quality::Low => "28",
        Quality::Medium => "23",
        Quality::High => "18",
    }
}

/// Output arguments (including `-c:v`) for `encoder` at `quality`.
///
/// Unknown encoder names fall through to the software configuration.
pub fn encoder_args(encoder: &str, quality: Quality) -> Vec<String> {
    let args: Vec<&str> = match encoder {
        "h264_videotoolbox" => vec![
            "-c:v",
            "h264_videotoolbox",
            "-b:v",
            bitrate(quality),
            "-allow_sw",
            "1",
            "-realtime",
            "0",
        ],
        "h264_nvenc" => vec!["-c:v", "h264_nvenc", "-preset", "p4", "-cq", quantizer(quality)],
        "h264_amf" => vec![
            "-c:v",
            "h264_amf",
            "-quality",
            "quality",
            "-rc",
            "cqp",
            "-qp_i",
            quantizer(quality),
            "-qp_p",
            quantizer(quality),
        ],
        "h264_qsv" => vec![
            "-c:v",
            "h264_qsv",
            "-preset",
            "faster",
            "-global_quality",
            quantizer(quality),
        ],
        _ => vec![
            "-c:v",
            SOFTWARE_ENCODER,
            "-preset",
            "fast",
            "-crf",
            quantizer(quality),
        ],
    };

    args.into_iter().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_encoder_uses_crf() {
        let args = encoder_args("libx264", Quality::High);
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"18".to_string()));
        assert!(!args.contains(&"-b:v".to_string()));
    }

    #[test]
    fn test_videotoolbox_uses_bitrate() {
        let args = encoder_args("h264_videotoolbox", Quality::High);
        assert!(args.contains(&"-b:v".to_string()));
        assert!(args.contains(&"8M".to_string()));
        assert!(args.contains(&"-allow_sw".to_string()));
    }

    #[test]
    fn test_quality_scales_quantizer() {
        let low = encoder_args("h264_nvenc", Quality::Low);
        let high = encoder_args("h264_nvenc", Quality::High);
        assert!(low.contains(&"28".to_string()));
        assert!(high.contains(&"18".to_string()));
    }

    #[test]
    fn test_unknown_encoder_falls_back_to_software() {
        let args = encoder_args("h264_magic", Quality::Medium);
        assert!(args.contains(&SOFTWARE_ENCODER.to_string()));
    }
}
