//! Integration tests for configuration system

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use texenc_core::codec::EncoderFormat;
use texenc_core::config::{sample_config, Codec, ConfigFile, Container, EncoderConfig};
use texenc_core::EncodeError;

#[test]
fn test_encoder_config_defaults() {
    let config = EncoderConfig::new("/tmp/out.mp4");
    assert_eq!((config.width, config.height), (640, 480));
    assert_eq!(config.mime_type, "video/avc");
    assert_eq!(config.bit_rate, 500_000);
    assert_eq!(config.frame_rate, 30);
    assert_eq!(config.key_frame_interval, 15);
    assert!(config.validate().is_ok());
}

#[test]
fn test_frame_interval() {
    let config = EncoderConfig::new("a.mp4").with_frame_rate(30);
    assert_eq!(config.frame_interval_us(), 33_333);

    let config = EncoderConfig::new("a.mp4").with_frame_rate(10);
    assert_eq!(config.frame_interval_us(), 100_000);
}

#[test]
fn test_gop_frames() {
    let config = EncoderConfig::new("a.mp4")
        .with_frame_rate(30)
        .with_key_frame_interval(2);
    assert_eq!(config.gop_frames(), 60);

    // zero interval still yields a usable group
    let config = config.with_key_frame_interval(0);
    assert_eq!(config.gop_frames(), 1);
}

#[test]
fn test_validation_rejects_bad_values() {
    let base = EncoderConfig::new("/tmp/out.mp4");

    for bad in [
        base.clone().with_size(0, 480),
        base.clone().with_size(640, 0),
        base.clone().with_frame_rate(0),
        base.clone().with_bit_rate(0),
        base.clone().with_mime_type("video/vp8"),
        EncoderConfig::new(""),
    ] {
        let err = bad.validate().unwrap_err();
        assert!(matches!(err, EncodeError::Config(_)), "{:?}", bad);
        assert!(err.is_fatal());
    }
}

#[test]
fn test_codec_mime_types() {
    assert_eq!(Codec::H264.mime_type(), "video/avc");
    assert_eq!(Codec::Hevc.mime_type(), "video/hevc");
    assert_eq!(Codec::Av1.mime_type(), "video/av01");
    assert_eq!(Codec::from_mime("VIDEO/AVC"), Some(Codec::H264));
    assert_eq!(Codec::from_mime("video/vp9"), None);
}

#[test]
fn test_codec_from_string() {
    assert_eq!("h264".parse::<Codec>().ok(), Some(Codec::H264));
    assert_eq!("hevc".parse::<Codec>().ok(), Some(Codec::Hevc));
    assert_eq!("h265".parse::<Codec>().ok(), Some(Codec::Hevc));
    assert_eq!("av1".parse::<Codec>().ok(), Some(Codec::Av1));
    assert_eq!("video/av01".parse::<Codec>().ok(), Some(Codec::Av1));
    assert!("invalid".parse::<Codec>().is_err());
}

#[test]
fn test_codec_encoder_candidates_prefer_hardware() {
    for codec in [Codec::H264, Codec::Hevc, Codec::Av1] {
        assert!(codec.encoder_candidates()[0].ends_with("_nvenc"));
    }
}

#[test]
fn test_container_from_extension() {
    assert_eq!(Container::from_path(Path::new("a.mp4")), Container::Mp4);
    assert_eq!(Container::from_path(Path::new("a.MKV")), Container::Matroska);
    assert_eq!(Container::from_path(Path::new("a.webm")), Container::WebM);
    assert_eq!(Container::from_path(Path::new("noext")), Container::Mp4);
    assert_eq!(Container::Matroska.format_name(), "matroska");
}

#[test]
fn test_encoder_format_from_config() {
    let config = EncoderConfig::new("a.mkv")
        .with_size(1280, 720)
        .with_codec(Codec::Hevc)
        .with_frame_rate(60)
        .with_key_frame_interval(1);
    let format = EncoderFormat::from_config(&config).unwrap();

    assert_eq!(format.codec, Codec::Hevc);
    assert_eq!((format.width, format.height), (1280, 720));
    assert_eq!(format.gop_size(), 60);
    assert!(format.media_format().extradata.is_empty());
}

#[test]
fn test_config_file_default() {
    let config = ConfigFile::default();
    assert_eq!(config.encoder.width, 640);
    assert_eq!(config.encoder.codec, "h264");
}

#[test]
fn test_config_file_sample_parses() {
    let config: ConfigFile = toml::from_str(&sample_config()).unwrap();
    assert_eq!(config.encoder.key_frame_interval, 15);
    assert!(config.output.directory.is_none());
}

#[test]
fn test_config_file_save_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sub").join("config.toml");

    let mut config = ConfigFile::default();
    config.encoder.width = 1920;
    config.encoder.height = 1080;
    config.encoder.codec = "av1".into();
    config.output.directory = Some(PathBuf::from("/videos"));
    config.save_to(&path).unwrap();

    let loaded = ConfigFile::load_from(&path).unwrap();
    assert_eq!(loaded.encoder.width, 1920);
    assert_eq!(loaded.encoder.codec, "av1");
    assert_eq!(loaded.output.directory, Some(PathBuf::from("/videos")));

    let session = loaded.encoder_config("clip.webm").unwrap();
    assert_eq!(session.output_path, PathBuf::from("/videos/clip.webm"));
    assert_eq!(session.codec(), Some(Codec::Av1));
    assert_eq!(session.container(), Container::WebM);
}

#[test]
fn test_config_file_load_nonexistent() {
    let config = ConfigFile::load_from("/nonexistent/path/config.toml").unwrap();
    assert_eq!(config.encoder.frame_rate, 30);
}

#[test]
fn test_config_file_rejects_bad_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[encoder\nwidth = ").unwrap();

    let err = ConfigFile::load_from(&path).unwrap_err();
    assert!(matches!(err, EncodeError::Config(_)));
}

#[test]
fn test_config_file_unknown_codec() {
    let mut config = ConfigFile::default();
    config.encoder.codec = "mpeg2".into();
    assert!(matches!(
        config.encoder_config("a.mp4"),
        Err(EncodeError::Config(_))
    ));
}
