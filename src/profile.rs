//! Stream configuration: which profile each stream kind is opened with.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::traits::{CameraError, DepthDevice, FourCC, Result, StreamKind, StreamProfile};

/// Frame rate a `BestQuality` profile should reach.
const BEST_QUALITY_MIN_FPS: u32 = 30;

/// Preference used when enabling all streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Largest image that still runs at 30 fps.
    #[default]
    BestQuality,
    /// Largest image regardless of frame rate.
    LargestImage,
    /// Highest frame rate regardless of image size.
    HighestFramerate,
}

impl Preset {
    /// Pick the preferred profile out of candidates of one kind.
    pub fn select<'a, I>(self, candidates: I) -> Option<&'a StreamProfile>
    where
        I: IntoIterator<Item = &'a StreamProfile>,
    {
        let candidates: Vec<&StreamProfile> = candidates.into_iter().collect();
        match self {
            Self::BestQuality => candidates
                .iter()
                .copied()
                .filter(|p| p.fps >= BEST_QUALITY_MIN_FPS)
                .max_by(|a, b| by_size(a, b))
                .or_else(|| candidates.iter().copied().max_by(|a, b| by_size(a, b))),
            Self::LargestImage => candidates.into_iter().max_by(|a, b| by_size(a, b)),
            Self::HighestFramerate => candidates.into_iter().max_by(|a, b| {
                a.fps
                    .cmp(&b.fps)
                    .then_with(|| a.format.pixel_count().cmp(&b.format.pixel_count()))
                    .then_with(|| format_rank(a.format.fourcc).cmp(&format_rank(b.format.fourcc)))
            }),
        }
    }
}

fn by_size(a: &StreamProfile, b: &StreamProfile) -> Ordering {
    a.format
        .pixel_count()
        .cmp(&b.format.pixel_count())
        .then_with(|| a.fps.cmp(&b.fps))
        .then_with(|| format_rank(a.format.fourcc).cmp(&format_rank(b.format.fourcc)))
}

/// Higher is preferred: uncompressed before compressed.
fn format_rank(fourcc: FourCC) -> u8 {
    if fourcc.is_compressed() {
        0
    } else if fourcc.bytes_per_pixel().is_some() {
        2
    } else {
        1
    }
}

/// The frame rate most of `rates` share, the lowest one on ties.
fn shared_fps<I: IntoIterator<Item = u32>>(rates: I) -> Option<u32> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for fps in rates {
        *counts.entry(fps).or_default() += 1;
    }
    // `max_by_key` keeps the last maximum, so walk from the highest rate.
    counts
        .into_iter()
        .rev()
        .max_by_key(|&(_, count)| count)
        .map(|(fps, _)| fps)
}

/// `profile` with its frame rate swapped for `fps`, if the device offers it.
fn at_fps(profiles: &[StreamProfile], profile: &StreamProfile, fps: u32) -> Option<StreamProfile> {
    profiles
        .iter()
        .find(|p| p.kind == profile.kind && p.format == profile.format && p.fps == fps)
        .cloned()
}

/// Explicit constraints for one stream; unset fields match anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamRequest {
    /// Required width.
    pub width: Option<u32>,
    /// Required height.
    pub height: Option<u32>,
    /// Required pixel format.
    pub fourcc: Option<FourCC>,
    /// Required frame rate.
    pub fps: Option<u32>,
}

impl StreamRequest {
    /// Whether `profile` satisfies every set constraint.
    pub fn matches(&self, profile: &StreamProfile) -> bool {
        self.width.is_none_or(|w| w == profile.format.width)
            && self.height.is_none_or(|h| h == profile.format.height)
            && self.fourcc.is_none_or(|f| f == profile.format.fourcc)
            && self.fps.is_none_or(|fps| fps == profile.fps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Request(StreamRequest),
    Disabled,
}

/// Builder deciding which streams to open and how.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    preset: Option<Preset>,
    selections: BTreeMap<StreamKind, Selection>,
}

impl StreamConfig {
    /// Empty configuration; nothing is enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable every stream the device supports, picking profiles by `preset`.
    pub fn enable_all(&mut self, preset: Preset) -> &mut Self {
        self.preset = Some(preset);
        self
    }

    /// Enable `kind` with explicit constraints.
    pub fn enable_stream(&mut self, kind: StreamKind, request: StreamRequest) -> &mut Self {
        self.selections.insert(kind, Selection::Request(request));
        self
    }

    /// Exclude `kind`, even when all streams are enabled.
    pub fn disable_stream(&mut self, kind: StreamKind) -> &mut Self {
        self.selections.insert(kind, Selection::Disabled);
        self
    }

    /// Choose one profile per enabled kind, in kind order.
    ///
    /// With `BestQuality`, preset-picked streams then move to the frame rate
    /// most chosen streams run at, if their size and format offer it.
    pub fn resolve(&self, profiles: &[StreamProfile]) -> Result<Vec<StreamProfile>> {
        let preset = self.preset.unwrap_or_default();
        let mut chosen: Vec<(StreamProfile, bool)> = Vec::new();

        for kind in StreamKind::ALL {
            let of_kind = profiles.iter().filter(|p| p.kind == kind);
            let profile = match self.selections.get(&kind) {
                Some(Selection::Disabled) => continue,
                Some(Selection::Request(request)) => Some((
                    preset
                        .select(of_kind.filter(|p| request.matches(p)))
                        .ok_or(CameraError::ProfileNotFound(kind))?,
                    false,
                )),
                None if self.preset.is_some() => preset.select(of_kind).map(|p| (p, true)),
                None => None,
            };

            if let Some((profile, by_preset)) = profile {
                chosen.push((profile.clone(), by_preset));
            }
        }

        if chosen.is_empty() {
            return Err(CameraError::NoStreams);
        }

        let shared = if preset == Preset::BestQuality {
            shared_fps(chosen.iter().map(|(p, _)| p.fps))
        } else {
            None
        };
        Ok(chosen
            .into_iter()
            .map(|(profile, by_preset)| {
                let profile = match shared {
                    Some(fps) if by_preset && profile.fps != fps => {
                        at_fps(profiles, &profile, fps).unwrap_or(profile)
                    }
                    _ => profile,
                };
                debug!(%profile, "Selected stream profile");
                profile
            })
            .collect())
    }

    /// Resolve against the device and open every chosen stream.
    pub fn open<'a, D: DepthDevice>(&self, device: &'a D) -> Result<Vec<D::Stream<'a>>> {
        let profiles = self.resolve(device.profiles())?;
        profiles
            .iter()
            .map(|profile| {
                info!(device = %device.info().name, %profile, "Opening stream");
                device.open(profile)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Format;

    fn profile(kind: StreamKind, width: u32, height: u32, fourcc: FourCC, fps: u32) -> StreamProfile {
        StreamProfile::new(kind, Format::new(width, height, fourcc), fps)
    }

    fn d435_profiles() -> Vec<StreamProfile> {
        vec![
            profile(StreamKind::Depth, 1280, 720, FourCC::Z16, 15),
            profile(StreamKind::Depth, 848, 480, FourCC::Z16, 90),
            profile(StreamKind::Depth, 848, 480, FourCC::Z16, 30),
            profile(StreamKind::Depth, 640, 480, FourCC::Z16, 30),
            profile(StreamKind::Color, 1920, 1080, FourCC::YUYV, 30),
            profile(StreamKind::Color, 1920, 1080, FourCC::MJPG, 30),
            profile(StreamKind::Color, 640, 480, FourCC::YUYV, 60),
            profile(StreamKind::Infrared, 1280, 800, FourCC::Y8I, 15),
            profile(StreamKind::Infrared, 640, 400, FourCC::Y8I, 30),
        ]
    }

    fn chosen(config: &StreamConfig) -> Vec<StreamProfile> {
        config.resolve(&d435_profiles()).expect("resolve succeeds")
    }

    #[test]
    fn test_best_quality_prefers_large_images_at_30fps() {
        let mut config = StreamConfig::new();
        config.enable_all(Preset::BestQuality);

        // Depth also offers 848x480 at 90 fps but follows the others to 30.
        assert_eq!(
            chosen(&config),
            vec![
                profile(StreamKind::Depth, 848, 480, FourCC::Z16, 30),
                profile(StreamKind::Color, 1920, 1080, FourCC::YUYV, 30),
                profile(StreamKind::Infrared, 640, 400, FourCC::Y8I, 30),
            ]
        );
    }

    #[test]
    fn test_best_quality_keeps_rate_without_matching_profile() {
        let profiles = vec![
            profile(StreamKind::Depth, 848, 480, FourCC::Z16, 90),
            profile(StreamKind::Color, 640, 480, FourCC::YUYV, 30),
        ];
        let mut config = StreamConfig::new();
        config.enable_all(Preset::BestQuality);

        let fps: Vec<u32> = config
            .resolve(&profiles)
            .expect("resolve succeeds")
            .iter()
            .map(|p| p.fps)
            .collect();
        assert_eq!(fps, vec![90, 30]);
    }

    #[test]
    fn test_explicit_rate_is_not_realigned() {
        let mut config = StreamConfig::new();
        config.enable_all(Preset::BestQuality).enable_stream(
            StreamKind::Depth,
            StreamRequest {
                fps: Some(90),
                ..StreamRequest::default()
            },
        );

        assert_eq!(chosen(&config).first().map(|p| p.fps), Some(90));
    }

    #[test]
    fn test_shared_fps_prefers_majority_then_lowest() {
        assert_eq!(shared_fps([90, 30, 30]), Some(30));
        assert_eq!(shared_fps([60, 30]), Some(30));
        assert_eq!(shared_fps([]), None);
    }

    #[test]
    fn test_best_quality_falls_back_below_30fps() {
        let slow = vec![
            profile(StreamKind::Depth, 640, 480, FourCC::Z16, 6),
            profile(StreamKind::Depth, 1280, 720, FourCC::Z16, 15),
        ];
        assert_eq!(
            Preset::BestQuality.select(&slow),
            slow.get(1),
        );
    }

    #[test]
    fn test_largest_image_and_highest_framerate() {
        let mut config = StreamConfig::new();
        config.enable_all(Preset::LargestImage);
        let largest = chosen(&config);
        assert_eq!(largest.first().map(|p| p.format.width), Some(1280));

        config.enable_all(Preset::HighestFramerate);
        let fastest = chosen(&config);
        assert_eq!(fastest.first().map(|p| p.fps), Some(90));
        assert_eq!(fastest.get(1).map(|p| p.fps), Some(60));
    }

    #[test]
    fn test_disable_stream() {
        let mut config = StreamConfig::new();
        config
            .enable_all(Preset::BestQuality)
            .disable_stream(StreamKind::Color);

        let kinds: Vec<StreamKind> = chosen(&config).iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![StreamKind::Depth, StreamKind::Infrared]);
    }

    #[test]
    fn test_enable_stream_without_enable_all() {
        let mut config = StreamConfig::new();
        config.enable_stream(
            StreamKind::Depth,
            StreamRequest {
                width: Some(640),
                ..StreamRequest::default()
            },
        );

        assert_eq!(
            chosen(&config),
            vec![profile(StreamKind::Depth, 640, 480, FourCC::Z16, 30)]
        );
    }

    #[test]
    fn test_unmatched_request_is_an_error() {
        let mut config = StreamConfig::new();
        config.enable_all(Preset::BestQuality).enable_stream(
            StreamKind::Color,
            StreamRequest {
                fourcc: Some(FourCC::RGB3),
                ..StreamRequest::default()
            },
        );

        let err = config.resolve(&d435_profiles()).expect_err("no RGB3 profile");
        assert!(matches!(err, CameraError::ProfileNotFound(StreamKind::Color)));
    }

    #[test]
    fn test_nothing_enabled_is_an_error() {
        let err = StreamConfig::new()
            .resolve(&d435_profiles())
            .expect_err("nothing enabled");
        assert!(matches!(err, CameraError::NoStreams));

        let mut config = StreamConfig::new();
        config.enable_all(Preset::BestQuality);
        assert!(matches!(config.resolve(&[]), Err(CameraError::NoStreams)));
    }
}
