//! Named quality presets for video relays.
//!
//! A preset trades picture quality for CPU and bandwidth.  Each preset has
//! three knobs:
//!
//! | Name         | Downscale | Frame stride | Compression |
//! |--------------|-----------|--------------|-------------|
//! | `low`        | 4.5       | 2            | 85          |
//! | `medium-low` | 3.7       | 1            | 80          |
//! | `medium`     | 2.5       | 1            | 60          |
//! | `high`       | 1.5       | 1            | 30          |
//!
//! - **downscale**: frame width and height are divided by this factor.
//! - **frame stride**: keep one frame out of every `stride` captured.
//! - **compression**: 0-100, higher means more detail is thrown away.
//!
//! Unknown names never fail; they resolve to [`QualityPreset::DEFAULT`]
//! (`medium-low`).

use std::fmt;

/// Compression level above which the capture pipeline also blurs frames.
pub const BLUR_COMPRESSION_THRESHOLD: u8 = 70;

/// A resolved quality preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPreset {
    /// Canonical preset name.
    pub name: &'static str,
    /// Factor frame dimensions are divided by.
    pub downscale_factor: f32,
    /// Keep one frame out of every `frame_stride`.
    pub frame_stride: u32,
    /// Compression strength, 0-100.
    pub compression: u8,
}

impl QualityPreset {
    pub const LOW: Self = Self {
        name: "low",
        downscale_factor: 4.5,
        frame_stride: 2,
        compression: 85,
    };

    pub const MEDIUM_LOW: Self = Self {
        name: "medium-low",
        downscale_factor: 3.7,
        frame_stride: 1,
        compression: 80,
    };

    pub const MEDIUM: Self = Self {
        name: "medium",
        downscale_factor: 2.5,
        frame_stride: 1,
        compression: 60,
    };

    pub const HIGH: Self = Self {
        name: "high",
        downscale_factor: 1.5,
        frame_stride: 1,
        compression: 30,
    };

    /// Preset used when a viewer asks for nothing or for an unknown name.
    pub const DEFAULT: Self = Self::MEDIUM_LOW;

    /// All presets, lowest quality first.
    pub const ALL: [Self; 4] = [Self::LOW, Self::MEDIUM_LOW, Self::MEDIUM, Self::HIGH];

    /// Looks up a preset by exact name.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name == name)
    }

    /// Resolves a preset name, falling back to [`Self::DEFAULT`].
    pub fn resolve(name: &str) -> Self {
        Self::lookup(name).unwrap_or(Self::DEFAULT)
    }

    /// Whether frames should additionally be blurred before encoding.
    pub fn blurs(&self) -> bool {
        self.compression > BLUR_COMPRESSION_THRESHOLD
    }

    /// Output dimensions for a frame of `width` x `height`.
    ///
    /// Never returns a zero dimension.
    pub fn scaled_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 / self.downscale_factor) as u32).max(1);
        (scale(width), scale(height))
    }
}

impl Default for QualityPreset {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_preset_values() {
        let p = QualityPreset::resolve("high");
        assert_eq!(p.downscale_factor, 1.5);
        assert_eq!(p.frame_stride, 1);
        assert_eq!(p.compression, 30);
    }

    #[test]
    fn test_unknown_name_falls_back_to_medium_low() {
        // Arrange / Act
        let p = QualityPreset::resolve("ultra");

        // Assert
        assert_eq!(p, QualityPreset::MEDIUM_LOW);
        assert_eq!(p.downscale_factor, 3.7);
        assert_eq!(p.frame_stride, 1);
        assert_eq!(p.compression, 80);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(QualityPreset::lookup("HIGH").is_none());
        assert_eq!(QualityPreset::resolve("HIGH"), QualityPreset::DEFAULT);
    }

    #[test]
    fn test_low_preset_skips_every_other_frame() {
        assert_eq!(QualityPreset::resolve("low").frame_stride, 2);
    }

    #[test]
    fn test_blur_applies_only_above_threshold() {
        assert!(QualityPreset::LOW.blurs());
        assert!(QualityPreset::MEDIUM_LOW.blurs());
        assert!(!QualityPreset::MEDIUM.blurs());
        assert!(!QualityPreset::HIGH.blurs());
    }

    #[test]
    fn test_scaled_dimensions_divide_by_factor() {
        // 1920 / 2.5 = 768, 1080 / 2.5 = 432
        assert_eq!(QualityPreset::MEDIUM.scaled_dimensions(1920, 1080), (768, 432));
    }

    #[test]
    fn test_scaled_dimensions_never_zero() {
        assert_eq!(QualityPreset::LOW.scaled_dimensions(2, 2), (1, 1));
    }

    #[test]
    fn test_display_prints_name() {
        assert_eq!(QualityPreset::MEDIUM_LOW.to_string(), "medium-low");
    }
}
