// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Default lossy encoding quality in (0, 1]
pub const DEFAULT_ENCODING_QUALITY: f32 = 0.92;

/// Fixed shadow lift applied after merging
pub const SHADOW_LIFT: f32 = 0.2;

/// Number of frames in a default burst
pub const DEFAULT_BURST_SIZE: usize = 6;

/// Largest burst the CLI and config accept
pub const MAX_BURST_SIZE: usize = 64;

/// Phase correlation defaults
pub mod alignment {
    /// Images whose longer side exceeds this are box-downsampled before correlation
    pub const MAX_CORRELATION_DIM: u32 = 512;

    /// Minimum normalized correlation peak accepted as a real match
    pub const MIN_PEAK_VALUE: f32 = 0.02;

    /// Below this edge length there is too little signal to correlate
    pub const MIN_IMAGE_DIM: u32 = 8;
}

/// Supported raw container formats for the directory frame source
pub mod file_formats {
    /// Raw container file extensions
    pub const RAW_EXTENSIONS: &[&str] = &[
        "dng", "tif", "tiff", "arw", "cr2", "cr3", "nef", "raf", "orf", "rw2", "pef",
    ];

    /// Extension used for the fused lossy photo
    pub const PHOTO_EXTENSION: &str = "jpg";

    /// Extension used for the preserved raw frame
    pub const RAW_EXTENSION: &str = "dng";

    /// Check if a file extension is a supported raw container
    pub fn is_raw_extension(ext: &str) -> bool {
        RAW_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Application information utilities
pub mod app_info {
    /// Directory name used under the user's config, cache and picture dirs
    pub const APP_DIR_NAME: &str = "burst-camera";

    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_extension_case_insensitive() {
        assert!(file_formats::is_raw_extension("DNG"));
        assert!(file_formats::is_raw_extension("nef"));
        assert!(!file_formats::is_raw_extension("jpg"));
    }
}
