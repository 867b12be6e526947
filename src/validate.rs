// Output validation — rendered images and generated plotting scripts

use regex::Regex;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::OnceLock;

/// Below this (either side) a figure is logged as too small for print.
pub const MIN_RECOMMENDED_SIDE: u32 = 300;

/// Modules a generated plotting script may import without a warning.
pub const APPROVED_IMPORTS: &[&str] = &[
    "matplotlib",
    "matplotlib.pyplot",
    "matplotlib.patches",
    "matplotlib.lines",
    "matplotlib.colors",
    "matplotlib.cm",
    "matplotlib.gridspec",
    "matplotlib.ticker",
    "matplotlib.font_manager",
    "seaborn",
    "numpy",
    "pandas",
    "math",
    "json",
    "os",
    "pathlib",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image is empty")]
    Empty,
    #[error("unsupported image format (expected PNG or JPEG)")]
    UnsupportedFormat,
    #[error("image does not decode: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    pub fn is_print_resolution(&self) -> bool {
        self.width >= MIN_RECOMMENDED_SIDE && self.height >= MIN_RECOMMENDED_SIDE
    }
}

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Check that `bytes` is a decodable PNG or JPEG and report its size.
///
/// The format is sniffed from the content, not taken from a media type.
pub fn check_image(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let info = if bytes.starts_with(PNG_SIGNATURE) {
        decode_png(bytes)?
    } else if bytes.starts_with(&[0xff, 0xd8]) {
        decode_jpeg(bytes)?
    } else {
        return Err(ImageError::UnsupportedFormat);
    };

    if !info.is_print_resolution() {
        tracing::warn!(
            width = info.width,
            height = info.height,
            "Image below {}x{} recommended minimum",
            MIN_RECOMMENDED_SIDE,
            MIN_RECOMMENDED_SIDE
        );
    }
    Ok(info)
}

fn decode_png(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let mut reader = decoder
        .read_info()
        .map_err(|e| ImageError::Decode(e.to_string()))?;
    let (width, height) = {
        let info = reader.info();
        (info.width, info.height)
    };

    // Decode the first frame so truncated data is caught too
    let mut buf = vec![0; reader.output_buffer_size()];
    reader
        .next_frame(&mut buf)
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    Ok(ImageInfo {
        format: ImageFormat::Png,
        width,
        height,
    })
}

fn decode_jpeg(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    // Full decode: a header alone is not an image
    let decoded = image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .map_err(|e| ImageError::Decode(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(ImageError::Decode("JPEG frame has zero size".into()));
    }
    Ok(ImageInfo {
        format: ImageFormat::Jpeg,
        width: decoded.width(),
        height: decoded.height(),
    })
}

/// Findings for a generated plotting script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlotCodeReport {
    /// Problems that make the script unusable
    pub errors: Vec<String>,
    /// Worth a look, not fatal
    pub warnings: Vec<String>,
    pub imports: BTreeSet<String>,
}

impl PlotCodeReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

fn import_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:import[ \t]+([\w\., \t]+?)|from[ \t]+([\w\.]+)[ \t]+import\b.*?)[ \t]*(?:#.*)?$").ok()
    })
    .as_ref()
}

fn show_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.show\(\s*\)").ok()).as_ref()
}

/// Check a plotting script: it must call `savefig`, must not call `show()`,
/// and should only import approved modules.
pub fn check_plot_code(code: &str) -> PlotCodeReport {
    let mut report = PlotCodeReport::default();

    if code.trim().is_empty() {
        report.errors.push("Script is empty".to_string());
        return report;
    }

    let captures = import_re().into_iter().flat_map(|re| re.captures_iter(code));
    for caps in captures {
        if let Some(list) = caps.get(1) {
            for item in list.as_str().split(',') {
                if let Some(module) = item.split_whitespace().next() {
                    report.imports.insert(module.to_string());
                }
            }
        } else if let Some(module) = caps.get(2) {
            report.imports.insert(module.as_str().to_string());
        }
    }

    for module in &report.imports {
        if !APPROVED_IMPORTS.contains(&module.as_str()) {
            report.warnings.push(format!("Non-standard import: {}", module));
        }
    }

    if !code.contains("savefig") {
        report
            .errors
            .push("Missing savefig() call; output will not be saved".to_string());
    }
    if show_re().map_or(code.contains(".show()"), |re| re.is_match(code)) {
        report
            .errors
            .push("Contains show(); it blocks in non-interactive runs".to_string());
    }

    report
}

/// Pull the script out of a reply that may wrap it in a ```python fence.
pub fn extract_code(reply: &str) -> &str {
    let trimmed = reply.trim();
    for fence in ["```python", "```py", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let body = &trimmed[start + fence.len()..];
            return match body.find("```") {
                Some(end) => body[..end].trim(),
                None => body.trim(),
            };
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer
                .write_image_data(&vec![255u8; (width * height) as usize])
                .unwrap();
        }
        out
    }

    #[test]
    fn test_png_dimensions() {
        let info = check_image(&png_bytes(320, 400)).unwrap();
        assert_eq!(info.format, ImageFormat::Png);
        assert_eq!((info.width, info.height), (320, 400));
        assert!(info.is_print_resolution());
    }

    #[test]
    fn test_small_png_is_accepted_but_flagged() {
        let info = check_image(&png_bytes(8, 8)).unwrap();
        assert!(!info.is_print_resolution());
    }

    #[test]
    fn test_truncated_png_is_rejected() {
        let bytes = png_bytes(64, 64);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(check_image(truncated), Err(ImageError::Decode(_))));
    }

    #[test]
    fn test_empty_and_unknown_bytes() {
        assert_eq!(check_image(&[]), Err(ImageError::Empty));
        assert_eq!(check_image(b"GIF89a...."), Err(ImageError::UnsupportedFormat));
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 90)
            .encode(
                &vec![128u8; (width * height) as usize],
                width,
                height,
                image::ExtendedColorType::L8,
            )
            .unwrap();
        out
    }

    #[test]
    fn test_jpeg_dimensions() {
        let info = check_image(&jpeg_bytes(640, 480)).unwrap();
        assert_eq!(info.format, ImageFormat::Jpeg);
        assert_eq!((info.width, info.height), (640, 480));
    }

    #[test]
    fn test_jpeg_header_without_scan_is_rejected() {
        // SOI then a 640x480 SOF0 header; no tables, no scan data, no EOI
        let bytes = [
            0xff, 0xd8, 0xff, 0xc0, 0x00, 0x11, 0x08, 0x01, 0xe0, 0x02, 0x80, 0x03, 0x01, 0x22,
            0x00,
        ];
        assert!(matches!(check_image(&bytes), Err(ImageError::Decode(_))));
    }

    #[test]
    fn test_jpeg_without_frame_is_rejected() {
        let bytes = [0xff, 0xd8, 0xff, 0xd9];
        assert!(matches!(check_image(&bytes), Err(ImageError::Decode(_))));
    }

    #[test]
    fn test_good_plot_script() {
        let code = "import matplotlib.pyplot as plt\nimport numpy as np\n\
                    fig, ax = plt.subplots()\nax.bar([1, 2], [3, 4])\n\
                    plt.savefig(OUTPUT_PATH, dpi=300)\n";
        let report = check_plot_code(code);
        assert!(report.is_ok(), "{:?}", report);
        assert!(report.warnings.is_empty());
        assert!(report.imports.contains("matplotlib.pyplot"));
    }

    #[test]
    fn test_plot_script_without_savefig_or_with_show_fails() {
        let report = check_plot_code("import matplotlib.pyplot as plt\nplt.plot([1])\nplt.show()\n");
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_unapproved_imports_only_warn() {
        let code = "import requests, numpy as np\nfrom scipy import stats\nplt.savefig('x.png')\n";
        let report = check_plot_code(code);
        assert!(report.is_ok());
        assert_eq!(
            report.warnings,
            vec![
                "Non-standard import: requests".to_string(),
                "Non-standard import: scipy".to_string()
            ]
        );
    }

    #[test]
    fn test_extract_code_from_fence() {
        assert_eq!(extract_code("Here:\n```python\nprint(1)\n```\nDone"), "print(1)");
        assert_eq!(extract_code("print(2)"), "print(2)");
    }
}
