//! # OCR Engine Module
//!
//! Engine handles are the scarce resource the worker pool schedules. This module
//! defines the [`OcrEngine`] seam the pool talks to, the recognition output types,
//! and the Tesseract implementation built on `leptess`.
//!
//! ## Handle lifecycle
//!
//! - Handles are created once by an [`EngineFactory`] when the pool starts
//! - Each recognition may change engine variables for that job only
//! - After every job the pool calls [`OcrEngine::restore_baseline`]
//! - On shutdown each handle is terminated exactly once

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use lazy_static::lazy_static;
use leptess::LepTess;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ocr_config::{EngineParams, PageSegMode, PoolConfig};
use crate::ocr_errors::OcrError;

const FORMAT_DETECTION_BUFFER_SIZE: usize = 32;
const MIN_FORMAT_BYTES: usize = 8;

/// Axis-aligned word box in image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Vertical midpoint, used to group words into visual lines
    pub fn mid_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }
}

/// One recognised word with its location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub bbox: BBox,
    /// Recognition confidence 0-100, when the engine reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Raw result of one recognition, as the engine produced it
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EngineOutput {
    pub text: String,
    /// The engine's own page-level confidence (0-100)
    pub mean_confidence: Option<f32>,
    pub words: Vec<Word>,
}

impl EngineOutput {
    /// Mean of the word confidences when any are present, else the engine scalar, else 0
    pub fn effective_confidence(&self) -> f32 {
        let scored: Vec<f32> = self.words.iter().filter_map(|w| w.confidence).collect();
        if !scored.is_empty() {
            return scored.iter().sum::<f32>() / scored.len() as f32;
        }
        self.mean_confidence.unwrap_or(0.0)
    }
}

/// A live recognizer instance owned by the worker pool
///
/// Implementations are driven from a blocking thread, one job at a time.
pub trait OcrEngine: Send + 'static {
    /// Recognise the image at `image_path` using `params` for this job only
    fn recognize(&mut self, image_path: &str, params: &EngineParams)
        -> Result<EngineOutput, OcrError>;

    /// Return the engine to the configuration it had when it was created
    fn restore_baseline(&mut self) -> Result<(), OcrError>;

    /// Release the underlying recognizer
    fn terminate(self: Box<Self>) -> Result<(), OcrError>;
}

/// Creates engine handles for the pool
pub trait EngineFactory: Send + Sync + 'static {
    fn create(&self, slot: usize) -> Result<Box<dyn OcrEngine>, OcrError>;
}

/// Tesseract-backed engine handle
pub struct TesseractEngine {
    tess: LepTess,
    slot: usize,
    baseline_psm: PageSegMode,
    baseline_whitelist: Option<String>,
    max_file_size: u64,
    dirty: bool,
}

impl TesseractEngine {
    /// Create and configure a Tesseract instance for the given pool configuration
    pub fn new(config: &PoolConfig, slot: usize) -> Result<Self, OcrError> {
        let tessdata_path = config
            .tessdata_path
            .clone()
            .or_else(|| get_tessdata_path(config.model_type));

        info!(
            slot,
            languages = %config.languages,
            model = config.model_type.tessdata_dir(),
            "Creating Tesseract engine handle"
        );

        let tess = LepTess::new(tessdata_path.as_deref(), &config.languages).map_err(|e| {
            OcrError::Initialization(format!("Failed to initialize Tesseract OCR instance: {}", e))
        })?;

        let mut engine = Self {
            tess,
            slot,
            baseline_psm: config.default_page_seg_mode,
            baseline_whitelist: config.character_whitelist.clone(),
            max_file_size: config.max_file_size,
            dirty: true,
        };
        engine.restore_baseline()?;
        Ok(engine)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), OcrError> {
        let variable = variable_for(name).ok_or_else(|| {
            OcrError::EngineFailure(format!("Unknown Tesseract variable {}", name))
        })?;
        self.tess.set_variable(variable, value).map_err(|e| {
            OcrError::EngineFailure(format!("Failed to set {}={}: {}", name, value, e))
        })
    }

    fn apply_params(&mut self, params: &EngineParams) -> Result<(), OcrError> {
        if params.is_baseline() {
            return Ok(());
        }
        self.dirty = true;

        if let Some(psm) = params.page_seg_mode {
            self.set(PSM, psm.as_str())?;
        }
        if let Some(preserve) = params.preserve_interword_spaces {
            self.set(INTERWORD_SPACES, if preserve { "1" } else { "0" })?;
        }
        for (name, value) in &params.overrides {
            match variable_for(name) {
                Some(_) if OVERRIDABLE.contains(&name.as_str()) => self.set(name, value)?,
                _ => warn!(
                    slot = self.slot,
                    variable = %name,
                    "Ignoring unsupported Tesseract variable override"
                ),
            }
        }
        Ok(())
    }
}

const PSM: &str = "tessedit_pageseg_mode";
const INTERWORD_SPACES: &str = "preserve_interword_spaces";
const WHITELIST: &str = "tessedit_char_whitelist";
const BLACKLIST: &str = "tessedit_char_blacklist";

/// Variables a job may override through `EngineParams::overrides`
const OVERRIDABLE: [&str; 2] = [WHITELIST, BLACKLIST];

fn variable_for(name: &str) -> Option<leptess::Variable> {
    match name {
        PSM => Some(leptess::Variable::TesseditPagesegMode),
        INTERWORD_SPACES => Some(leptess::Variable::PreserveInterwordSpaces),
        WHITELIST => Some(leptess::Variable::TesseditCharWhitelist),
        BLACKLIST => Some(leptess::Variable::TesseditCharBlacklist),
        _ => None,
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(
        &mut self,
        image_path: &str,
        params: &EngineParams,
    ) -> Result<EngineOutput, OcrError> {
        validate_image_file(image_path, self.max_file_size)?;
        self.apply_params(params)?;

        self.tess.set_image(image_path).map_err(|e| {
            OcrError::EngineFailure(format!("Failed to load image for OCR: {e}"))
        })?;

        let text = self.tess.get_utf8_text().map_err(|e| {
            OcrError::EngineFailure(format!("Failed to extract text from image: {e}"))
        })?;
        let mean_confidence = self.tess.mean_text_conf();

        let words = match self.tess.get_hocr_text(0) {
            Ok(hocr) => parse_hocr_words(&hocr),
            Err(e) => {
                warn!(slot = self.slot, error = %e, "hOCR output unavailable, continuing without word boxes");
                Vec::new()
            }
        };

        let cleaned_text = text
            .trim()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<&str>>()
            .join("\n");

        debug!(
            slot = self.slot,
            characters = cleaned_text.len(),
            words = words.len(),
            mean_confidence,
            "Tesseract recognition finished"
        );

        Ok(EngineOutput {
            text: cleaned_text,
            mean_confidence: (mean_confidence >= 0).then_some(mean_confidence as f32),
            words,
        })
    }

    fn restore_baseline(&mut self) -> Result<(), OcrError> {
        if !self.dirty {
            return Ok(());
        }
        let psm = self.baseline_psm;
        self.set(PSM, psm.as_str())?;
        self.set(INTERWORD_SPACES, "0")?;
        let whitelist = self.baseline_whitelist.clone().unwrap_or_default();
        self.set(WHITELIST, &whitelist)?;
        self.set(BLACKLIST, "")?;
        self.dirty = false;
        Ok(())
    }

    fn terminate(self: Box<Self>) -> Result<(), OcrError> {
        info!(slot = self.slot, "Terminating Tesseract engine handle");
        drop(self);
        Ok(())
    }
}

/// Factory producing one Tesseract handle per pool slot
pub struct TesseractFactory {
    config: PoolConfig,
}

impl TesseractFactory {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for TesseractFactory {
    fn create(&self, slot: usize) -> Result<Box<dyn OcrEngine>, OcrError> {
        Ok(Box::new(TesseractEngine::new(&self.config, slot)?))
    }
}

/// Get the tessdata path for the specified model type
///
/// Attempts to find the appropriate tessdata directory based on the model type.
/// Falls back to the Tesseract default when no specific directory is found.
fn get_tessdata_path(model_type: crate::ocr_config::ModelType) -> Option<String> {
    use crate::ocr_config::ModelType;

    let possible_paths = match model_type {
        ModelType::Fast => [
            "/usr/share/tesseract-ocr/5/tessdata_fast",
            "/usr/share/tesseract-ocr/4.00/tessdata_fast",
            "/usr/share/tessdata_fast",
            "/usr/local/share/tessdata_fast",
        ],
        ModelType::Best => [
            "/usr/share/tesseract-ocr/5/tessdata_best",
            "/usr/share/tesseract-ocr/4.00/tessdata_best",
            "/usr/share/tessdata_best",
            "/usr/local/share/tessdata_best",
        ],
    };

    for path in possible_paths {
        if Path::new(path).exists() {
            info!("Using tessdata path: {}", path);
            return Some(path.to_string());
        }
    }

    info!(
        "No specific tessdata path found for model type {:?}, using default",
        model_type
    );
    None
}

/// Validate an image file before handing it to the recognizer
///
/// Checks existence, size, and that the header looks like PNG, JPEG, BMP or TIFF.
pub fn validate_image_file(image_path: &str, max_file_size: u64) -> Result<(), OcrError> {
    let path = Path::new(image_path);

    if !path.is_file() {
        return Err(OcrError::EngineFailure(format!(
            "Image validation failed: file does not exist or is not a file ({})",
            image_path
        )));
    }

    let file_size = path
        .metadata()
        .map_err(|e| {
            OcrError::EngineFailure(format!(
                "Image validation failed: cannot read file metadata ({}) - {}",
                image_path, e
            ))
        })?
        .len();

    if file_size == 0 {
        return Err(OcrError::EngineFailure(format!(
            "Image validation failed: file is empty ({})",
            image_path
        )));
    }
    if file_size > max_file_size {
        return Err(OcrError::EngineFailure(format!(
            "Image validation failed: file too large ({} bytes, maximum allowed: {} bytes)",
            file_size, max_file_size
        )));
    }

    let file = File::open(image_path).map_err(|e| {
        OcrError::EngineFailure(format!(
            "Cannot open image file for validation: {} - {}",
            image_path, e
        ))
    })?;
    let mut reader = BufReader::new(file);
    let mut buffer = vec![0; FORMAT_DETECTION_BUFFER_SIZE];
    let bytes_read = reader.read(&mut buffer).map_err(|e| {
        OcrError::EngineFailure(format!("Cannot read image header: {} - {}", image_path, e))
    })?;
    if bytes_read < MIN_FORMAT_BYTES {
        return Err(OcrError::EngineFailure(format!(
            "Image validation failed: header too short ({} bytes)",
            bytes_read
        )));
    }
    buffer.truncate(bytes_read);

    match image::guess_format(&buffer) {
        Ok(
            image::ImageFormat::Png
            | image::ImageFormat::Jpeg
            | image::ImageFormat::Bmp
            | image::ImageFormat::Tiff,
        ) => Ok(()),
        Ok(format) => Err(OcrError::EngineFailure(format!(
            "Unsupported image format {:?} for {}",
            format, image_path
        ))),
        Err(_) => Err(OcrError::EngineFailure(format!(
            "Could not determine image format for {}",
            image_path
        ))),
    }
}

lazy_static! {
    static ref HOCR_WORD: Regex = Regex::new(
        r#"(?s)<span[^>]*class=['"]ocrx_word['"][^>]*title=['"]bbox (\d+) (\d+) (\d+) (\d+)(?:; x_wconf (\d+))?[^'"]*['"][^>]*>(.*?)</span>"#
    )
    .expect("hOCR word pattern is valid");
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]+>").expect("tag pattern is valid");
}

/// Extract word boxes from Tesseract hOCR output, in reading order
pub fn parse_hocr_words(hocr: &str) -> Vec<Word> {
    HOCR_WORD
        .captures_iter(hocr)
        .filter_map(|caps| {
            let coord = |i: usize| caps[i].parse::<f32>().ok();
            let bbox = BBox::new(coord(1)?, coord(2)?, coord(3)?, coord(4)?);
            let confidence = caps.get(5).and_then(|m| m.as_str().parse::<f32>().ok());
            let text = unescape_html(&HTML_TAG.replace_all(&caps[6], ""));
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(Word {
                text: text.to_string(),
                bbox,
                confidence,
            })
        })
        .collect()
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE_HOCR: &str = r#"
<div class='ocr_page' id='page_1' title='image "r.png"; bbox 0 0 600 900; ppageno 0'>
 <span class='ocr_line' id='line_1_1' title="bbox 36 92 380 116; baseline 0 -5">
  <span class='ocrx_word' id='word_1_1' title='bbox 36 92 120 116; x_wconf 96'>TOTAL</span>
  <span class='ocrx_word' id='word_1_2' title='bbox 300 93 380 116; x_wconf 88'><strong>28.25</strong></span>
 </span>
 <span class='ocrx_word' id='word_1_3' title='bbox 40 130 90 150; x_wconf 71'>M&amp;S</span>
</div>"#;

    #[test]
    fn test_parse_hocr_words() {
        let words = parse_hocr_words(SAMPLE_HOCR);
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "TOTAL");
        assert_eq!(words[0].bbox, BBox::new(36.0, 92.0, 120.0, 116.0));
        assert_eq!(words[0].confidence, Some(96.0));
        assert_eq!(words[1].text, "28.25");
        assert_eq!(words[2].text, "M&S");
    }

    #[test]
    fn test_effective_confidence_prefers_words() {
        let output = EngineOutput {
            text: "TOTAL 28.25".to_string(),
            mean_confidence: Some(50.0),
            words: parse_hocr_words(SAMPLE_HOCR),
        };
        let expected = (96.0 + 88.0 + 71.0) / 3.0;
        assert!((output.effective_confidence() - expected).abs() < 1e-4);

        let scalar_only = EngineOutput {
            mean_confidence: Some(64.0),
            ..Default::default()
        };
        assert_eq!(scalar_only.effective_confidence(), 64.0);
    }

    #[test]
    fn test_validate_image_file_rejects_bad_inputs() {
        assert!(validate_image_file("/definitely/not/here.png", 1024).is_err());

        let empty = NamedTempFile::new().unwrap();
        assert!(validate_image_file(empty.path().to_str().unwrap(), 1024).is_err());

        let mut text_file = NamedTempFile::new().unwrap();
        text_file.write_all(b"this is not an image at all").unwrap();
        assert!(validate_image_file(text_file.path().to_str().unwrap(), 1024).is_err());
    }

    #[test]
    fn test_validate_image_file_accepts_png_header() {
        let mut png = NamedTempFile::new().unwrap();
        png.write_all(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13])
            .unwrap();
        let path = png.path().to_str().unwrap().to_string();
        assert!(validate_image_file(&path, 1024).is_ok());
        assert!(validate_image_file(&path, 4).is_err());
    }
}
