//! Software decoding on greyscale frames, backed by `rxing`.

use caselog_types::BarcodeFormat;
use image::GrayImage;
use rxing::BarcodeFormat as RxingFormat;

use crate::backend::{
    BackendInitError, BackendKind, BackendProbe, DecodingBackend, DetectError, SoftwareBackend,
    SymbolDecoder,
};

/// Formats the embedded decoder can read out of [`BarcodeFormat::ALL`].
const DECODABLE: &[BarcodeFormat] = BarcodeFormat::ALL;

fn from_rxing(format: &RxingFormat) -> Option<BarcodeFormat> {
    Some(match format {
        RxingFormat::CODE_128 => BarcodeFormat::Code128,
        RxingFormat::CODE_39 => BarcodeFormat::Code39,
        RxingFormat::CODE_93 => BarcodeFormat::Code93,
        RxingFormat::CODABAR => BarcodeFormat::Codabar,
        RxingFormat::EAN_13 => BarcodeFormat::Ean13,
        RxingFormat::EAN_8 => BarcodeFormat::Ean8,
        RxingFormat::UPC_A => BarcodeFormat::UpcA,
        RxingFormat::UPC_E => BarcodeFormat::UpcE,
        RxingFormat::DATA_MATRIX => BarcodeFormat::DataMatrix,
        RxingFormat::ITF => BarcodeFormat::Itf,
        RxingFormat::QR_CODE => BarcodeFormat::QrCode,
        _ => return None,
    })
}

/// Multi-format decoder limited to the formats a session asked for.
#[derive(Debug, Clone)]
pub struct RxingDecoder {
    formats: Vec<BarcodeFormat>,
}

impl RxingDecoder {
    #[must_use]
    pub fn new(formats: &[BarcodeFormat]) -> Self {
        Self {
            formats: formats.to_vec(),
        }
    }
}

impl SymbolDecoder for RxingDecoder {
    fn decode(&mut self, image: &GrayImage) -> Result<Option<String>, DetectError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectError(format!("empty frame {width}x{height}")));
        }
        // rxing reports "nothing found" and unreadable symbols as errors.
        let Ok(result) = rxing::helpers::detect_in_luma(image.as_raw().clone(), width, height, None)
        else {
            return Ok(None);
        };
        let Some(format) = from_rxing(result.getBarcodeFormat()) else {
            tracing::debug!(format = ?result.getBarcodeFormat(), "Ignoring unrequested symbology");
            return Ok(None);
        };
        if !self.formats.contains(&format) {
            tracing::debug!(format = %format.as_str(), "Ignoring unrequested symbology");
            return Ok(None);
        }
        let text = result.getText().trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

/// Probe for the embedded decoder. Always present; fails only when none of
/// the requested formats is decodable.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareProbe;

impl SoftwareProbe {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BackendProbe for SoftwareProbe {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn initialize(
        &self,
        formats: &[BarcodeFormat],
    ) -> Result<Box<dyn DecodingBackend>, BackendInitError> {
        let supported: Vec<BarcodeFormat> = formats
            .iter()
            .copied()
            .filter(|f| DECODABLE.contains(f))
            .collect();
        if supported.is_empty() {
            return Err(BackendInitError::Failed {
                kind: BackendKind::Software,
                message: "no requested format is decodable".to_string(),
            });
        }
        Ok(Box::new(SoftwareBackend::new(
            Box::new(RxingDecoder::new(&supported)),
            supported,
        )))
    }
}
