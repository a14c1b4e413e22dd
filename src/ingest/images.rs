//! Medical image detection and severity parsing.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Image MIME types eligible for vision analysis.
pub const IMAGE_MIMES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Every MIME type the scanner will process.
pub const PROCESSABLE_MIMES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
];

const MEDICAL_IMAGE_PATTERN: &str = r"(?i)(mri|x[\s_-]?ray|xray|ct[\s_-]?scan|ultrasound|echo|radiograph|mammogr|fluoroscop|angiogra|pet[\s_-]?scan|dexa|bone[\s_-]?scan|sonogra|dicom|knee|spine|shoulder|hip|brain|chest|abdomen|pelvis|lumbar|cervical|thoracic|ankle|wrist|elbow|meniscus|ligament|acl|rotator[\s_-]?cuff|disc[\s_-]?herni)";

/// System prompt for radiological review.
pub const IMAGE_SYSTEM_PROMPT: &str = "\
You are an experienced radiologist reviewing a medical image provided by your patient. \
Your goal is to describe what you see and flag any abnormalities or potential pathologies.

Analyze the image and produce a structured report:

## Image Analysis

### Modality & Region
State the imaging modality (MRI, X-ray, CT, ultrasound, etc.) and anatomical region if identifiable.

### Findings
Describe ALL notable observations. For each finding, state:
- **Location** (anatomical landmark)
- **Description** (size, signal intensity, density, morphology)
- **Significance** (normal variant, incidental, or concerning)

### Potential Pathologies
List any conditions suggested by the findings (masses, ligament or meniscus tears, \
disc herniations, fractures, degenerative changes, effusions, other abnormalities). \
For each, rate concern level: LOW / MODERATE / HIGH.

### Recommendations
Suggest follow-up actions (additional imaging, specialist referral, monitoring).

### Severity Summary
One line: NORMAL / MINOR FINDINGS / MODERATE CONCERN / URGENT (seek specialist).

Be thorough and direct. Flag anything that warrants professional follow-up. \
Keep the total response under 800 words.";

/// User prompt accompanying the image.
pub fn image_user_prompt(filename: &str) -> String {
    format!(
        "Please analyze this medical image.\nFilename: {filename}\n\
         Look for any pathologies including but not limited to: tumours, ligament tears, \
         meniscus damage, fractures, disc herniations, degenerative changes, effusions, \
         and any other abnormalities."
    )
}

/// Severity parsed from an analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "URGENT")]
    Urgent,
    #[serde(rename = "MODERATE CONCERN")]
    ModerateConcern,
    #[serde(rename = "MINOR FINDINGS")]
    MinorFindings,
    #[serde(rename = "NORMAL")]
    Normal,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Severity {
    /// Checked in this order against the uppercased text; first hit wins.
    const SCAN_ORDER: [Severity; 4] = [
        Severity::Urgent,
        Severity::ModerateConcern,
        Severity::MinorFindings,
        Severity::Normal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Urgent => "URGENT",
            Severity::ModerateConcern => "MODERATE CONCERN",
            Severity::MinorFindings => "MINOR FINDINGS",
            Severity::Normal => "NORMAL",
            Severity::Unknown => "UNKNOWN",
        }
    }

    /// Extract the severity label from free-form analysis text.
    pub fn from_analysis(text: &str) -> Self {
        let upper = text.to_uppercase();
        Self::SCAN_ORDER
            .into_iter()
            .find(|s| upper.contains(s.as_str()))
            .unwrap_or(Severity::Unknown)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filename + MIME based detector for medical imagery.
#[derive(Debug, Clone)]
pub struct MedicalImageDetector {
    regex: Regex,
}

impl MedicalImageDetector {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(MEDICAL_IMAGE_PATTERN)?,
        })
    }

    /// True for image MIME types whose name looks like a scan.
    pub fn is_medical_image(&self, filename: &str, mime_type: &str) -> bool {
        is_image_mime(mime_type) && self.regex.is_match(filename)
    }
}

pub fn is_image_mime(mime_type: &str) -> bool {
    IMAGE_MIMES.contains(&mime_type)
}

pub fn is_processable(mime_type: &str) -> bool {
    PROCESSABLE_MIMES.contains(&mime_type)
}
