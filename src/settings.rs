use serde::{Deserialize, Serialize};

pub const DEFAULT_AD_COPY_PROMPT: &str =
    "Persuasive, benefit-driven, and includes a clear call to action.";
pub const DEFAULT_STUDIO_OPTION: &str = "Plain White Background";
pub const DEFAULT_LIFESTYLE_OPTION: &str = "On a Kitchen Counter";

pub const DEFAULT_IMAGES_PER_RUN: u32 = 5;
/// Hard ceiling on images per generation run.
pub const MAX_IMAGES_PER_RUN: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1024x1024")]
    Sd1024,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
    #[serde(rename = "8K")]
    EightK,
}

/// Selected style branch. The image prompt is derived from this and is
/// never stored or edited independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "styleMode", rename_all = "lowercase")]
pub enum StyleChoice {
    Studio {
        #[serde(rename = "studioOption")]
        option: String,
    },
    Lifestyle {
        #[serde(rename = "lifestyleOption")]
        option: String,
    },
}

impl StyleChoice {
    pub fn image_prompt(&self) -> String {
        match self {
            StyleChoice::Studio { option } => {
                format!("A professional studio product shot. Style: {option}.")
            }
            StyleChoice::Lifestyle { option } => {
                format!("A professional lifestyle product shot. Setting: {option}.")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub ad_copy_prompt: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub number_of_images: u32,
    #[serde(flatten)]
    pub style: StyleChoice,
}

impl Settings {
    /// Derived image prompt for the currently selected style branch.
    pub fn image_prompt(&self) -> String {
        self.style.image_prompt()
    }

    /// Bounds check for the per-run image count.
    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if self.number_of_images == 0 || self.number_of_images > MAX_IMAGES_PER_RUN {
            return Err(InvalidSettings::ImageCount {
                requested: self.number_of_images,
                max: MAX_IMAGES_PER_RUN,
            });
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ad_copy_prompt: DEFAULT_AD_COPY_PROMPT.to_string(),
            aspect_ratio: AspectRatio::Square,
            resolution: Resolution::TwoK,
            number_of_images: DEFAULT_IMAGES_PER_RUN,
            style: StyleChoice::Studio {
                option: DEFAULT_STUDIO_OPTION.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSettings {
    #[error("number of images must be between 1 and {max}, got {requested}")]
    ImageCount { requested: u32, max: u32 },
}
