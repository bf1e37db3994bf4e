use serde::{Deserialize, Serialize};
use silhouette_contracts::jobs::{GeneratedArtifact, SizingOptions};
use silhouette_contracts::prompt::{BackgroundMode, Selections};

use crate::studio::{GenerateInput, SilhouetteInput};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, alias = "apiKey")]
    pub credential: Option<String>,
    #[serde(default)]
    pub sizing_options: SizingOptions,
    #[serde(default)]
    pub reference_image_url: Option<String>,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
}

impl From<GenerateBody> for GenerateInput {
    fn from(body: GenerateBody) -> Self {
        Self {
            prompt: body.prompt.unwrap_or_default(),
            credential: body.credential,
            sizing: body.sizing_options,
            reference_image_url: body.reference_image_url,
            strength: body.strength,
            negative_prompt: None,
            model: body.model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub image_url: String,
    pub prediction_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBackgroundBody {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, alias = "apiKey")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBackgroundResponse {
    pub transparent_image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilhouetteBody {
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub ethnicity: String,
    #[serde(default)]
    pub clothing: String,
    #[serde(default = "default_with_background")]
    pub with_background: bool,
    #[serde(default)]
    pub reference_image_url: Option<String>,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default, alias = "apiKey")]
    pub credential: Option<String>,
    #[serde(default)]
    pub sizing_options: SizingOptions,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_with_background() -> bool {
    true
}

impl From<SilhouetteBody> for SilhouetteInput {
    fn from(body: SilhouetteBody) -> Self {
        Self {
            selections: Selections {
                age: body.age,
                gender: body.gender,
                ethnicity: body.ethnicity,
                clothing: body.clothing,
            },
            background: if body.with_background {
                BackgroundMode::WithBackground
            } else {
                BackgroundMode::Transparent
            },
            reference_image_url: body.reference_image_url,
            strength: body.strength,
            credential: body.credential,
            sizing: body.sizing_options,
            model: body.model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilhouetteResponse {
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    #[serde(flatten)]
    pub artifact: GeneratedArtifact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
