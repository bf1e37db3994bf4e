//! Prompt construction for rear-view studio silhouettes.
//!
//! Pure and deterministic: the same selections always produce the same
//! prompt. Unknown category values are used verbatim.

pub mod tables;

use serde::{Deserialize, Serialize};

pub const NEGATIVE_PROMPT: &str = "face, frontal view, front view, looking at camera, facial features, eyes, nose, mouth, side view, profile, turned head, multiple people, distorted, blurry, low quality";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundMode {
    #[default]
    WithBackground,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    #[default]
    Generate,
    Transform,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selections {
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub ethnicity: String,
    #[serde(default)]
    pub clothing: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedSelections {
    pub age: String,
    pub gender: String,
    pub ethnicity: String,
    pub clothing: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltPrompt {
    pub prompt: String,
    pub negative_prompt: String,
}

impl Selections {
    pub fn translate(&self) -> TranslatedSelections {
        let clothing = match self.clothing.trim() {
            "" => tables::DEFAULT_CLOTHING.to_string(),
            raw => tables::translate(tables::CLOTHING, raw),
        };
        TranslatedSelections {
            age: tables::translate(tables::AGE, or_default(&self.age, tables::DEFAULT_AGE)),
            gender: tables::translate(
                tables::GENDER,
                or_default(&self.gender, tables::DEFAULT_GENDER),
            ),
            ethnicity: tables::translate(
                tables::ETHNICITY,
                or_default(&self.ethnicity, tables::DEFAULT_ETHNICITY),
            ),
            clothing,
        }
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

pub fn build_prompt(
    selections: &Selections,
    background: BackgroundMode,
    mode: GenerationMode,
) -> BuiltPrompt {
    let translated = selections.translate();
    let mut prompt = String::new();

    match mode {
        GenerationMode::Generate => prompt.push_str("Professional high-quality photograph, "),
        GenerationMode::Transform => prompt.push_str(
            "Transform the reference image into a professional high-quality photograph, \
             keep the pose and framing of the reference, ",
        ),
    }
    prompt.push_str("REAR VIEW ONLY, back view, person facing away from camera, ");
    prompt.push_str("back of head visible, no face visible, view from behind, ");

    // "gender-neutral person" already names the subject
    let subject = if translated.gender.ends_with("person") {
        format!(
            "{} {} {}, ",
            translated.age, translated.ethnicity, translated.gender
        )
    } else {
        format!(
            "{} {} {} person, ",
            translated.age, translated.ethnicity, translated.gender
        )
    };
    prompt.push_str(&subject);
    prompt.push_str(&format!("wearing {}, ", translated.clothing));
    prompt.push_str("full body shot from behind, centered composition, ");

    match background {
        BackgroundMode::WithBackground => {
            prompt.push_str("elegant dark gradient background, studio lighting with subtle rim light, ");
            prompt.push_str("professional photography, dramatic lighting, ");
        }
        BackgroundMode::Transparent => {
            prompt.push_str("isolated on pure white background for easy background removal, ");
            prompt.push_str("clean studio lighting, simple background, ");
        }
    }

    prompt.push_str("photorealistic, high resolution, professional quality, ");
    prompt.push_str("detailed clothing texture, natural pose, standing upright");

    BuiltPrompt {
        prompt,
        negative_prompt: NEGATIVE_PROMPT.to_string(),
    }
}
