use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A model identifier understood by the inference API.
///
/// This can be one of the models the client ships a menu for, or a custom
/// string for models the hosted service added later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier
    Custom(String),
}

/// Models offered in the chat client's model menu.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// Llama 3.3 70B versatile
    #[serde(rename = "llama-3.3-70b-versatile")]
    Llama3370bVersatile,

    /// Llama 3.1 70B versatile
    #[serde(rename = "llama-3.1-70b-versatile")]
    Llama3170bVersatile,

    /// Llama 3.1 8B instant
    #[serde(rename = "llama-3.1-8b-instant")]
    Llama318bInstant,

    /// Mixtral 8x7B with a 32k context
    #[serde(rename = "mixtral-8x7b-32768")]
    Mixtral8x7b32768,

    /// Gemma 2 9B instruction tuned
    #[serde(rename = "gemma2-9b-it")]
    Gemma29bIt,
}

impl KnownModel {
    /// Every known model, in menu order.
    pub const ALL: [KnownModel; 5] = [
        KnownModel::Llama3370bVersatile,
        KnownModel::Llama3170bVersatile,
        KnownModel::Llama318bInstant,
        KnownModel::Mixtral8x7b32768,
        KnownModel::Gemma29bIt,
    ];

    /// The identifier sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Llama3370bVersatile => "llama-3.3-70b-versatile",
            KnownModel::Llama3170bVersatile => "llama-3.1-70b-versatile",
            KnownModel::Llama318bInstant => "llama-3.1-8b-instant",
            KnownModel::Mixtral8x7b32768 => "mixtral-8x7b-32768",
            KnownModel::Gemma29bIt => "gemma2-9b-it",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::Llama3370bVersatile)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{known_model}"),
            Model::Custom(custom) => write!(f, "{custom}"),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(KnownModel::ALL
            .iter()
            .find(|known| known.as_str() == s)
            .map(|known| Model::Known(*known))
            .unwrap_or_else(|| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Model::from(model.as_str())
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        match model.parse() {
            Ok(model) => model,
            Err(never) => match never {},
        }
    }
}
