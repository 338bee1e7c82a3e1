use garde::Validate;
use serde::{Deserialize, Serialize};

/// The request payload for caption generation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CaptionRequest {
    #[garde(length(chars, min = 1, max = 200))]
    pub product_name: String,
    #[serde(default)]
    #[garde(length(chars, max = 32))]
    pub price: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 60))]
    pub condition: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 30))]
    pub whatsapp: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 60))]
    pub instagram: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 120))]
    pub store_name: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 120))]
    pub factory_name: Option<String>,
    #[garde(length(chars, min = 1, max = 40))]
    pub objective: String,
}

/// The response payload for caption generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionResponse {
    pub caption: String,
}

/// The marketing goal of a post; each one carries a fixed tone preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Venda,
    Promocao,
    Lancamento,
    Engajamento,
    Institucional,
}

impl Objective {
    /// Maps a free-form label to a preset. Unknown labels sell.
    pub fn from_label(label: &str) -> Self {
        let folded: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(fold_accent)
            .collect();

        match folded.as_str() {
            "venda" | "vender" | "sale" => Objective::Venda,
            "promocao" | "oferta" | "promotion" => Objective::Promocao,
            "lancamento" | "novidade" | "launch" => Objective::Lancamento,
            "engajamento" | "engagement" => Objective::Engajamento,
            "institucional" | "marca" | "branding" => Objective::Institucional,
            _ => Objective::Venda,
        }
    }

    /// Writing instructions handed to the model.
    pub fn tone(&self) -> &'static str {
        match self {
            Objective::Venda => {
                "Tom direto e persuasivo, focado nos benefícios do produto e com uma chamada clara para compra."
            }
            Objective::Promocao => {
                "Tom de urgência e entusiasmo, destacando o preço e a oportunidade por tempo limitado."
            }
            Objective::Lancamento => {
                "Tom de novidade e exclusividade, gerando curiosidade sobre o lançamento."
            }
            Objective::Engajamento => {
                "Tom leve e conversacional, terminando com uma pergunta que convide o público a comentar."
            }
            Objective::Institucional => {
                "Tom confiável e profissional, valorizando a marca, a qualidade e a tradição da loja."
            }
        }
    }
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        other => other,
    }
}
