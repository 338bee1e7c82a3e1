use garde::Validate;

use crate::clients::llm::CaptionModel;
use crate::error::{AppError, Result};
use crate::models::caption::{CaptionRequest, CaptionResponse, Objective};

const SYSTEM_PROMPT: &str = "Você é um redator especialista em marketing para redes sociais de lojas brasileiras. \
Escreva legendas em português do Brasil, com no máximo 600 caracteres, emojis com moderação \
e até 5 hashtags relevantes no final. Nunca invente preços, prazos ou condições que não foram informados.";

/// Builds the user prompt for a validated request.
pub fn build_prompt(request: &CaptionRequest) -> String {
    let objective = Objective::from_label(&request.objective);

    let mut lines = vec![format!("Produto: {}", request.product_name.trim())];

    let optional = [
        ("Preço", &request.price),
        ("Condição", &request.condition),
        ("Loja", &request.store_name),
        ("Fabricante", &request.factory_name),
        ("WhatsApp para contato", &request.whatsapp),
        ("Instagram", &request.instagram),
    ];
    for (label, value) in optional {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            lines.push(format!("{}: {}", label, value));
        }
    }

    lines.push(format!("Objetivo do post: {}", request.objective.trim()));
    lines.push(format!("Tom: {}", objective.tone()));
    lines.push("Escreva apenas a legenda, sem comentários adicionais.".to_string());

    lines.join("\n")
}

/// Validates the request and asks the model for a caption.
///
/// # Arguments
///
/// * `model` - The configured caption model, if any.
/// * `request` - The incoming request.
///
/// # Returns
///
/// A `Result` containing the generated caption.
pub async fn generate_caption(
    model: Option<&dyn CaptionModel>,
    request: &CaptionRequest,
) -> Result<CaptionResponse> {
    request
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;

    let model = model.ok_or_else(|| {
        AppError::NotConfigured("Caption generation is not configured on this server".to_string())
    })?;

    tracing::info!(
        "✍️ Generating caption for {:?} ({:?})",
        request.product_name,
        Objective::from_label(&request.objective)
    );

    let caption = model.complete(SYSTEM_PROMPT, &build_prompt(request)).await?;

    Ok(CaptionResponse { caption })
}
