use serde::Serialize;

use super::AnalysisRequest;

pub const TEMPERATURE: f64 = 0.3;
pub const MAX_TOKENS: u32 = 1000;

pub const SYSTEM_PROMPT: &str = r#"Você é um nutricionista especializado em análise de alimentos. Analise a imagem fornecida e retorne APENAS um JSON válido (sem markdown, sem explicações extras) com a seguinte estrutura:

{
  "calories": número_total_de_calorias,
  "description": "descrição_detalhada_da_refeição",
  "foods": ["alimento1", "alimento2", "alimento3"],
  "portions": "descrição_das_porções_estimadas",
  "confidence": "alta|média|baixa",
  "sources": "Fontes: Google Nutrition, Tabela TACO, USDA"
}

IMPORTANTE:
- Seja preciso nas calorias baseando-se em porções visíveis
- Liste todos os alimentos identificados
- Indique o nível de confiança usando exatamente "alta", "média" ou "baixa"
- Use dados nutricionais de fontes confiáveis (Google Nutrition, Tabela TACO, USDA)
- Retorne APENAS o JSON, sem texto adicional"#;

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: String },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl<'a> {
    pub url: &'a str,
    pub detail: &'static str,
}

pub fn build_request<'a>(model: &'a str, req: &'a AnalysisRequest) -> ChatCompletionRequest<'a> {
    let instruction = format!(
        "Analise esta {} e forneça informações nutricionais detalhadas.",
        req.meal_type_label()
    );

    ChatCompletionRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(SYSTEM_PROMPT),
            },
            ChatMessage {
                role: "user",
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: instruction },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: &req.image_url,
                            detail: "high",
                        },
                    },
                ]),
            },
        ],
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
    }
}
