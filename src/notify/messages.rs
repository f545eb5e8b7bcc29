use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "es")]
    Es,
    #[serde(rename = "pt-BR")]
    PtBr,
}

impl Language {
    /// Unknown or missing tags fall back to English.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("es") | Some("es-es") | Some("es-mx") => Language::Es,
            Some("pt") | Some("pt-br") => Language::PtBr,
            _ => Language::En,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::PtBr => "pt-BR",
        }
    }
}

/// Values substituted into reminder and closure texts.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageContext {
    pub first_name: String,
    pub dealership_name: String,
    /// "HH:MM" in dealership local time
    pub shift_end: String,
    pub auto_close_at: String,
}

pub fn reminder_message(lang: Language, ctx: &MessageContext) -> String {
    match lang {
        Language::En => format!(
            "Hi {}, your shift at {} ended at {}. Please clock out. Your shift will be closed automatically at {}.",
            ctx.first_name, ctx.dealership_name, ctx.shift_end, ctx.auto_close_at
        ),
        Language::Es => format!(
            "Hola {}, tu turno en {} terminó a las {}. Por favor registra tu salida. Tu turno se cerrará automáticamente a las {}.",
            ctx.first_name, ctx.dealership_name, ctx.shift_end, ctx.auto_close_at
        ),
        Language::PtBr => format!(
            "Olá {}, seu turno em {} terminou às {}. Por favor, registre sua saída. Seu turno será encerrado automaticamente às {}.",
            ctx.first_name, ctx.dealership_name, ctx.shift_end, ctx.auto_close_at
        ),
    }
}

pub fn auto_closed_message(lang: Language, ctx: &MessageContext) -> String {
    match lang {
        Language::En => format!(
            "Hi {}, your shift at {} was closed automatically at {} because no clock-out was recorded. A supervisor will review it.",
            ctx.first_name, ctx.dealership_name, ctx.auto_close_at
        ),
        Language::Es => format!(
            "Hola {}, tu turno en {} se cerró automáticamente a las {} porque no se registró tu salida. Un supervisor lo revisará.",
            ctx.first_name, ctx.dealership_name, ctx.auto_close_at
        ),
        Language::PtBr => format!(
            "Olá {}, seu turno em {} foi encerrado automaticamente às {} porque nenhuma saída foi registrada. Um supervisor irá revisá-lo.",
            ctx.first_name, ctx.dealership_name, ctx.auto_close_at
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MessageContext {
        MessageContext {
            first_name: "Luis".to_string(),
            dealership_name: "Bayside Motors".to_string(),
            shift_end: "17:00".to_string(),
            auto_close_at: "19:00".to_string(),
        }
    }

    #[test]
    fn test_language_tags() {
        assert_eq!(Language::from_tag(Some("es")), Language::Es);
        assert_eq!(Language::from_tag(Some("pt-BR")), Language::PtBr);
        assert_eq!(Language::from_tag(Some("PT")), Language::PtBr);
        assert_eq!(Language::from_tag(Some("fr")), Language::En);
        assert_eq!(Language::from_tag(None), Language::En);
    }

    #[test]
    fn test_language_serde_tags() {
        assert_eq!(serde_json::to_string(&Language::PtBr).unwrap(), "\"pt-BR\"");
        let parsed: Language = serde_json::from_str("\"es\"").unwrap();
        assert_eq!(parsed, Language::Es);
    }

    #[test]
    fn test_reminder_mentions_both_times() {
        for lang in [Language::En, Language::Es, Language::PtBr] {
            let text = reminder_message(lang, &ctx());
            assert!(text.contains("Luis"));
            assert!(text.contains("17:00"));
            assert!(text.contains("19:00"));
        }
    }

    #[test]
    fn test_auto_closed_is_localized() {
        assert!(auto_closed_message(Language::En, &ctx()).contains("closed automatically"));
        assert!(auto_closed_message(Language::Es, &ctx()).contains("se cerró automáticamente"));
        assert!(auto_closed_message(Language::PtBr, &ctx()).contains("encerrado automaticamente"));
    }
}
