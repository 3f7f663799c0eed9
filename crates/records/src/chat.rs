//! Assistant conversationnel texte et synthèse de l'historique

use async_trait::async_trait;

use crate::{ChatMessage, MedicalReport, RecordsResult};

pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are MediInsight AI, a helpful medical assistant. \
Use simple, empathetic language. ALWAYS include a disclaimer: \
\"This is educational information, not medical advice.\"";

/// Service de réponse de l'assistant
///
/// Les implémentations remontent leurs échecs en `ChatFailure`.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn reply(&self, history: &[ChatMessage], message: &str) -> RecordsResult<String>;
}

/// Envoie `message` et ajoute l'échange à l'historique
///
/// En cas d'échec l'historique n'est pas modifié.
pub async fn converse(
    service: &dyn ChatService,
    history: &mut Vec<ChatMessage>,
    message: &str,
) -> RecordsResult<String> {
    let answer = service.reply(history, message).await?;
    history.push(ChatMessage::user(message));
    history.push(ChatMessage::assistant(answer.clone()));
    Ok(answer)
}

/// Historique `date: titre - résumé`, une ligne par rapport
///
/// `None` s'il n'y a encore aucun rapport.
pub fn insights_digest(reports: &[MedicalReport]) -> Option<String> {
    if reports.is_empty() {
        return None;
    }
    let lines: Vec<String> = reports
        .iter()
        .map(|r| format!("{}: {} - {}", r.date, r.title, r.summary))
        .collect();
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatRole, RecordsError, ReportKind};
    use chrono::NaiveDate;

    struct Echo;

    #[async_trait]
    impl ChatService for Echo {
        async fn reply(&self, history: &[ChatMessage], message: &str) -> RecordsResult<String> {
            Ok(format!("{} ({} messages)", message, history.len()))
        }
    }

    struct Down;

    #[async_trait]
    impl ChatService for Down {
        async fn reply(&self, _history: &[ChatMessage], _message: &str) -> RecordsResult<String> {
            Err(RecordsError::ChatFailure("quota dépassé".into()))
        }
    }

    #[tokio::test]
    async fn test_converse_appends_both_turns() {
        let mut history = Vec::new();
        assert_eq!(converse(&Echo, &mut history, "bonjour").await.unwrap(), "bonjour (0 messages)");
        assert_eq!(converse(&Echo, &mut history, "encore").await.unwrap(), "encore (2 messages)");

        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant, ChatRole::User, ChatRole::Assistant]);
    }

    #[tokio::test]
    async fn test_failure_leaves_history_untouched() {
        let mut history = vec![ChatMessage::user("avant")];
        let result = converse(&Down, &mut history, "question").await;
        assert!(matches!(result, Err(RecordsError::ChatFailure(_))));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_insights_digest() {
        assert_eq!(insights_digest(&[]), None);

        let report = MedicalReport {
            id: "r1".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            kind: ReportKind::Imaging,
            title: "Radio thorax".into(),
            summary: "Pas d'anomalie".into(),
            explanation: String::new(),
            indicators: vec![],
            disclaimer: None,
            file_url: None,
        };
        let mut older = report.clone();
        older.date = NaiveDate::from_ymd_opt(2023, 11, 2).unwrap();
        older.title = "Bilan".into();
        older.summary = "RAS".into();

        assert_eq!(
            insights_digest(&[report, older]).unwrap(),
            "2024-01-15: Radio thorax - Pas d'anomalie\n2023-11-02: Bilan - RAS"
        );
    }
}
