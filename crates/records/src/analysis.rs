//! Analyse de documents médicaux par un service externe
//!
//! Un aller-retour unique : le document part, une réponse JSON revient.
//! Ce module ne fait que valider cette réponse et la transformer en
//! `MedicalReport`. Pas de retry.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::{Indicator, MedicalReport, RecordsError, RecordsResult, ReportKind};

/// Message unique présenté à l'utilisateur quand l'analyse échoue
pub const ANALYSIS_FAILURE_MESSAGE: &str =
    "Impossible d'interpréter le document. Vérifiez que l'image est nette.";

/// Document à analyser, tel que reçu de l'interface
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub mime_type: String,
    /// Contenu encodé en base64
    pub data: String,
}

impl Document {
    /// Lit une data URL `data:<mime>;base64,<data>`
    ///
    /// Une chaîne qui n'a pas cette forme est prise telle quelle comme
    /// image JPEG.
    pub fn from_data_url(url: &str) -> Self {
        let parsed = url.strip_prefix("data:").and_then(|rest| {
            let (mime_type, data) = rest.split_once(";base64,")?;
            (!mime_type.is_empty() && !mime_type.contains(';') && !data.is_empty()).then(|| Self {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            })
        });
        parsed.unwrap_or_else(|| Self {
            mime_type: "image/jpeg".to_string(),
            data: url.to_string(),
        })
    }
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Rend le texte brut de la réponse du service
    async fn analyze(&self, document: &Document, file_name: &str) -> RecordsResult<String>;
}

/// Réponse validée du service d'analyse
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub title: String,
    pub summary: String,
    pub explanation: String,
    pub disclaimer: String,
    pub indicators: Vec<Indicator>,
}

impl AnalysisResponse {
    /// Rapport daté avec un identifiant neuf
    pub fn into_report(self, date: NaiveDate) -> MedicalReport {
        MedicalReport {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            kind: self.kind,
            title: self.title,
            summary: self.summary,
            explanation: self.explanation,
            indicators: self.indicators,
            disclaimer: Some(self.disclaimer),
            file_url: None,
        }
    }
}

/// Valide le texte renvoyé par le service
///
/// Vide ou non conforme : une seule erreur `AnalysisFailure`, le détail
/// part dans les logs. Les statuts inconnus deviennent `Normal`.
pub fn parse_analysis_response(text: &str) -> RecordsResult<AnalysisResponse> {
    if text.trim().is_empty() {
        warn!("Réponse d'analyse vide");
        return Err(RecordsError::AnalysisFailure(ANALYSIS_FAILURE_MESSAGE.to_string()));
    }
    serde_json::from_str(text).map_err(|e| {
        warn!(error = %e, "Réponse d'analyse non conforme");
        RecordsError::AnalysisFailure(ANALYSIS_FAILURE_MESSAGE.to_string())
    })
}

/// Analyse complète : appel du service, validation, datation
pub async fn analyze_document(
    service: &dyn AnalysisService,
    document: &Document,
    file_name: &str,
    date: NaiveDate,
) -> RecordsResult<MedicalReport> {
    let text = service.analyze(document, file_name).await?;
    Ok(parse_analysis_response(&text)?.into_report(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HealthStatus;

    const VALID: &str = r#"{
        "type": "Blood Test",
        "title": "Numération formule sanguine",
        "summary": "Hémoglobine basse. Le reste est normal.",
        "explanation": "Vous avez un peu moins de globules rouges que la normale.",
        "disclaimer": "Information éducative, pas un avis médical.",
        "indicators": [
            { "label": "Hémoglobine", "value": "11.2 g/dL", "range": "12-16", "status": "Borderline" },
            { "label": "Plaquettes", "value": "250", "status": "OK" }
        ]
    }"#;

    struct Scripted(&'static str);

    #[async_trait]
    impl AnalysisService for Scripted {
        async fn analyze(&self, _document: &Document, _file_name: &str) -> RecordsResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_parse_valid_response() {
        let response = parse_analysis_response(VALID).unwrap();
        assert_eq!(response.kind, ReportKind::BloodTest);
        assert_eq!(response.indicators[0].status, HealthStatus::Borderline);
        assert_eq!(response.indicators[1].status, HealthStatus::Normal);
        assert_eq!(response.indicators[1].range, "");
    }

    #[test]
    fn test_rejects_empty_and_invalid_output() {
        for text in ["", "   ", "pas du json", r#"{"title": "incomplet"}"#] {
            match parse_analysis_response(text) {
                Err(RecordsError::AnalysisFailure(message)) => assert_eq!(message, ANALYSIS_FAILURE_MESSAGE),
                other => panic!("échec attendu pour {:?}: {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_into_report_assigns_fresh_ids() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let a = parse_analysis_response(VALID).unwrap().into_report(date);
        let b = parse_analysis_response(VALID).unwrap().into_report(date);
        assert_ne!(a.id, b.id);
        assert_eq!(a.date, date);
        assert_eq!(a.flagged_indicators().count(), 1);
    }

    #[test]
    fn test_data_url_parsing() {
        let doc = Document::from_data_url("data:application/pdf;base64,JVBERi0=");
        assert_eq!(doc.mime_type, "application/pdf");
        assert_eq!(doc.data, "JVBERi0=");

        let raw = Document::from_data_url("/9j/4AAQSkZJRg==");
        assert_eq!(raw.mime_type, "image/jpeg");
        assert_eq!(raw.data, "/9j/4AAQSkZJRg==");
    }

    #[tokio::test]
    async fn test_analyze_document() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let doc = Document::from_data_url("data:image/png;base64,iVBORw0=");

        let report = analyze_document(&Scripted(VALID), &doc, "nfs.png", date).await.unwrap();
        assert_eq!(report.title, "Numération formule sanguine");

        let result = analyze_document(&Scripted(""), &doc, "nfs.png", date).await;
        assert!(matches!(result, Err(RecordsError::AnalysisFailure(_))));
    }
}
