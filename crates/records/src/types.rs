//! Types du dossier médical
//!
//! Les noms de champs JSON sont en camelCase, comme dans les fichiers
//! existants et les réponses du service d'analyse.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// État d'un indicateur biologique
///
/// Toute valeur inconnue (ou absente) est lue comme `Normal`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    #[default]
    Normal,
    Borderline,
    Concerning,
}

impl HealthStatus {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Borderline" => HealthStatus::Borderline,
            "Concerning" => HealthStatus::Concerning,
            _ => HealthStatus::Normal,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Normal => "Normal",
            HealthStatus::Borderline => "Borderline",
            HealthStatus::Concerning => "Concerning",
        }
    }
}

impl<'de> Deserialize<'de> for HealthStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(value.as_str().map(HealthStatus::from_label).unwrap_or_default())
    }
}

/// Nature du document analysé
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    #[serde(rename = "Blood Test")]
    BloodTest,
    Prescription,
    Imaging,
    #[serde(rename = "Doctor Note")]
    DoctorNote,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub label: String,
    pub value: String,
    /// Plage de référence, vide si le document n'en donne pas
    #[serde(default)]
    pub range: String,
    #[serde(default)]
    pub status: HealthStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReport {
    pub id: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub title: String,
    pub summary: String,
    /// Explication sans jargon pour le patient
    pub explanation: String,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl MedicalReport {
    /// Indicateurs qui ne sont pas `Normal`
    pub fn flagged_indicators(&self) -> impl Iterator<Item = &Indicator> {
        self.indicators.iter().filter(|i| i.status != HealthStatus::Normal)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub purpose: String,
    pub remaining_doses: u32,
}

impl Medication {
    /// Traitement en cours à la date donnée
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && self.end_date.is_none_or(|end| day <= end)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMember {
    pub id: String,
    pub name: String,
    pub relation: String,
}

impl FamilyMember {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            relation: "Family Member".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Où une collection range ses nouveaux éléments
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insertion {
    /// Le plus récent en tête
    Prepend,
    Append,
}

/// Collections persistées par utilisateur
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Reports,
    Medications,
    Family,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Reports, Collection::Medications, Collection::Family];

    /// Préfixe du fichier de la collection
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Reports => "reports",
            Collection::Medications => "meds",
            Collection::Family => "family",
        }
    }

    pub fn insertion(&self) -> Insertion {
        match self {
            Collection::Reports | Collection::Medications => Insertion::Prepend,
            Collection::Family => Insertion::Append,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "reports" => Some(Collection::Reports),
            "meds" | "medications" => Some(Collection::Medications),
            "family" => Some(Collection::Family),
            _ => None,
        }
    }
}

/// Type stocké dans une collection
pub trait Record: Serialize + serde::de::DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;
}

impl Record for MedicalReport {
    const COLLECTION: Collection = Collection::Reports;
}

impl Record for Medication {
    const COLLECTION: Collection = Collection::Medications;
}

impl Record for FamilyMember {
    const COLLECTION: Collection = Collection::Family;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_status_falls_back_to_normal() {
        let indicator: Indicator = serde_json::from_value(json!({
            "label": "Glucose",
            "value": "5.4 mmol/L",
            "status": "Élevé"
        }))
        .unwrap();
        assert_eq!(indicator.status, HealthStatus::Normal);
        assert_eq!(indicator.range, "");

        let indicator: Indicator = serde_json::from_value(json!({
            "label": "LDL", "value": "4.2", "range": "< 3.0", "status": "Concerning"
        }))
        .unwrap();
        assert_eq!(indicator.status, HealthStatus::Concerning);

        let indicator: Indicator =
            serde_json::from_value(json!({ "label": "HbA1c", "value": "6%", "status": null })).unwrap();
        assert_eq!(indicator.status, HealthStatus::Normal);
    }

    #[test]
    fn test_report_json_layout() {
        let report = MedicalReport {
            id: "r1".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            kind: ReportKind::BloodTest,
            title: "Bilan lipidique".into(),
            summary: "Cholestérol légèrement élevé.".into(),
            explanation: "Un peu trop de graisses dans le sang.".into(),
            indicators: vec![],
            disclaimer: None,
            file_url: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["type"], "Blood Test");
        assert_eq!(value["date"], "2024-03-02");
        assert!(value.get("fileUrl").is_none());
    }

    #[test]
    fn test_medication_activity() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let med = Medication {
            id: "m1".into(),
            name: "Amoxicilline".into(),
            dosage: "500mg".into(),
            frequency: "3x/jour".into(),
            start_date: day(5),
            end_date: Some(day(12)),
            purpose: "Infection".into(),
            remaining_doses: 21,
        };
        assert!(!med.is_active_on(day(4)));
        assert!(med.is_active_on(day(12)));
        assert!(!med.is_active_on(day(13)));

        let value = serde_json::to_value(&med).unwrap();
        assert_eq!(value["remainingDoses"], 21);
        assert_eq!(value["startDate"], "2024-01-05");
    }

    #[test]
    fn test_collections() {
        assert_eq!(Collection::parse("medications"), Some(Collection::Medications));
        assert_eq!(Collection::parse("notes"), None);
        assert_eq!(Collection::Family.insertion(), Insertion::Append);
        assert_eq!(Collection::Reports.insertion(), Insertion::Prepend);
        assert_eq!(ChatMessage::user("salut").role, ChatRole::User);
    }
}
