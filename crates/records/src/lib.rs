//! Crate records - Dossier médical et services externes
//!
//! Collaborateurs de la session vocale, consommés par l'application :
//! - `types` : rapports, traitements, famille, messages
//! - `store` : persistance JSON par utilisateur
//! - `analysis` : validation des réponses du service d'analyse
//! - `chat` : assistant texte et synthèse de l'historique

mod analysis;
mod chat;
mod error;
mod store;
mod types;

pub use analysis::{
    analyze_document, parse_analysis_response, AnalysisResponse, AnalysisService, Document,
    ANALYSIS_FAILURE_MESSAGE,
};
pub use chat::{converse, insights_digest, ChatService, CHAT_SYSTEM_INSTRUCTION};
pub use error::{RecordsError, RecordsResult};
pub use store::{load_records, save_record, JsonFileStore, RecordStore};
pub use types::{
    ChatMessage, ChatRole, Collection, FamilyMember, HealthStatus, Indicator, Insertion, MedicalReport,
    Medication, Record, ReportKind,
};
