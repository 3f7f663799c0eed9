//! Erreurs du crate records

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordsError {
    /// Réponse d'analyse vide ou illisible
    #[error("Analyse du document impossible: {0}")]
    AnalysisFailure(String),

    #[error("Assistant indisponible: {0}")]
    ChatFailure(String),

    /// Identifiant utilisateur inutilisable comme nom de fichier
    #[error("Identifiant invalide: {0:?}")]
    InvalidKey(String),

    #[error("Erreur d'E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erreur de sérialisation: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RecordsResult<T> = Result<T, RecordsError>;
