//! Accumulation de la transcription de la voix synthétisée

/// Concatène les fragments reçus jusqu'à la fin du tour
#[derive(Debug, Default, Clone)]
pub struct TranscriptAccumulator {
    current: String,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.current.push_str(fragment);
    }

    /// Texte du tour en cours
    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Termine le tour : rend le texte accumulé et vide le buffer
    pub fn complete_turn(&mut self) -> String {
        std::mem::take(&mut self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_are_appended_in_order() {
        let mut transcript = TranscriptAccumulator::new();
        transcript.push("Bonjour");
        transcript.push(", comment");
        transcript.push(" allez-vous ?");
        assert_eq!(transcript.current(), "Bonjour, comment allez-vous ?");
    }

    #[test]
    fn test_turn_complete_clears() {
        let mut transcript = TranscriptAccumulator::new();
        transcript.push("Fin");
        assert_eq!(transcript.complete_turn(), "Fin");
        assert!(transcript.is_empty());
        assert_eq!(transcript.complete_turn(), "");
    }
}
