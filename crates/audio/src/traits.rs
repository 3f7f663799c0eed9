//! Traits abstraits pour le système audio
//!
//! Ce module définit les interfaces que doivent implémenter les composants
//! audio. La session vocale ne connaît que ces traits : on peut donc la faire
//! tourner sur cpal en production et sur des périphériques simulés en test.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AudioConfig, AudioFrame, AudioResult, EnvelopePayload, OutputEvent, PlaybackUnit, Sample, UnitId};

/// Trait pour capturer l'audio depuis un périphérique d'entrée
///
/// Implémentations :
/// - CpalCapture : microphone réel via cpal
/// - SimulatedCapture : blocs scriptés pour les tests
///
/// `#[async_trait]` permet d'avoir des fonctions async dans les traits.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Démarre la capture audio
    ///
    /// # Erreurs
    /// - `AudioError::DeviceUnavailable` : le microphone ne peut pas être ouvert
    async fn start(&mut self) -> AudioResult<()>;

    /// Arrête la capture et libère le périphérique
    async fn stop(&mut self) -> AudioResult<()>;

    /// Attend le prochain bloc de taille fixe
    ///
    /// C'est le point de backpressure de la capture : la fonction suspend
    /// jusqu'à ce qu'un bloc complet soit disponible, sans jamais boucler
    /// activement.
    ///
    /// # Erreurs
    /// - `AudioError::DeviceDisconnected` : micro débranché ou flux terminé
    async fn next_block(&mut self) -> AudioResult<Vec<Sample>>;

    /// Vérifie si la capture est active
    fn is_recording(&self) -> bool;

    /// Nom du périphérique, pour l'interface ou le debug
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Sortie audio pilotée par le scheduler
///
/// Le sink expose sa propre horloge (position de lecture) et joue chaque
/// unité à l'instant `unit.start` de cette horloge. Quand une unité a fini
/// de jouer, `OutputEvent::Finished` est envoyé sur le canal fourni à
/// l'ouverture. Une unité arrêtée via `stop_unit` ne notifie pas. Si le
/// périphérique disparaît, le sink envoie `OutputEvent::DeviceLost`.
///
/// Les méthodes ne bloquent jamais : elles sont appelées sous le verrou
/// du scheduler.
pub trait AudioSink: Send {
    /// Position actuelle sur la timeline de sortie
    fn current_time(&self) -> Duration;

    /// Programme une unité à sa position
    fn start_unit(&mut self, unit: PlaybackUnit) -> AudioResult<()>;

    /// Arrête immédiatement une unité, qu'elle soit en cours ou en attente
    fn stop_unit(&mut self, id: UnitId);

    /// Libère le périphérique de sortie
    fn close(&mut self);

    fn device_info(&self) -> String {
        "Périphérique de sortie inconnu".to_string()
    }
}

/// Trait pour encoder/décoder l'audio au format de transport
///
/// Conversion pure et sans état dans les deux sens.
pub trait AudioCodec: Send + Sync {
    /// Enveloppe une frame pour l'envoi
    fn encode(&self, frame: &AudioFrame) -> EnvelopePayload;

    /// Déballe un payload reçu
    ///
    /// # Erreurs
    /// - `AudioError::MalformedPayload` : longueur incompatible avec le nombre de canaux
    fn decode(&self, payload: &EnvelopePayload) -> AudioResult<AudioFrame>;

    fn codec_info(&self) -> String {
        "Codec audio".to_string()
    }
}

/// Fabrique de périphériques pour une session
///
/// La session ouvre le micro avant le canal réseau, puis la sortie une
/// fois le handshake terminé. Chaque périphérique ouvert appartient
/// exclusivement à la session jusqu'à sa fermeture.
pub trait DeviceProvider: Send + Sync {
    /// Acquiert le microphone
    fn open_capture(&self, config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>>;

    /// Acquiert la sortie ; fins d'unités et perte du périphérique arrivent sur `events`
    fn open_output(
        &self,
        config: &AudioConfig,
        events: mpsc::UnboundedSender<OutputEvent>,
    ) -> AudioResult<Box<dyn AudioSink>>;
}
