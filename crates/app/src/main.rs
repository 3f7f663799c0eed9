// Assistant vocal : session temps réel en ligne de commande
//
// Sous-commandes :
// - talk    : conversation réelle (micro, haut-parleurs, WebSocket)
// - demo    : même machine à états, périphériques et distant simulés
// - devices : périphériques audio par défaut
// - records : contenu du dossier médical local

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use audio::{devices::default_devices, pcm, simulated::sine_block, CpalDevices, SimulatedDevices};
use clap::{Parser, Subcommand};
use network::{SimulatedConnector, WebSocketConnector};
use records::{load_records, Collection, FamilyMember, JsonFileStore, MedicalReport, Medication};
use session::{SessionConfig, SessionEvent, SessionReport, SessionState, VoiceSession};
use tokio::sync::mpsc;
use tracing_subscriber::prelude::*;

use crate::config::FileConfig;

#[derive(Parser)]
#[command(author, version, about = "Assistant vocal temps réel")]
struct Cli {
    /// Fichier de configuration TOML
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Conversation vocale avec le service distant
    Talk,
    /// Conversation simulée, sans micro ni réseau
    Demo,
    /// Liste les périphériques audio par défaut
    Devices,
    /// Affiche le dossier d'un utilisateur
    Records {
        #[arg(short, long)]
        user: String,
        /// reports, meds ou family (toutes par défaut)
        #[arg(long)]
        collection: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let file = FileConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Talk => run_talk(&file).await,
        Commands::Demo => run_demo().await,
        Commands::Devices => {
            show_devices();
            Ok(())
        }
        Commands::Records { user, collection } => show_records(&file, &user, collection.as_deref()).await,
    }
}

/// Conversation réelle jusqu'à Ctrl+C ou fermeture par le distant
async fn run_talk(file: &FileConfig) -> Result<()> {
    let api_key = config::api_key().with_context(|| format!("{} manquante (environnement ou .env)", config::API_KEY_VAR))?;
    let config = file.session_config(api_key);
    config.validate().map_err(anyhow::Error::msg)?;

    let (session, events) = VoiceSession::new(config, Arc::new(CpalDevices), Arc::new(WebSocketConnector));
    let handle = session.handle();
    let task = tokio::spawn(session.run());

    println!("🎙️  Assistant vocal");
    println!("==================");
    println!("💬 Parlez quand la session est active, Ctrl+C pour arrêter");

    let printer = tokio::spawn(print_events(events));
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\n⏹️  Arrêt demandé...");
            if handle.stop().is_err() {
                tracing::debug!("Session déjà fermée");
            }
        }
        _ = handle.wait_for(SessionState::Closed) => {}
    }

    let outcome = task.await?;
    printer.await?;
    match outcome {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            println!("❌ {}", e);
            Err(e.into())
        }
    }
}

/// Conversation scriptée : voix, barge-in, fin de tour, fermeture
async fn run_demo() -> Result<()> {
    let config = SessionConfig::test_config();
    let block = config.audio.capture_block_size;
    let blocks: Vec<_> = (0..8)
        .map(|_| sine_block(block, config.audio.input_sample_rate, 440.0, 0.2))
        .collect();
    let devices = SimulatedDevices::new(blocks).with_interval(config.audio.block_duration());
    let output = devices.output();
    let output_rate = config.audio.output_sample_rate;

    let (connector, remote) = SimulatedConnector::new();
    let (session, events) = VoiceSession::new(config, Arc::new(devices), Arc::new(connector));
    let handle = session.handle();
    let task = tokio::spawn(session.run());
    let printer = tokio::spawn(print_events(events));

    // Horloge de la sortie simulée, au rythme réel
    let clock = tokio::spawn({
        let output = output.clone();
        async move {
            let step = Duration::from_millis(10);
            let mut ticker = tokio::time::interval(step);
            loop {
                ticker.tick().await;
                output.advance(step);
            }
        }
    });

    println!("🎭 Démo : conversation simulée");
    println!("=============================");

    if handle.wait_for(SessionState::Active).await != SessionState::Active {
        clock.abort();
        task.await??;
        anyhow::bail!("la session simulée n'a pas démarré");
    }

    let voice = |ms: u64| {
        let frames = (output_rate as u64 * ms / 1000) as usize;
        let frame = pcm::frame_from_f32(&sine_block(frames, output_rate, 220.0, 0.3), output_rate, 1);
        pcm::to_le_bytes(frame.samples())
    };

    remote.send_transcript("Bonjour, ");
    remote.send_audio(&voice(400));
    remote.send_transcript("je peux vous expliquer vos résultats.");
    remote.send_audio(&voice(400));
    tokio::time::sleep(Duration::from_millis(300)).await;

    // L'utilisateur coupe la parole
    remote.interrupt();
    tokio::time::sleep(Duration::from_millis(50)).await;

    remote.send_transcript("Je vous écoute.");
    remote.send_audio(&voice(200));
    remote.turn_complete();
    tokio::time::sleep(Duration::from_millis(400)).await;

    remote.close();
    let report = task.await??;
    clock.abort();
    printer.await?;

    println!("\n📅 Timeline de lecture réalisée :");
    let stopped = output.stopped();
    for (id, start) in output.started() {
        let status = if stopped.contains(&id) { "coupée" } else { "jouée" };
        println!("   unité {} : début {}ms ({})", id, start.as_millis(), status);
    }
    println!("📤 Trames micro envoyées : {}", remote.media_messages().len());
    print_report(&report);
    Ok(())
}

async fn print_events(mut events: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::StateChanged(state) => println!("🔄 État : {}", state),
            SessionEvent::Speaking => println!("🗣️  L'assistant parle"),
            SessionEvent::Listening => println!("👂 À vous"),
            SessionEvent::Transcript(text) => println!("📝 {}", text),
            SessionEvent::TurnComplete(text) => println!("✅ Fin du tour : {}", text),
            SessionEvent::Interrupted { flushed } => println!("✋ Interruption ({} unités coupées)", flushed),
            SessionEvent::ChunkDropped { reason } => println!("⚠️  Chunk ignoré : {}", reason),
            SessionEvent::Closed { reason } => println!("🔚 Session fermée : {}", reason),
        }
    }
}

fn print_report(report: &SessionReport) {
    let stats = &report.stats;
    println!("\n📊 Bilan ({}) :", report.reason);
    println!("   Trames envoyées : {}", stats.frames_sent);
    println!("   Chunks reçus : {}", stats.chunks_received);
    if stats.chunks_dropped > 0 {
        println!("   ⚠️  Chunks ignorés : {}", stats.chunks_dropped);
    }
    println!("   Interruptions : {} ({} unités coupées)", stats.interruptions, stats.units_flushed);
    println!("   Tours : {}", stats.turns);
}

fn show_devices() {
    println!("🎛️  Périphériques audio");
    println!("======================");

    let (input, output) = default_devices();
    match input {
        Some(d) => println!("🎤 Entrée : {} ({} Hz, {} canaux)", d.name, d.default_sample_rate, d.channels),
        None => println!("❌ Aucun microphone"),
    }
    match output {
        Some(d) => println!("🔊 Sortie : {} ({} Hz, {} canaux)", d.name, d.default_sample_rate, d.channels),
        None => println!("❌ Aucune sortie audio"),
    }
}

async fn show_records(file: &FileConfig, user: &str, collection: Option<&str>) -> Result<()> {
    let collections = match collection {
        Some(name) => vec![Collection::parse(name).with_context(|| format!("Collection inconnue: {}", name))?],
        None => Collection::ALL.to_vec(),
    };
    let store = JsonFileStore::new(file.records.data_dir.clone());

    for collection in collections {
        match collection {
            Collection::Reports => {
                let reports: Vec<MedicalReport> = load_records(&store, user).await?;
                println!("📄 Rapports ({}) :", reports.len());
                for r in &reports {
                    let flagged = r.flagged_indicators().count();
                    println!("   {} {:?} - {} ({} indicateur(s) à surveiller)", r.date, r.kind, r.title, flagged);
                }
            }
            Collection::Medications => {
                let meds: Vec<Medication> = load_records(&store, user).await?;
                println!("💊 Traitements ({}) :", meds.len());
                for m in &meds {
                    println!("   {} {} - {} ({} doses restantes)", m.name, m.dosage, m.frequency, m.remaining_doses);
                }
            }
            Collection::Family => {
                let members: Vec<FamilyMember> = load_records(&store, user).await?;
                println!("👪 Famille ({}) :", members.len());
                for m in &members {
                    println!("   {} ({})", m.name, m.relation);
                }
            }
        }
    }
    Ok(())
}
