//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::config::PlayerConfig;
use crate::engine::{AudioBackend, SimulatedBackend};
use crate::playlist::Playlist;
use crate::session::{Session, UserAction};
use crate::state::{FilePreferences, MemoryPreferences, PreferenceStore};
use crate::visual::RecordingEffect;

/// One entry of a simulation script
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptStep {
    /// Virtual time of the step
    pub at_ms: u64,
    #[serde(default)]
    pub action: Option<UserAction>,
    #[serde(default)]
    pub effect: Option<EffectCommand>,
}

/// Background effect lifecycle in a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectCommand {
    Attach,
    Detach,
}

/// Parse a simulation script. Steps are sorted by time, keeping file order
/// for equal times.
pub fn parse_script(json: &str) -> Result<Vec<ScriptStep>> {
    let mut steps: Vec<ScriptStep> =
        serde_json::from_str(json).context("Script must be a JSON array of steps")?;
    steps.sort_by_key(|step| step.at_ms);
    Ok(steps)
}

/// Replay `steps` against `session`, writing one JSON view per step
///
/// A step without action or effect only takes a snapshot.
pub fn run_script<B: AudioBackend>(
    session: &mut Session<B>,
    steps: &[ScriptStep],
    out: &mut impl Write,
) -> Result<()> {
    for step in steps {
        session.run_until(step.at_ms);

        match step.effect {
            Some(EffectCommand::Attach) => session.attach_effect(Box::new(RecordingEffect::new())),
            Some(EffectCommand::Detach) => session.detach_effect(),
            None => {}
        }
        if let Some(action) = step.action {
            session.dispatch(action);
        }

        let view = serde_json::to_string(&session.view())?;
        writeln!(out, "{}", view)?;
    }
    Ok(())
}

fn load_playlist(path: Option<&Path>) -> Result<Playlist> {
    match path {
        Some(path) => Playlist::load(path)
            .with_context(|| format!("Failed to load playlist {}", path.display())),
        None => Ok(Playlist::label_default()),
    }
}

fn load_config(path: Option<&Path>) -> Result<PlayerConfig> {
    match path {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(PlayerConfig::default()),
    }
}

/// Run a simulation script and print the session views.
pub fn simulate(
    script: &Path,
    playlist: Option<&Path>,
    config: Option<&Path>,
    prefs_dir: Option<&Path>,
    session_id: Option<&str>,
) -> Result<()> {
    info!("Simulating script: {}", script.display());

    let content = fs::read_to_string(script)
        .with_context(|| format!("Failed to read script {}", script.display()))?;
    let steps = parse_script(&content)?;
    let playlist = load_playlist(playlist)?;
    let config = load_config(config)?;

    let prefs: Box<dyn PreferenceStore> = match prefs_dir {
        Some(dir) => {
            let prefs = FilePreferences::open(dir, session_id)
                .with_context(|| format!("Failed to open preferences in {}", dir.display()))?;
            info!("Session id: {}", prefs.session_id());
            Box::new(prefs)
        }
        None => Box::new(MemoryPreferences::new()),
    };

    let mut session = Session::new(config, playlist, SimulatedBackend::new(), prefs)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_script(&mut session, &steps, &mut out)?;

    Ok(())
}

/// Print the playlist.
pub fn show_playlist(path: Option<&Path>) -> Result<()> {
    let playlist = load_playlist(path)?;

    for (index, track) in playlist.tracks().iter().enumerate() {
        println!(
            "{:>2}. {} - {} [{}]",
            index + 1,
            track.artist,
            track.title,
            track.audio_source
        );
    }

    Ok(())
}

/// Print stored preferences and sessions.
pub fn prefs_show(dir: &Path) -> Result<()> {
    let snapshot = FilePreferences::snapshot(dir)
        .with_context(|| format!("Failed to read preferences in {}", dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Delete all stored preferences.
pub fn prefs_reset(dir: &Path) -> Result<()> {
    info!("Resetting preferences in: {}", dir.display());
    FilePreferences::reset(dir)
        .with_context(|| format!("Failed to reset preferences in {}", dir.display()))?;
    println!("Preferences reset: {}", dir.display());
    Ok(())
}

/// Delete stale session records.
pub fn prefs_prune(dir: &Path, max_age_hours: i64) -> Result<()> {
    if max_age_hours < 0 {
        warn!("Negative max age, every session counts as stale");
    }
    let removed = FilePreferences::prune_sessions(dir, chrono::Duration::hours(max_age_hours))
        .with_context(|| format!("Failed to prune sessions in {}", dir.display()))?;
    println!("Removed {} session(s)", removed);
    Ok(())
}

/// Print the effective configuration.
pub fn show_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
