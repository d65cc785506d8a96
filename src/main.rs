// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use qmixer::config::MixerConfig;
use qmixer::mixer::cpal::{list_devices, OutputStream};
use qmixer::mixer::software::SoftwareMixer;
use qmixer::mixer::{completion_channel, mock, Mixer};
use qmixer::sound::{Proximity, SoundManager};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often the play command runs housekeeping while waiting.
const UPDATE_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A multi-channel sound mixer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Validates a mixer configuration and prints the effective values.
    Check {
        /// The path to the mixer config.
        config_path: String,
    },
    /// Plays wave files through the mixer and waits until they finish.
    Play {
        /// The path to the mixer config.
        config_path: String,
        /// The wave files to play, all at once.
        #[arg(required = true)]
        files: Vec<String>,
        /// Channel volume, 0-100.
        #[arg(short, long, default_value_t = 100)]
        volume: u32,
        /// Fade in over this many seconds.
        #[arg(short, long, default_value_t = 0)]
        fade: u32,
        /// Horizontal angle in degrees, positive to the right.
        #[arg(short, long, default_value_t = 0.0, allow_hyphen_values = true)]
        azimuth: f64,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Check { config_path } => {
            let config = MixerConfig::deserialize(&PathBuf::from(&config_path))?;
            println!("Configuration {} is valid:", config_path);
            println!("- device: {}", config.device());
            println!("- sample rate: {}Hz", config.sample_rate());
            println!("- channels: {}", config.channels());
            println!("- slots: {}", config.slot_capacity());
            println!("- latency: {:?}", config.latency()?);
            println!("- volume ramp: {:?}", config.volume_ramp()?);
            println!(
                "- percents: music={} speech={} master={} parrot={}",
                config.music_percent(),
                config.speech_percent(),
                config.master_percent(),
                config.parrot_percent()
            );
            println!("- sounds: {}", config.sounds_path().display());
        }
        Commands::Play {
            config_path,
            files,
            volume,
            fade,
            azimuth,
        } => play(&PathBuf::from(config_path), &files, volume, fade, azimuth)?,
    }

    Ok(())
}

fn play(
    config_path: &Path,
    files: &[String],
    volume: u32,
    fade: u32,
    azimuth: f64,
) -> Result<(), Box<dyn Error>> {
    let config = MixerConfig::deserialize(config_path)?;
    let (tx, rx) = completion_channel();

    let mut mock_mixer = None;
    let mut _stream = None;
    let mixer: Arc<dyn Mixer> = if config.device() == "mock" {
        let mixer = Arc::new(mock::Mixer::new("cli", config.channels(), tx));
        mock_mixer = Some(mixer.clone());
        mixer
    } else {
        let mixer = Arc::new(SoftwareMixer::new(
            config.channels(),
            config.sample_rate(),
            tx,
        ));
        _stream = Some(OutputStream::start(config.device(), mixer.clone())?);
        mixer
    };
    let manager = SoundManager::new(&config, mixer, rx)?;

    let current_dir = std::env::current_dir()?;
    for file in files {
        let path = current_dir.join(file);
        let wave = manager
            .load_sound(&path.to_string_lossy())
            .ok_or_else(|| format!("unable to load {}", file))?;

        let initial_volume = if fade > 0 { 0 } else { volume };
        let handle = manager
            .play_sound(
                &wave,
                Proximity::new()
                    .volume(initial_volume)
                    .polar(1.0, azimuth, 0.0),
            )
            .ok_or_else(|| format!("no free channel for {}", file))?;
        if fade > 0 {
            manager.set_volume(handle, volume, fade);
        }
        info!(file, handle = %handle, "Playing");
    }

    if let Some(mixer) = mock_mixer {
        // The mock never renders, so show what it was asked to do instead of waiting.
        for command in mixer.commands() {
            println!("{:?}", command);
        }
        manager.stop_all_channels();
        return Ok(());
    }

    while manager.active_sounds() > 0 {
        manager.update_sounds();
        spin_sleep::sleep(UPDATE_INTERVAL);
    }
    info!("All sounds finished");
    Ok(())
}
