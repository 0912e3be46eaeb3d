//! Check system capabilities.

use deid_classifier::load_classifier;
use deid_common::cancel::CancelToken;
use deid_common::config::{config_file_path, AppConfig};
use deid_media::FfmpegRunner;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("deid System Check");
    println!("{}", "=".repeat(50));

    let runner = FfmpegRunner::new(&config.tools, CancelToken::new());
    let mut ready = true;

    if runner.ffmpeg_available() {
        println!("[OK] ffmpeg: {}", runner.ffmpeg().display());
    } else {
        println!("[MISSING] ffmpeg: {}", runner.ffmpeg().display());
        ready = false;
    }
    if runner.ffprobe_available() {
        println!("[OK] ffprobe: {}", runner.ffprobe().display());
    } else {
        println!("[MISSING] ffprobe: {}", runner.ffprobe().display());
        ready = false;
    }

    let weights = &config.model.weights;
    if weights.is_file() {
        match load_classifier(&config.model) {
            Ok(classifier) => println!(
                "[OK] Model weights: {} ({})",
                weights.display(),
                classifier.name()
            ),
            Err(e) => {
                println!("[ERROR] Model weights: {}: {}", weights.display(), e.report());
                ready = false;
            }
        }
    } else {
        println!("[MISSING] Model weights: {}", weights.display());
        ready = false;
    }

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[INFO] Config: defaults (run `deid init` to write {})", config_path.display());
    }

    println!();
    println!("  Mode: {}", config.processing.mode.as_str());
    println!("  Working dir: {}", config.paths.working_dir.display());
    println!("  Shared dir: {}", config.paths.shared_dir.display());
    println!("  Translation log: {}", config.paths.translation_log_path().display());

    println!();
    if ready {
        println!("All required components are available. deid is ready.");
    } else {
        println!("Some required components are missing. See above.");
    }
    Ok(())
}
