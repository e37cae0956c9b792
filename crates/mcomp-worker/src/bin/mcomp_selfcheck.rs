use std::path::Path;
use std::process::Command;

use mcomp_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "mcomp-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    ensure_workdir(&config.work_dir).await?;
    ensure_ffmpeg()?;

    println!(
        "mcomp-selfcheck: ok (slots={}, per_hour={}, per_day={}, timeout={}s)",
        config.max_concurrent_processes,
        config.max_files_per_hour,
        config.max_files_per_day,
        config.process_timeout.as_secs()
    );
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;

    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_ffmpeg() -> anyhow::Result<()> {
    let binary = mcomp_media::check_ffmpeg()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    let output = Command::new(&binary)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not runnable: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "ffmpeg -version failed: {:?}",
            output.status
        ));
    }
    Ok(())
}
