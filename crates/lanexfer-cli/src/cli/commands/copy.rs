//! `lanexfer copy` – local file to local file through the lane engine.

use anyhow::{bail, Context, Result};
use lanexfer_core::config::XferConfig;
use lanexfer_core::protocol::{LocalProtocol, Source};
use lanexfer_core::{ProgressStats, SessionStatus, Transfer};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const PROGRESS_INTERVAL_MS: u64 = 500;

/// Parsed `copy` flags; `None` falls back to the config value.
#[derive(Debug, Clone)]
pub struct CopyArgs {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub lanes: Option<usize>,
    pub block_size: Option<u64>,
    pub cache_bytes: Option<u64>,
    pub resume: bool,
    pub overwrite: bool,
    pub verify: bool,
}

pub async fn run_copy(cfg: &XferConfig, args: CopyArgs) -> Result<()> {
    let mut opts = cfg.transfer_options();
    if let Some(n) = args.lanes {
        opts.saver.lanes = n.max(1);
    }
    if let Some(b) = args.block_size {
        opts.saver.block_size = b.max(1);
    }
    if let Some(c) = args.cache_bytes {
        opts.saver.cache_bytes_per_lane = c.max(1);
    }
    opts.saver.resume = cfg.resume && args.resume;
    opts.saver.overwrite = cfg.overwrite || args.overwrite;
    opts.verify_checksum = cfg.verify_checksum && args.verify;

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressStats>(16);
    let progress_handle = tokio::spawn(async move {
        let mut last_print: Option<Instant> = None;
        while let Some(stats) = progress_rx.recv().await {
            let now = Instant::now();
            let due = last_print
                .map_or(true, |t| now.duration_since(t).as_millis() as u64 >= PROGRESS_INTERVAL_MS);
            if due || stats.status != SessionStatus::Running {
                let done_mib = stats.bytes_done as f64 / 1_048_576.0;
                let total = stats
                    .total_bytes
                    .map(|t| format!("{:.1}", t as f64 / 1_048_576.0))
                    .unwrap_or_else(|| "?".to_string());
                let eta = stats
                    .eta_secs()
                    .map(|s| format!("{:.0}s", s))
                    .unwrap_or_else(|| "?".to_string());
                eprint!(
                    "\r  {:.1} / {} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  ",
                    done_mib,
                    total,
                    stats.fraction() * 100.0,
                    stats.bytes_per_sec() / 1_048_576.0,
                    eta
                );
                last_print = Some(now);
            }
        }
        eprintln!();
    });

    let src = args.src.clone();
    let dest = args.dest.clone();
    let started = Instant::now();
    let transfer = tokio::task::spawn_blocking(move || -> Result<Arc<Transfer>> {
        let proto = LocalProtocol::open(Source::Path(src.clone()), &dest, opts)
            .with_context(|| format!("preparing {} -> {}", src.display(), dest.display()))?;
        let transfer = Arc::new(Transfer::new(Arc::new(proto)).with_progress(progress_tx));
        transfer.start(false)?;
        Ok(transfer)
    })
    .await??;

    let status = run_until_interrupted(Arc::clone(&transfer), tokio::signal::ctrl_c()).await?;

    let (joined, info, fault) = tokio::task::spawn_blocking(move || -> Result<_> {
        let joined = transfer.join();
        let info = transfer.save_info()?;
        let fault = transfer.fault();
        transfer.close()?;
        Ok((joined, info, fault))
    })
    .await??;
    if let Err(e) = progress_handle.await {
        tracing::warn!("progress printer failed: {}", e);
    }

    match status {
        SessionStatus::Finished => {
            let secs = started.elapsed().as_secs_f64();
            println!(
                "copied {} bytes to {} in {:.2}s",
                info.written_bytes,
                args.dest.display(),
                secs
            );
            tracing::info!(dest = %args.dest.display(), bytes = info.written_bytes, secs, "copy finished");
            Ok(())
        }
        SessionStatus::Faulted => {
            joined.with_context(|| format!("copy into {} failed", args.dest.display()))?;
            bail!("copy into {} failed: {}", args.dest.display(), fault.unwrap_or_default())
        }
        SessionStatus::Stopped | SessionStatus::Running => {
            println!(
                "stopped at {} bytes; run the same command again to resume",
                info.written_bytes
            );
            Ok(())
        }
    }
}

/// Wait for a started transfer to leave `Running`, or stop it (waiting for
/// every lane) as soon as `interrupt` resolves.
pub async fn run_until_interrupted<F>(transfer: Arc<Transfer>, interrupt: F) -> Result<SessionStatus>
where
    F: Future<Output = std::io::Result<()>>,
{
    let mut waiter = {
        let t = Arc::clone(&transfer);
        tokio::task::spawn_blocking(move || t.wait())
    };

    tokio::select! {
        biased;
        signal = interrupt => signal.context("listening for interrupt")?,
        status = &mut waiter => return Ok(status?),
    }

    eprintln!();
    eprintln!("interrupted, saving progress...");
    tracing::info!("copy interrupted, stopping lanes");
    let t = Arc::clone(&transfer);
    tokio::task::spawn_blocking(move || t.stop(true)).await??;
    Ok(waiter.await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanexfer_core::protocol::TransferOptions;
    use lanexfer_core::saver::{read_record, SaverOptions};

    fn options() -> TransferOptions {
        TransferOptions {
            saver: SaverOptions {
                lanes: 1,
                block_size: 4096,
                cache_bytes_per_lane: 64 * 1024,
                ..SaverOptions::default()
            },
            verify_checksum: false,
        }
    }

    #[tokio::test]
    async fn interrupt_stops_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let body: Vec<u8> = (0u8..=250).cycle().take(16 * 1024 * 1024).collect();
        std::fs::write(&src, &body).unwrap();
        let dest = dir.path().join("dst.bin");

        let proto = LocalProtocol::open(Source::Path(src.clone()), &dest, options()).unwrap();
        let transfer = Arc::new(Transfer::new(Arc::new(proto)));
        assert_eq!(transfer.start(false).unwrap(), SessionStatus::Running);

        let status = run_until_interrupted(Arc::clone(&transfer), async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(status, SessionStatus::Stopped);
        transfer.close().unwrap();
        drop(transfer);

        assert!(!dir.path().join("dst.bin.lock").exists());
        assert!(!dest.exists());
        let record = read_record(&dir.path().join("dst.bin.info")).unwrap().unwrap();
        assert!(record.written_bytes < body.len() as u64);

        // the same copy picks up where it left off
        let proto = LocalProtocol::open(Source::Path(src), &dest, options()).unwrap();
        let transfer = Transfer::new(Arc::new(proto));
        assert_eq!(transfer.start(true).unwrap(), SessionStatus::Finished);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn finished_transfer_ignores_pending_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        std::fs::write(&src, vec![7u8; 10_000]).unwrap();
        let dest = dir.path().join("dst.bin");

        let proto = LocalProtocol::open(Source::Path(src), &dest, options()).unwrap();
        let transfer = Arc::new(Transfer::new(Arc::new(proto)));
        transfer.start(false).unwrap();

        let status = run_until_interrupted(Arc::clone(&transfer), std::future::pending())
            .await
            .unwrap();
        assert_eq!(status, SessionStatus::Finished);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 10_000]);
    }

    #[tokio::test]
    async fn failed_interrupt_listener_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        std::fs::write(&src, vec![1u8; 4096 * 64]).unwrap();
        let proto = LocalProtocol::open(Source::Path(src), &dir.path().join("dst.bin"), options()).unwrap();
        let transfer = Arc::new(Transfer::new(Arc::new(proto)));
        transfer.start(false).unwrap();

        let err = run_until_interrupted(Arc::clone(&transfer), async {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler"))
        })
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("no signal handler"));
        transfer.close().unwrap();
    }
}
