use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for downloads: position counts shards, the message shows
/// throughput from the exact byte count the writer reports.
pub struct DownloadProgress {
    pb: ProgressBar,
}

impl DownloadProgress {
    pub fn new(total_shards: u64) -> Self {
        let pb = ProgressBar::new(total_shards);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} [ETA: {eta}]")
                .expect("invalid progress bar template")
                .progress_chars("=>-"),
        );
        Self { pb }
    }

    pub fn update(&self, shards: u64, bytes: u64) {
        self.pb.set_position(shards);
        let elapsed = self.pb.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let mb_per_sec = bytes as f64 / 1_048_576.0 / elapsed;
            self.pb.set_message(format!("{:.1} MB/s", mb_per_sec));
        }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
