use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Byte progress over the audio payload, or a spinner when its size is unknown.
pub fn create_progress_bar(multi: &MultiProgress, total_bytes: Option<u64>) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_bytes.filter(|&t| t > 0) {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);

        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {bytes}\n{msg} | elapsed: {elapsed_precise}",
        )?);

        pb
    };
    pb.set_message("converting audio");
    Ok(pb)
}
