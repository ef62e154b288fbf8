//! Reference progress hooks.

use std::io::{self, Write};

/// Overwritten status line on stdout; a newline follows the last epoch.
pub fn print_progress(i_epoch: usize, n_epochs: usize, err_training: f64, err_validation: f64) {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{}", format_progress(i_epoch, n_epochs, err_training, err_validation));
    if i_epoch == n_epochs {
        let _ = writeln!(out);
    }
    let _ = out.flush();
}

/// One JSON progress event per line on stdout.
pub fn print_json_progress(i_epoch: usize, n_epochs: usize, _err_training: f64, _err_validation: f64) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{}", json_progress_event(i_epoch, n_epochs));
    let _ = out.flush();
}

fn format_progress(i_epoch: usize, n_epochs: usize, err_training: f64, err_validation: f64) -> String {
    format!("\r{i_epoch:5}/{n_epochs} (err_training={err_training:0.4}, err_validation={err_validation:0.4})")
}

fn json_progress_event(i_epoch: usize, n_epochs: usize) -> serde_json::Value {
    serde_json::json!({
        "type": "progress",
        "i": i_epoch,
        "n": n_epochs,
    })
}
